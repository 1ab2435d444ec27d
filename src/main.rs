//! Monobot Remote - Entry Point
//!
//! Parses the command line, starts the controller session on its own thread
//! and runs the platform event loop that receives global key presses and
//! prints controller output.

use anyhow::{Context, Result};
use clap::Parser;
use monobot_remote::{
    core::{
        config::Config,
        events::{AppEvent, EventSender},
    },
    input::{HotkeyListener, KeyEvent},
    link::{protocol::LOG_PREFIX, RelayMode, TcpDialer},
    session::{spawn_input_pump, FilePayload, Session, SessionControls, SessionOptions, SessionReport},
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::WindowId,
};

/// Exit code for failures before the session starts
const STARTUP_FAILURE: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "monobot-remote", version, about = "Keyboard remote control for a Monobot controller")]
struct Args {
    /// Controller host name or address
    #[arg(long)]
    host: Option<String>,

    /// Controller TCP port
    #[arg(long)]
    port: Option<u16>,

    /// JSON configuration uploaded once after connecting
    #[arg(long)]
    payload: Option<PathBuf>,

    /// Command encoding: repeat while held, or one token per transition
    #[arg(long, value_enum)]
    mode: Option<RelayMode>,

    /// End the session when the payload cannot be read
    #[arg(long)]
    fail_on_missing_config: bool,

    /// Settings file to use instead of the per-user one
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the default settings file and exit
    #[arg(long)]
    print_default_config: bool,

    /// Print where the settings file is looked up and exit
    #[arg(long)]
    print_config_path: bool,
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        if let Some(host) = &self.host {
            config.controller.host = host.clone();
        }
        if let Some(port) = self.port {
            config.controller.port = port;
        }
        if let Some(payload) = &self.payload {
            config.payload.path = payload.clone();
        }
        if let Some(mode) = self.mode {
            config.relay.mode = mode;
        }
        if self.fail_on_missing_config {
            config.payload.fail_on_missing_config = true;
        }

        config.validate().context("Invalid settings")?;
        Ok(config)
    }
}

/// Main application handler for winit event loop
struct App {
    /// Session events from the session thread
    event_rx: mpsc::UnboundedReceiver<AppEvent>,
    /// Forwards global key presses to the input pump
    key_tx: mpsc::UnboundedSender<KeyEvent>,
    /// Created once the event loop is running
    hotkeys: Option<HotkeyListener>,
    controls: SessionControls,
    /// Keys could not be captured; the session was aborted
    hotkeys_failed: bool,
}

impl App {
    fn new(
        event_rx: mpsc::UnboundedReceiver<AppEvent>,
        key_tx: mpsc::UnboundedSender<KeyEvent>,
        controls: SessionControls,
    ) -> Self {
        Self {
            event_rx,
            key_tx,
            hotkeys: None,
            controls,
            hotkeys_failed: false,
        }
    }

    fn process_events(&mut self, event_loop: &ActiveEventLoop) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                AppEvent::ControllerLog(line) => println!("{}{}", LOG_PREFIX, line),
                AppEvent::Connecting { target } => info!("Connecting to {} (press Esc to quit)", target),
                AppEvent::Connected { target } => info!("Connected to {}", target),
                AppEvent::ConfigUploaded { bytes } => debug!("Configuration frame sent ({} bytes)", bytes),
                AppEvent::ConfigMissing { source } => warn!("No configuration uploaded from {}", source),
                AppEvent::Ready => info!("Controller ready: W forward, A left, D right, Esc quit"),
                AppEvent::SessionEnded { exit_code, reason } => {
                    info!("Session finished: {} (exit code {})", reason, exit_code);
                    if let Some(mut hotkeys) = self.hotkeys.take() {
                        hotkeys.stop();
                    }
                    event_loop.exit();
                }
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        if self.hotkeys.is_some() {
            return;
        }
        match HotkeyListener::new(self.key_tx.clone()) {
            Ok(hotkeys) => {
                self.hotkeys = Some(hotkeys);
                info!("Hotkey listener initialized");
            }
            Err(e) => {
                error!("Failed to initialize hotkey listener: {:#}", e);
                self.hotkeys_failed = true;
                self.controls.abort();
            }
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, _event: ()) {
        self.process_events(event_loop);
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _window_id: WindowId, _event: WindowEvent) {}

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.process_events(event_loop);
    }
}

fn spawn_session(
    session: Session,
    dialer: TcpDialer,
    payload: FilePayload,
) -> std::io::Result<JoinHandle<SessionReport>> {
    std::thread::Builder::new()
        .name("session".into())
        .spawn(move || session.run(dialer, &payload))
}

fn run(args: Args) -> Result<i32> {
    if args.print_default_config {
        print!("{}", Config::default_config_str());
        return Ok(0);
    }
    if args.print_config_path {
        println!("{}", Config::config_path()?.display());
        return Ok(0);
    }

    let config = args.load_config()?;
    info!(
        "Controller {}:{}, payload {}, {} mode",
        config.controller.host,
        config.controller.port,
        config.payload.path.display(),
        config.relay.mode
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;

    // Wake the event loop whenever the session queues an event
    let proxy = Mutex::new(event_loop.create_proxy());
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let events = EventSender::new(event_tx).with_waker(move || {
        let _ = proxy.lock().send_event(());
    });

    let session = Session::new(SessionOptions::from_config(&config), events);
    let controls = session.controls();

    let (key_tx, key_rx) = mpsc::unbounded_channel();
    let pump = spawn_input_pump(controls.clone(), key_rx).context("Failed to start input pump")?;

    let dialer = TcpDialer::new(config.controller.host.clone(), config.controller.port)
        .with_read_timeout(config.controller.read_timeout());
    let session_thread = spawn_session(session, dialer, FilePayload::new(&config.payload.path))
        .context("Failed to start session")?;

    let mut app = App::new(event_rx, key_tx, controls.clone());
    if let Err(e) = event_loop.run_app(&mut app) {
        error!("Event loop failed: {}", e);
        controls.abort();
    }

    let code = match session_thread.join() {
        Ok(_) if app.hotkeys_failed => STARTUP_FAILURE,
        Ok(report) => {
            info!("{}", report.summary);
            report.exit_code()
        }
        Err(_) => {
            error!("Session thread panicked");
            STARTUP_FAILURE
        }
    };

    // Dropping the app closes the key channel and ends the pump
    drop(app);
    let _ = pump.join();
    Ok(code)
}

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match run(Args::parse()) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            STARTUP_FAILURE
        }
    };
    std::process::exit(code);
}
