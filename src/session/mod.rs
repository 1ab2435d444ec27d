//! Session module - connect, upload, handshake, then relay and drain
//!
//! A session runs its phases in order on the calling thread:
//! 1. connect with unbounded retry (escape aborts)
//! 2. upload the configuration frame
//! 3. wait for the GO line
//! 4. drain controller logs on a thread while key events drive the relay
//!
//! Key events reach the session through [`SessionControls`], usually fed by
//! [`spawn_input_pump`].

mod establish;
mod handshake;
mod log_drain;
mod relay;
mod upload;

pub use establish::{connect_with_retry, RetryPolicy};
pub use handshake::{is_ready_line, wait_for_go, Ready};
pub use log_drain::{DrainEnd, LogDrain};
pub use relay::{EdgeRelay, HeldRelay, Relay};
pub use upload::{upload, FilePayload, InlinePayload, PayloadSource, UploadError};

use crate::core::config::Config;
use crate::core::error::SessionEnd;
use crate::core::events::{AppEvent, EventSender};
use crate::core::state::{AbortSignal, SessionCounters, SessionState, SessionStateCell, SessionSummary};
use crate::input::KeyEvent;
use crate::link::{Dial, Link, RelayMode};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Tunables of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub retry: RetryPolicy,
    pub mode: RelayMode,
    /// Held-mode repeat interval
    pub send_interval: Duration,
    /// Pause between log reads
    pub log_poll_interval: Duration,
    /// End the session when the payload cannot be read
    pub fail_on_missing_config: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy {
                attempt_timeout: config.controller.attempt_timeout(),
                retry_interval: config.controller.retry_interval(),
            },
            mode: config.relay.mode,
            send_interval: config.relay.send_interval(),
            log_poll_interval: config.relay.log_poll_interval(),
            fail_on_missing_config: config.payload.fail_on_missing_config,
        }
    }
}

/// How the session ended plus its traffic counters
#[derive(Debug)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub summary: SessionSummary,
}

impl SessionReport {
    pub fn exit_code(&self) -> i32 {
        self.end.exit_code()
    }
}

/// State shared between the session thread and the input side
#[derive(Default)]
struct Shared {
    state: Arc<SessionStateCell>,
    abort: AbortSignal,
    counters: Arc<SessionCounters>,
    link: OnceLock<Arc<dyn Link>>,
    relay: OnceLock<Relay>,
}

/// A single controller session
pub struct Session {
    shared: Arc<Shared>,
    options: SessionOptions,
    events: EventSender,
}

impl Session {
    pub fn new(options: SessionOptions, events: EventSender) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            options,
            events,
        }
    }

    /// Handle for delivering key events and aborting from other threads
    pub fn controls(&self) -> SessionControls {
        SessionControls {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    /// Run the session to completion on the calling thread.
    ///
    /// Returns once the user pressed escape, the controller disconnected or
    /// a fatal error occurred. A session is not reusable.
    pub fn run<D: Dial>(&self, mut dialer: D, payload: &dyn PayloadSource) -> SessionReport {
        let end = match self.drive(&mut dialer, payload) {
            Ok(end) | Err(end) => end,
        };
        self.finish(end)
    }

    fn drive<D: Dial>(&self, dialer: &mut D, payload: &dyn PayloadSource) -> Result<SessionEnd, SessionEnd> {
        let shared = &self.shared;
        let target = dialer.target();

        let _ = self.events.send(AppEvent::Connecting {
            target: target.clone(),
        });
        let link: Arc<dyn Link> = Arc::new(connect_with_retry(
            dialer,
            &self.options.retry,
            &shared.abort,
            &shared.counters,
        )?);

        if shared.link.set(Arc::clone(&link)).is_err() {
            error!("Session already has a connection");
            link.close();
            return Err(SessionEnd::Aborted);
        }
        // Escape may have fired between connecting and publishing the link
        if shared.abort.is_raised()
            || !shared
                .state
                .advance(SessionState::AwaitingConnection, SessionState::AwaitingHandshake)
        {
            link.close();
            return Err(SessionEnd::Aborted);
        }
        let _ = self.events.send(AppEvent::Connected { target });

        match upload(link.as_ref(), payload) {
            Ok(bytes) => {
                shared.counters.record_config(bytes);
                let _ = self.events.send(AppEvent::ConfigUploaded { bytes });
            }
            Err(UploadError::Missing { source_name, error }) => {
                warn!("Configuration {} not sent: {}", source_name, error);
                let _ = self.events.send(AppEvent::ConfigMissing {
                    source: source_name.clone(),
                });
                if self.options.fail_on_missing_config {
                    link.close();
                    return Err(SessionEnd::ConfigMissing(source_name));
                }
                warn!("Continuing without configuration; the controller keeps its defaults");
            }
            Err(UploadError::Transport(e)) => {
                link.close();
                return Err(self.link_failure(e.into()));
            }
        }

        let ready = match wait_for_go(link.as_ref(), &shared.abort, &self.events, &shared.counters) {
            Ok(ready) => ready,
            Err(end) => {
                link.close();
                return Err(end);
            }
        };

        let relay = Relay::new(
            self.options.mode,
            Arc::clone(&link),
            Arc::clone(&shared.state),
            Arc::clone(&shared.counters),
        );
        let sender = match &relay {
            Relay::Held(held) => Some(held.spawn_sender(self.options.send_interval)),
            Relay::Edge(_) => None,
        };
        // Never set twice: drive runs once per session
        let _ = shared.relay.set(relay);

        if !shared
            .state
            .advance(SessionState::AwaitingHandshake, SessionState::Active)
        {
            link.close();
            join_sender(sender);
            return Err(SessionEnd::Aborted);
        }
        let _ = self.events.send(AppEvent::Ready);
        info!("Session active ({} mode)", self.options.mode);

        let drain = LogDrain::new(
            Arc::clone(&link),
            ready.buffer,
            self.events.clone(),
            Arc::clone(&shared.counters),
        )
        .with_poll_interval(self.options.log_poll_interval);

        let drain_end = match drain.spawn() {
            Ok(handle) => handle.join().unwrap_or_else(|_| {
                error!("Log drain thread panicked");
                DrainEnd::LocalClose
            }),
            Err(e) => {
                error!("Failed to start log drain: {}", e);
                DrainEnd::Failed(e.into())
            }
        };

        shared.state.terminate();
        link.close();
        join_sender(sender);

        Ok(match drain_end {
            _ if shared.abort.is_raised() => SessionEnd::Aborted,
            DrainEnd::PeerClosed => SessionEnd::PeerClosed,
            DrainEnd::LocalClose => SessionEnd::Aborted,
            DrainEnd::Failed(e) => SessionEnd::Transport(e),
        })
    }

    /// Transport failures caused by our own close are aborts
    fn link_failure(&self, end: SessionEnd) -> SessionEnd {
        if self.shared.abort.is_raised() {
            SessionEnd::Aborted
        } else {
            end
        }
    }

    fn finish(&self, end: SessionEnd) -> SessionReport {
        self.shared.state.terminate();
        if let Some(link) = self.shared.link.get() {
            link.close();
        }

        let summary = self.shared.counters.snapshot();
        if end.is_clean() {
            info!("Session ended: {} ({})", end, summary);
        } else {
            warn!("Session ended: {} ({})", end, summary);
        }
        let _ = self.events.send(AppEvent::SessionEnded {
            exit_code: end.exit_code(),
            reason: end.to_string(),
        });
        SessionReport { end, summary }
    }
}

fn join_sender(sender: Option<std::io::Result<JoinHandle<()>>>) {
    match sender {
        Some(Ok(handle)) => {
            if handle.join().is_err() {
                error!("Command sender thread panicked");
            }
        }
        Some(Err(e)) => error!("Failed to start command sender: {}", e),
        None => {}
    }
}

/// Whether a key event ended the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Escape,
}

/// Cloneable handle to a running [`Session`]
#[derive(Clone)]
pub struct SessionControls {
    shared: Arc<Shared>,
}

impl SessionControls {
    /// Route a key event. Escape aborts in every state; other keys only
    /// reach the relay once the session is active.
    pub fn handle_key(&self, event: KeyEvent) -> KeyOutcome {
        if event.is_escape_press() {
            info!("Escape pressed");
            self.abort();
            return KeyOutcome::Escape;
        }

        match self.shared.relay.get() {
            Some(relay) if self.shared.state.is_active() => {
                if let Err(e) = relay.handle(event) {
                    warn!("Failed to send command: {}", e);
                }
            }
            _ => debug!("Dropping {:?}, session is {}", event, self.shared.state.get()),
        }
        KeyOutcome::Continue
    }

    /// End the session: stop retrying, close the connection, stop relaying
    pub fn abort(&self) {
        self.shared.abort.raise();
        self.shared.state.terminate();
        if let Some(link) = self.shared.link.get() {
            link.close();
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }
}

/// Feed key events into the session until escape or the sender side goes away
pub fn spawn_input_pump(
    controls: SessionControls,
    mut key_rx: mpsc::UnboundedReceiver<KeyEvent>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("input-pump".into())
        .spawn(move || {
            while let Some(event) = key_rx.blocking_recv() {
                if controls.handle_key(event) == KeyOutcome::Escape {
                    break;
                }
            }
            debug!("Input pump stopped");
        })
}
