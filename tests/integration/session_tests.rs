//! Session integration tests against a fake controller on loopback

use monobot_remote::input::{Key, KeyEvent};
use monobot_remote::link::TcpDialer;
use monobot_remote::session::{FilePayload, InlinePayload, KeyOutcome, RetryPolicy};
use monobot_remote::{AppEvent, EventSender, RelayMode, Session, SessionEnd, SessionOptions, SessionReport};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Accept one connection on a loopback port and run `script` on it
fn spawn_controller<T, F>(script: F) -> (u16, JoinHandle<T>)
where
    T: Send + 'static,
    F: FnOnce(TcpStream) -> T + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(stream)
    });
    (port, handle)
}

/// Read one configuration frame, separator included
fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut frame = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).unwrap();
        frame.push(byte[0]);
        if byte[0] == 0x1E {
            return frame;
        }
    }
}

fn options(mode: RelayMode) -> SessionOptions {
    SessionOptions {
        retry: RetryPolicy {
            attempt_timeout: Duration::from_millis(500),
            retry_interval: Duration::from_millis(20),
        },
        mode,
        send_interval: Duration::from_millis(1),
        ..SessionOptions::default()
    }
}

/// Run a session on its own thread, returning the event receiver
fn start(
    options: SessionOptions,
    port: u16,
    payload: InlinePayload,
) -> (
    monobot_remote::SessionControls,
    mpsc::UnboundedReceiver<AppEvent>,
    JoinHandle<SessionReport>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = Session::new(options, EventSender::new(tx));
    let controls = session.controls();
    let handle = thread::spawn(move || session.run(TcpDialer::new("127.0.0.1", port), &payload));
    (controls, rx, handle)
}

/// Collect events until `done` matches or the session goes away
fn events_until(
    rx: &mut mpsc::UnboundedReceiver<AppEvent>,
    done: impl Fn(&AppEvent) -> bool,
) -> Vec<AppEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.blocking_recv() {
        let stop = done(&event);
        events.push(event);
        if stop {
            break;
        }
    }
    events
}

fn logs(events: &[AppEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            AppEvent::ControllerLog(line) => Some(line.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_config_then_go_then_edge_tokens() {
    let (port, controller) = spawn_controller(|mut stream| {
        let frame = read_frame(&mut stream);
        stream.write_all(b"config ok\r\nGO\r\n").unwrap();
        stream.write_all(b"servo center 90\n").unwrap();

        let mut tokens = [0u8; 6];
        stream.read_exact(&mut tokens).unwrap();
        stream.write_all(b"turning\n").unwrap();
        // Closing ends the session from the controller side
        (frame, tokens)
    });

    let payload = InlinePayload(br#"{"SERVO_CENTER":90}"#.to_vec());
    let (controls, mut rx, session) = start(options(RelayMode::Edge), port, payload);

    let mut events = events_until(&mut rx, |e| *e == AppEvent::Ready);
    assert!(events.contains(&AppEvent::ConfigUploaded { bytes: 27 }));

    for event in [
        KeyEvent::Pressed(Key::Char('w')),
        KeyEvent::Pressed(Key::Char('w')),
        KeyEvent::Pressed(Key::Char('a')),
        KeyEvent::Released(Key::Char('a')),
    ] {
        assert_eq!(controls.handle_key(event), KeyOutcome::Continue);
    }

    let report = session.join().unwrap();
    events.extend(events_until(&mut rx, |_| false));
    let (frame, tokens) = controller.join().unwrap();

    assert_eq!(frame, b"CONFIG:{\"SERVO_CENTER\":90}\x1E".to_vec());
    assert_eq!(&tokens, b"1\n2\n0\n");
    assert!(matches!(report.end, SessionEnd::PeerClosed));
    assert_eq!(report.exit_code(), 4);
    assert_eq!(report.summary.commands_sent, 3);
    assert_eq!(logs(&events), vec!["config ok", "servo center 90", "turning"]);
    assert!(matches!(events.last(), Some(AppEvent::SessionEnded { exit_code: 4, .. })));
}

#[test]
fn test_escape_closes_active_session() {
    let (port, controller) = spawn_controller(|mut stream| {
        read_frame(&mut stream);
        stream.write_all(b"GO\n").unwrap();
        let mut rest = Vec::new();
        // Returns once the client shuts the socket down
        stream.read_to_end(&mut rest).unwrap();
        rest
    });

    let (controls, mut rx, session) = start(options(RelayMode::Edge), port, InlinePayload(b"{}".to_vec()));
    events_until(&mut rx, |e| *e == AppEvent::Ready);

    controls.handle_key(KeyEvent::Pressed(Key::Char('d')));
    assert_eq!(controls.handle_key(KeyEvent::Pressed(Key::Escape)), KeyOutcome::Escape);
    // A second close is harmless
    controls.abort();

    let report = session.join().unwrap();
    assert!(matches!(report.end, SessionEnd::Aborted));
    assert_eq!(report.exit_code(), 0);
    assert_eq!(controller.join().unwrap(), b"3\n".to_vec());

    // Keys after escape go nowhere
    controls.handle_key(KeyEvent::Pressed(Key::Char('w')));
}

#[test]
fn test_held_mode_repeats_while_pressed() {
    let (port, controller) = spawn_controller(|mut stream| {
        read_frame(&mut stream);
        stream.write_all(b"GO\n").unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        rest
    });

    let (controls, mut rx, session) = start(options(RelayMode::Held), port, InlinePayload(b"{}".to_vec()));
    events_until(&mut rx, |e| *e == AppEvent::Ready);

    controls.handle_key(KeyEvent::Pressed(Key::Char('w')));
    thread::sleep(Duration::from_millis(100));
    controls.handle_key(KeyEvent::Released(Key::Char('w')));
    thread::sleep(Duration::from_millis(20));
    controls.handle_key(KeyEvent::Pressed(Key::Escape));

    assert!(matches!(session.join().unwrap().end, SessionEnd::Aborted));
    let bytes = controller.join().unwrap();
    assert!(bytes.len() >= 3, "only {} bytes repeated", bytes.len());
    assert!(bytes.iter().all(|&b| b == b'w'));
}

#[test]
fn test_peer_close_before_go() {
    let (port, controller) = spawn_controller(|mut stream| {
        read_frame(&mut stream);
        stream.write_all(b"bad config\n").unwrap();
    });

    let (_controls, mut rx, session) = start(options(RelayMode::Edge), port, InlinePayload(b"{".to_vec()));
    let report = session.join().unwrap();
    controller.join().unwrap();

    let events = events_until(&mut rx, |_| false);
    assert!(matches!(report.end, SessionEnd::PeerClosed));
    assert!(!events.contains(&AppEvent::Ready));
    assert_eq!(logs(&events), vec!["bad config"]);
}

#[test]
fn test_missing_config_with_fail_policy() {
    let (port, controller) = spawn_controller(|mut stream| {
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received
    });

    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = Session::new(
        SessionOptions {
            fail_on_missing_config: true,
            ..options(RelayMode::Edge)
        },
        EventSender::new(tx),
    );
    let report = session.run(
        TcpDialer::new("127.0.0.1", port),
        &FilePayload::new(dir.path().join("config.json")),
    );

    assert!(matches!(report.end, SessionEnd::ConfigMissing(_)));
    assert_eq!(report.exit_code(), 3);
    assert!(controller.join().unwrap().is_empty());

    drop(session);
    let events = events_until(&mut rx, |_| false);
    assert!(events.iter().any(|e| matches!(e, AppEvent::ConfigMissing { .. })));
    assert!(!events.iter().any(|e| matches!(e, AppEvent::ConfigUploaded { .. })));
}

#[test]
fn test_abort_while_controller_unreachable() {
    // Reserve a port, then release it so connections are refused
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut opts = options(RelayMode::Edge);
    opts.retry.retry_interval = Duration::from_secs(30);
    let (controls, mut rx, session) = start(opts, port, InlinePayload(b"{}".to_vec()));

    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    assert_eq!(controls.handle_key(KeyEvent::Pressed(Key::Escape)), KeyOutcome::Escape);

    let report = session.join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(report.end, SessionEnd::Aborted));
    assert!(report.summary.connect_attempts >= 1);

    let events = events_until(&mut rx, |_| false);
    assert!(!events.iter().any(|e| matches!(e, AppEvent::Connected { .. })));
    assert!(!events.iter().any(|e| matches!(e, AppEvent::ConfigUploaded { .. })));
}
