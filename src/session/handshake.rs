//! Waiting for the controller's GO line

use crate::core::error::SessionEnd;
use crate::core::events::{AppEvent, EventSender};
use crate::core::state::{AbortSignal, SessionCounters};
use crate::link::protocol::READY_TOKEN;
use crate::link::{LineBuffer, Link, LinkError};
use tracing::{debug, info};

/// Bytes requested per read
pub(crate) const READ_CHUNK: usize = 1024;

/// The controller is ready for motion commands
#[derive(Debug)]
pub struct Ready {
    /// The line that carried the GO token
    pub line: String,
    /// Whatever arrived after the GO line, to be continued by the log drain
    pub buffer: LineBuffer,
}

/// Whether `line` signals readiness.
///
/// Any line containing `GO` counts, so diagnostic lines such as
/// `INFO: robot GO ready` or even `GOING` are accepted.
pub fn is_ready_line(line: &str) -> bool {
    line.contains(READY_TOKEN)
}

/// Block until a GO line arrives.
///
/// Lines received before it are forwarded as controller logs. Read timeouts
/// only mean "no data yet".
pub fn wait_for_go(
    link: &dyn Link,
    abort: &AbortSignal,
    events: &EventSender,
    counters: &SessionCounters,
) -> Result<Ready, SessionEnd> {
    let mut buffer = LineBuffer::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        match link.recv(&mut chunk) {
            Ok(0) => {
                if abort.is_raised() {
                    return Err(SessionEnd::Aborted);
                }
                info!("Controller closed the connection before GO");
                return Err(SessionEnd::PeerClosed);
            }
            Ok(n) => {
                buffer.extend(&chunk[..n]);
                while let Some(line) = buffer.next_line() {
                    if is_ready_line(&line) {
                        info!("Controller ready: {:?}", line);
                        return Ok(Ready { line, buffer });
                    }
                    if !line.is_empty() {
                        counters.record_log_line();
                        let _ = events.send(AppEvent::ControllerLog(line));
                    }
                }
            }
            Err(LinkError::TimedOut) => {
                if abort.is_raised() {
                    return Err(SessionEnd::Aborted);
                }
                debug!("No handshake data yet");
            }
            Err(_) if abort.is_raised() => return Err(SessionEnd::Aborted),
            Err(e) => return Err(SessionEnd::Transport(e)),
        }
    }
}
