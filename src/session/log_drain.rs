//! Background reader for controller log lines

use super::handshake::READ_CHUNK;
use crate::core::events::{AppEvent, EventSender};
use crate::core::state::SessionCounters;
use crate::link::{LineBuffer, Link, LinkError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why the log drain stopped
#[derive(Debug)]
pub enum DrainEnd {
    /// The controller closed the connection
    PeerClosed,
    /// The link was closed on our side
    LocalClose,
    /// Read failed
    Failed(LinkError),
}

/// Reads controller output and forwards every non-empty line in order
pub struct LogDrain {
    link: Arc<dyn Link>,
    buffer: LineBuffer,
    events: EventSender,
    counters: Arc<SessionCounters>,
    poll_interval: Duration,
}

impl LogDrain {
    pub fn new(
        link: Arc<dyn Link>,
        buffer: LineBuffer,
        events: EventSender,
        counters: Arc<SessionCounters>,
    ) -> Self {
        Self {
            link,
            buffer,
            events,
            counters,
            poll_interval: Duration::ZERO,
        }
    }

    /// Pause between reads
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<DrainEnd>> {
        thread::Builder::new()
            .name("log-drain".into())
            .spawn(move || self.run())
    }

    /// Read until the connection ends
    pub fn run(mut self) -> DrainEnd {
        info!("Log drain started");
        // Lines that arrived together with the GO line
        self.emit_lines();

        let mut chunk = [0u8; READ_CHUNK];
        let end = loop {
            match self.link.recv(&mut chunk) {
                Ok(0) => break DrainEnd::PeerClosed,
                Ok(n) => {
                    self.buffer.extend(&chunk[..n]);
                    self.emit_lines();
                }
                Err(LinkError::TimedOut) => {}
                Err(LinkError::Closed) => break DrainEnd::LocalClose,
                Err(_) if self.link.is_closed() => break DrainEnd::LocalClose,
                Err(e) => break DrainEnd::Failed(e),
            }

            if !self.poll_interval.is_zero() {
                thread::sleep(self.poll_interval);
            }
        };

        if !self.buffer.is_empty() {
            debug!(
                "Dropping {} bytes of unterminated controller output",
                self.buffer.pending().len()
            );
        }
        match &end {
            DrainEnd::Failed(e) => warn!("Log drain stopped: {}", e),
            other => info!("Log drain stopped: {:?}", other),
        }
        end
    }

    fn emit_lines(&mut self) {
        while let Some(line) = self.buffer.next_line() {
            if line.is_empty() {
                continue;
            }
            self.counters.record_log_line();
            let _ = self.events.send(AppEvent::ControllerLog(line));
        }
    }
}
