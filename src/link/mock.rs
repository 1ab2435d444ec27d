//! In-memory link for unit tests

use super::connection::{Link, LinkError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// One scripted result of `recv`
#[derive(Debug, Clone)]
pub(crate) enum Inbound {
    Data(Vec<u8>),
    Timeout,
    Error(io::ErrorKind),
}

/// Link that replays scripted reads and records every send.
///
/// Once the script is exhausted `recv` reports end of stream.
#[derive(Debug, Default)]
pub(crate) struct MockLink {
    inbound: Mutex<VecDeque<Inbound>>,
    sent: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
    fail_sends: AtomicBool,
}

impl MockLink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_reads(reads: impl IntoIterator<Item = Inbound>) -> Self {
        let link = Self::new();
        link.inbound.lock().extend(reads);
        link
    }

    /// Script data reads, one per chunk
    pub(crate) fn with_chunks(chunks: &[&[u8]]) -> Self {
        Self::with_reads(chunks.iter().map(|c| Inbound::Data(c.to_vec())))
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Payload of each `send` call, in order
    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// All sent bytes concatenated
    pub(crate) fn sent_bytes(&self) -> Vec<u8> {
        self.sent.lock().concat()
    }
}

impl Link for MockLink {
    fn send(&self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(LinkError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        self.sent.lock().push(bytes.to_vec());
        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        let mut inbound = self.inbound.lock();
        match inbound.pop_front() {
            None => Ok(0),
            Some(Inbound::Timeout) => Err(LinkError::TimedOut),
            Some(Inbound::Error(kind)) => Err(LinkError::Io(io::Error::from(kind))),
            Some(Inbound::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    inbound.push_front(Inbound::Data(data.split_off(n)));
                }
                Ok(n)
            }
        }
    }

    fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
