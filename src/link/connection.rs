//! TCP connection to the controller

use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors surfaced by a [`Link`]
#[derive(Debug, Error)]
pub enum LinkError {
    /// The link was closed locally
    #[error("connection closed")]
    Closed,
    /// A timed read returned without data
    #[error("read timed out")]
    TimedOut,
    /// Any other I/O failure (refused, reset, broken pipe, ...)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LinkError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::TimedOut)
    }

    fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => LinkError::TimedOut,
            _ => LinkError::Io(e),
        }
    }
}

/// A byte stream to the controller shared by the session's threads.
///
/// Writes are atomic with respect to each other. `close` is idempotent and
/// wakes any thread blocked in `recv`.
pub trait Link: Send + Sync {
    /// Write all bytes as one unit
    fn send(&self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Read available bytes. `Ok(0)` means the peer closed the connection.
    fn recv(&self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Close the link. Returns `true` only for the call that actually closed it.
    fn close(&self) -> bool;

    fn is_closed(&self) -> bool;
}

/// Live TCP connection to the controller
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    /// Serializes writers so frames never interleave
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Connection {
    /// Wrap a connected stream. `read_timeout` of `None` means blocking reads.
    pub fn from_stream(stream: TcpStream, read_timeout: Option<Duration>) -> io::Result<Self> {
        stream.set_read_timeout(read_timeout)?;
        stream.set_write_timeout(None)?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            peer,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Switch between blocking (`None`) and timed reads
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), LinkError> {
        self.stream.set_read_timeout(timeout).map_err(LinkError::Io)
    }
}

impl Link for Connection {
    fn send(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let _guard = self.write_lock.lock();
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        (&self.stream).write_all(bytes).map_err(|e| {
            if self.is_closed() {
                LinkError::Closed
            } else {
                LinkError::from_io(e)
            }
        })
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        match (&self.stream).read(buf) {
            Ok(n) => Ok(n),
            Err(_) if self.is_closed() => Err(LinkError::Closed),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(LinkError::TimedOut),
            Err(e) => Err(LinkError::from_io(e)),
        }
    }

    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            // Already torn down by the peer
            debug!("Shutdown of {} failed: {}", self.peer, e);
        }
        info!("Connection to {} closed", self.peer);
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Something that can open a [`Link`] within a timeout
pub trait Dial {
    type Link: Link + 'static;

    /// Make one connection attempt
    fn dial(&mut self, timeout: Duration) -> Result<Self::Link, LinkError>;

    /// Human-readable target for log messages
    fn target(&self) -> String;
}

/// Dials the controller over TCP
#[derive(Debug, Clone)]
pub struct TcpDialer {
    host: String,
    port: u16,
    read_timeout: Option<Duration>,
}

impl TcpDialer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            read_timeout: None,
        }
    }

    /// Read timeout applied to connections after they are established
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Dial for TcpDialer {
    type Link = Connection;

    fn dial(&mut self, timeout: Duration) -> Result<Connection, LinkError> {
        // Resolution goes through mDNS for `.local` names, so it can fail while the robot boots
        let addrs = (self.host.as_str(), self.port).to_socket_addrs()?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    let connection = Connection::from_stream(stream, self.read_timeout)?;
                    info!("Connected to {} ({})", self.target(), connection.peer());
                    return Ok(connection);
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(LinkError::Io(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} resolved to no addresses", self.host),
            )
        })))
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
