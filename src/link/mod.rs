//! Link module - TCP communication with the Monobot controller

pub mod commands;
mod connection;
mod lines;
pub mod protocol;

pub use connection::{Connection, Dial, Link, LinkError, TcpDialer};
pub use lines::LineBuffer;
pub use protocol::{MotionCommand, RelayMode};

#[cfg(test)]
pub(crate) mod mock;
