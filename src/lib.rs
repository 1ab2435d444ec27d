//! Monobot Remote
//!
//! Drive a Monobot robot controller over TCP from the keyboard.
//!
//! # Features
//! - Connects to the controller with unbounded retry, abortable with Esc
//! - Uploads a JSON configuration once as a `CONFIG:` frame
//! - Waits for the controller's `GO` line before relaying commands
//! - Prints controller log lines while commands are relayed
//! - Relays W/A/D as repeated bytes while held, or as one token per transition

pub mod core;
pub mod input;
pub mod link;
pub mod session;

pub use crate::core::config::Config;
pub use crate::core::error::SessionEnd;
pub use crate::core::events::{AppEvent, EventSender};
pub use crate::core::state::{SessionState, SessionSummary};
pub use link::{MotionCommand, RelayMode};
pub use session::{Session, SessionControls, SessionOptions, SessionReport};
