//! Wire protocol definitions for Monobot communication
//!
//! Protocol based on the controller firmware's communication layer:
//! - Configuration frame: `CONFIG:` prefix, raw payload, 0x1E terminator
//! - Controller output: ASCII lines terminated by `\n` (optionally `\r\n`)
//! - Motion commands: raw key bytes (held mode) or `"<state>\n"` tokens (edge mode)

use serde::{Deserialize, Serialize};

/// Prefix of the configuration frame
pub const CONFIG_PREFIX: &[u8] = b"CONFIG:";

/// ASCII Record Separator, terminates the configuration frame
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Size of the controller's receive buffer for one frame (including the NUL)
pub const CONTROLLER_RX_BUFFER: usize = 400;

/// Largest frame body (prefix + payload) the controller reads before the terminator
pub const MAX_FRAME_BODY: usize = CONTROLLER_RX_BUFFER - 1;

/// Substring that marks the controller's readiness line
pub const READY_TOKEN: &str = "GO";

/// Prefix used when displaying controller log lines
pub const LOG_PREFIX: &str = "Arduino Log: ";

/// Motion commands understood by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MotionCommand {
    Stop = 0,
    Forward = 1,
    Left = 2,
    Right = 3,
}

impl MotionCommand {
    /// Numeric state sent in edge mode
    pub fn state(&self) -> u8 {
        *self as u8
    }

    /// ASCII digit of the numeric state
    pub fn state_byte(&self) -> u8 {
        b'0' + self.state()
    }

    /// Parse from an ASCII state digit
    pub fn from_state_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(MotionCommand::Stop),
            b'1' => Some(MotionCommand::Forward),
            b'2' => Some(MotionCommand::Left),
            b'3' => Some(MotionCommand::Right),
            _ => None,
        }
    }

    /// Raw key byte sent in held mode. Stop has none: silence means stop.
    pub fn held_byte(&self) -> Option<u8> {
        match self {
            MotionCommand::Stop => None,
            MotionCommand::Forward => Some(b'w'),
            MotionCommand::Left => Some(b'a'),
            MotionCommand::Right => Some(b'd'),
        }
    }
}

impl std::fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MotionCommand::Stop => "stop",
            MotionCommand::Forward => "forward",
            MotionCommand::Left => "left",
            MotionCommand::Right => "right",
        };
        f.write_str(name)
    }
}

/// How motion commands are encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Raw key byte repeated at a fixed cadence while the key is held
    Held,
    /// One numeric state token per press/release transition
    #[default]
    Edge,
}

impl std::fmt::Display for RelayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayMode::Held => f.write_str("held"),
            RelayMode::Edge => f.write_str("edge"),
        }
    }
}
