//! How a session ends

use crate::link::LinkError;
use thiserror::Error;

/// Terminal reason of a session, one variant per failure class.
///
/// `Aborted` is the normal user-requested exit; the others map to distinct
/// process exit codes.
#[derive(Debug, Error)]
pub enum SessionEnd {
    /// Escape pressed
    #[error("session aborted by user")]
    Aborted,
    /// The controller closed the connection
    #[error("controller closed the connection")]
    PeerClosed,
    /// Connection failed after it was established
    #[error("transport error: {0}")]
    Transport(#[from] LinkError),
    /// No configuration payload and the policy requires one
    #[error("configuration payload missing: {0}")]
    ConfigMissing(String),
}

impl SessionEnd {
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionEnd::Aborted => 0,
            SessionEnd::Transport(_) => 2,
            SessionEnd::ConfigMissing(_) => 3,
            SessionEnd::PeerClosed => 4,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, SessionEnd::Aborted)
    }
}
