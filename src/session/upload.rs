//! One-time configuration upload

use crate::link::commands::build_config_frame;
use crate::link::protocol::{CONFIG_PREFIX, MAX_FRAME_BODY};
use crate::link::{Link, LinkError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where the configuration payload comes from
pub trait PayloadSource {
    /// Read the payload bytes
    fn load(&self) -> io::Result<Vec<u8>>;

    /// Human-readable origin for log messages
    fn describe(&self) -> String;
}

/// Payload read verbatim from a file
#[derive(Debug, Clone)]
pub struct FilePayload {
    path: PathBuf,
}

impl FilePayload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PayloadSource for FilePayload {
    fn load(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Payload held in memory
#[derive(Debug, Clone)]
pub struct InlinePayload(pub Vec<u8>);

impl PayloadSource for InlinePayload {
    fn load(&self) -> io::Result<Vec<u8>> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        format!("inline payload ({} bytes)", self.0.len())
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    /// The payload could not be read; nothing was sent
    #[error("configuration payload {source_name} unavailable: {error}")]
    Missing {
        source_name: String,
        #[source]
        error: io::Error,
    },
    /// The frame could not be written
    #[error("failed to send configuration: {0}")]
    Transport(#[from] LinkError),
}

/// Send the payload as a single `CONFIG:` frame. Returns the frame length.
pub fn upload(link: &dyn Link, source: &dyn PayloadSource) -> Result<usize, UploadError> {
    let payload = source.load().map_err(|error| UploadError::Missing {
        source_name: source.describe(),
        error,
    })?;

    if CONFIG_PREFIX.len() + payload.len() > MAX_FRAME_BODY {
        warn!(
            "Configuration payload is {} bytes; the controller only buffers {} bytes per frame",
            payload.len(),
            MAX_FRAME_BODY - CONFIG_PREFIX.len()
        );
    }
    if serde_json::from_slice::<serde::de::IgnoredAny>(&payload).is_err() {
        // Forwarded untouched, the controller reports its own parse errors
        warn!("Configuration payload from {} is not valid JSON", source.describe());
    }

    let frame = build_config_frame(&payload);
    debug!("Sending configuration frame ({} bytes)", frame.len());
    link.send(&frame)?;

    info!("Configuration from {} sent ({} bytes)", source.describe(), payload.len());
    Ok(frame.len())
}
