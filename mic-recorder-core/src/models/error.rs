use thiserror::Error;

/// Errors raised by the recording core and its capture backends.
///
/// None of these end the process: the supervisor absorbs every one of them
/// into its retry/backoff policy. Payloads are strings so the error stays
/// `Clone` and can be handed to delegates and kept in reports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device enumeration failed: {0}")]
    DeviceEnumeration(String),

    #[error("no input device available")]
    NoInputDevice,

    #[error("device {id} not available: {reason}")]
    DeviceNotAvailable { id: u32, reason: String },

    #[error("failed to open input stream: {0}")]
    StreamOpen(String),

    #[error("chunk {chunk} capture failed: {message}")]
    ChunkCapture { chunk: usize, message: String },

    #[error("no audio captured for segment")]
    EmptySegment,

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("disk space query failed: {0}")]
    DiskSpaceQuery(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl CaptureError {
    /// Build a chunk capture error for the given zero-based chunk index.
    pub fn chunk(chunk: usize, message: impl Into<String>) -> Self {
        Self::ChunkCapture {
            chunk,
            message: message.into(),
        }
    }
}
