//! Error types for blexfer.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for blexfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for blexfer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file reads, serial port writes).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Update package could not be opened or has no usable entry.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A caller-supplied argument violates a precondition.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Block index or offset outside the current session.
    #[error("{what} {index} out of range (session length {len})")]
    OutOfRange {
        /// What was being addressed ("block", "offset", ...).
        what: &'static str,
        /// Requested index or offset.
        index: usize,
        /// Number of addressable units in the current session.
        len: usize,
    },

    /// Payload could not be represented in the wire character set.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Failure reported by the transport, passed through as-is.
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// The embedding application asked the current operation to stop.
    #[error("Operation interrupted")]
    Interrupted,
}

impl Error {
    /// Whether this failure came from the transport layer.
    ///
    /// Callers use this to decide whether a resend makes sense; every other
    /// kind is a local defect that a retry cannot fix.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Io(_) => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            _ => false,
        }
    }
}

/// Structured failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// Stack-specific error code, when the transport has one.
    pub code: Option<i32>,
    /// Human readable reason.
    pub message: String,
}

impl TransportError {
    /// Create a transport error without a code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Create a transport error carrying a stack-specific code.
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}
