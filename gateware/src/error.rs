/*!
Common error types for the camera controller model.

The state machines themselves never fail; errors come from building a
controller out of an inconsistent configuration and from host-side decoding
of the captured byte stream.
*/

use thiserror::Error;

/// Common result type used throughout the gateware library
pub type Result<T> = std::result::Result<T, GatewareError>;

/// Error type for configuration and host-side decoding
#[derive(Error, Debug)]
pub enum GatewareError {
    /// Packet header decoding errors
    #[error("Packet error: {0}")]
    Packet(#[from] crate::packet::PacketError),

    /// I/O errors (frame files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Invalid frame data
    #[error("Invalid frame data: {0}")]
    InvalidFrame(String),

    /// File format errors
    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    /// Configuration errors (inconsistent geometry, bad widths, ...)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewareError {
    /// Create a new invalid frame error
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Create a new invalid file format error
    pub fn invalid_file_format(msg: impl Into<String>) -> Self {
        Self::InvalidFileFormat(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
