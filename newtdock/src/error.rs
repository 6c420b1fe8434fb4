//! Error types for newtdock.

use std::io;
use thiserror::Error;

/// Result type for newtdock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for newtdock operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, package file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Frame checksum mismatch.
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// Checksum carried in the frame trailer.
        expected: u16,
        /// Checksum computed over the received payload.
        actual: u16,
    },

    /// Frame violates the bisync framing rules.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Layer type byte does not name a known frame type.
    #[error("Unknown frame type: {0:#04x}")]
    UnknownFrameType(u8),

    /// Package cannot be described by the 32-bit size field.
    #[error("Package too large: {0} bytes")]
    PackageTooLarge(u64),

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Operation stopped by the embedding application.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}
