//! Error types for MEMS protocol operations.

use thiserror::Error;

/// Result type alias for MEMS operations.
pub type Result<T> = std::result::Result<T, MemsError>;

/// Error types for MEMS ECU communication.
#[derive(Error, Debug)]
pub enum MemsError {
    /// Serial port communication error
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation attempted before the serial device was opened
    #[error("Not connected to ECU")]
    NotConnected,

    /// The ECU went silent before the expected number of bytes arrived
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Number of bytes requested
        expected: usize,
        /// Number of bytes received
        actual: usize,
    },

    /// The ECU did not echo a command byte
    #[error("ECU did not acknowledge command {command:#04x}")]
    CommandRejected {
        /// Command byte that was not echoed
        command: u8,
    },

    /// A step of the link-initialization sequence failed
    #[error("Handshake failed at command {command:#04x}: {stage}")]
    Handshake {
        /// Handshake byte being processed when the failure occurred
        command: u8,
        /// What was expected at that point
        stage: &'static str,
    },

    /// Raw frame bytes have the wrong length
    #[error("Invalid {frame} frame length: expected {expected}, got {actual}")]
    InvalidFrameLength {
        /// Frame name
        frame: &'static str,
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// Byte is not a known actuator or data command
    #[error("Unknown command byte: {0:#04x}")]
    UnknownCommand(u8),

    /// Unknown protocol generation name
    #[error("Invalid protocol version: {0}")]
    InvalidProtocol(String),
}
