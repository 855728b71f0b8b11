//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the head unit
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Port busy: {0} is claimed by another process")]
    PortBusy(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected to head unit")]
    NotConnected,

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TransportError {
    /// True for failures raised while establishing the connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            TransportError::PortNotFound(_)
                | TransportError::PortBusy(_)
                | TransportError::ConnectionFailed(_)
        )
    }
}

/// Errors raised while loading or validating a device profile
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read profile: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid profile JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Profile field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("Accept and reject markers must differ")]
    AmbiguousMarkers,

    #[error("Markers overlap: '{inner}' occurs inside '{outer}' other than at its end")]
    OverlappingMarkers { inner: String, outer: String },

    #[error("Digit width must be between 1 and {max}, got {actual}")]
    InvalidWidth { max: u8, actual: u8 },
}
