//! Error types for device driver operations.
//!
//! These errors describe failures raised by the driver itself (as opposed to
//! non-success status codes, which the driver returns as ordinary values).

/// Result type alias for device driver operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that can occur while talking to the device driver.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Device handle has been torn down or was never connected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Driver instance could not be created.
    #[error("Device creation failed: {message}")]
    CreationFailed { message: String },

    /// Driver rejected the initialization request outright.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data passed to or received from the driver.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },
}

impl DeviceError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new creation failed error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }
}
