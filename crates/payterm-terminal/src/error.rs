//! Error types surfaced by session operations.
//!
//! Initialization failures never show up here: they are absorbed into the
//! readiness state (see [`TerminalManager::last_error`]). Everything a caller
//! can get back from a session operation is one [`TerminalError`] carrying a
//! human-readable message.
//!
//! [`TerminalManager::last_error`]: crate::TerminalManager::last_error

use payterm_device::DeviceError;

use crate::state::TerminalState;

/// Result type alias for terminal operations.
pub type Result<T> = std::result::Result<T, TerminalError>;

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    /// A session operation was invoked while the terminal is not ready.
    #[error("Terminal not initialized. Please initialize first (attempted {operation})")]
    NotInitialized { operation: &'static str },

    /// The driver answered with a non-success result.
    #[error("{operation} rejected by terminal: {message}")]
    DeviceRejected {
        operation: &'static str,
        /// Vendor status code, when the driver call returns one.
        code: Option<i32>,
        message: String,
    },

    /// The driver itself failed while executing the call.
    #[error("Device fault during {operation}: {source}")]
    DeviceFault {
        operation: &'static str,
        #[source]
        source: DeviceError,
    },

    /// Caller input failed validation (amount, currency).
    #[error(transparent)]
    Validation(#[from] payterm_core::Error),

    /// The connection state machine refused a transition.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: TerminalState,
        to: TerminalState,
    },
}

impl TerminalError {
    pub fn not_initialized(operation: &'static str) -> Self {
        Self::NotInitialized { operation }
    }

    pub fn rejected(operation: &'static str, code: Option<i32>, message: impl Into<String>) -> Self {
        Self::DeviceRejected {
            operation,
            code,
            message: message.into(),
        }
    }

    pub fn fault(operation: &'static str, source: DeviceError) -> Self {
        Self::DeviceFault { operation, source }
    }
}
