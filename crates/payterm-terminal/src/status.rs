//! Normalization of raw driver status codes.

use payterm_core::constants::{STATUS_PAIRING_REQUIRED, STATUS_SUCCESS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Code used for failures raised locally rather than reported by the driver.
pub const LOCAL_FAULT_CODE: i32 = i32::MIN;

/// How an initialization attempt ended, as far as the driver told us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitOutcome {
    Success,
    /// Pairing required. Not an error: drives the login workaround.
    FirstTimeSetup,
    Error,
}

impl fmt::Display for InitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A raw status code mapped onto an [`InitOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedStatus {
    pub outcome: InitOutcome,
    pub raw_code: i32,
    pub message: String,
}

impl NormalizedStatus {
    /// Classify a raw status code.
    ///
    /// Returns `None` for informational codes (non-negative and not success),
    /// which must never resolve an initialization.
    ///
    /// # Examples
    ///
    /// ```
    /// use payterm_terminal::{InitOutcome, NormalizedStatus};
    ///
    /// assert_eq!(NormalizedStatus::classify(0, "OK").unwrap().outcome, InitOutcome::Success);
    /// assert_eq!(
    ///     NormalizedStatus::classify(-30, "configure").unwrap().outcome,
    ///     InitOutcome::FirstTimeSetup
    /// );
    /// assert_eq!(NormalizedStatus::classify(-7, "boom").unwrap().outcome, InitOutcome::Error);
    /// assert!(NormalizedStatus::classify(12, "progress").is_none());
    /// ```
    pub fn classify(code: i32, message: impl Into<String>) -> Option<Self> {
        let outcome = match code {
            STATUS_SUCCESS => InitOutcome::Success,
            STATUS_PAIRING_REQUIRED => InitOutcome::FirstTimeSetup,
            c if c < 0 => InitOutcome::Error,
            _ => return None,
        };
        Some(Self {
            outcome,
            raw_code: code,
            message: message.into(),
        })
    }

    /// Error raised locally (driver fault, worker failure).
    pub fn fault(message: impl Into<String>) -> Self {
        Self {
            outcome: InitOutcome::Error,
            raw_code: LOCAL_FAULT_CODE,
            message: message.into(),
        }
    }
}
