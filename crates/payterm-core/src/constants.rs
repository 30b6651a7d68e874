//! Core constants for the payment terminal integration.
//!
//! The vendor device driver reports every outcome as a signed integer status
//! code. Only a handful of codes carry meaning for the connection state
//! machine:
//!
//! | Code | Meaning |
//! |------|---------|
//! | `0` | success |
//! | `-30` | pairing required (first-time setup, not an error) |
//! | `< 0` | error |
//! | `> 0` | informational |
//!
//! # Usage
//!
//! ```
//! use payterm_core::constants::*;
//!
//! assert_eq!(STATUS_SUCCESS, 0);
//! assert!(STATUS_PAIRING_REQUIRED > LOGIN_FAILURE_THRESHOLD);
//! ```

// ============================================================================
// Device Status Codes
// ============================================================================

/// Status code reported by the driver when an operation succeeded.
pub const STATUS_SUCCESS: i32 = 0;

/// Status code reported while the terminal still needs its first-time pairing.
///
/// The terminal is frequently usable right after a login attempt even though
/// this code is negative.
pub const STATUS_PAIRING_REQUIRED: i32 = -30;

/// Login status codes strictly above this value are treated as recoverable
/// during the pairing workaround.
///
/// The cut-off is a field heuristic; it is overridable through
/// [`TerminalSettings::login_failure_threshold`](crate::TerminalSettings).
pub const LOGIN_FAILURE_THRESHOLD: i32 = -100;

// ============================================================================
// Initialization Timing (milliseconds)
// ============================================================================

/// Wait bound for the full pairing configuration strategy.
pub const DEFAULT_PRIMARY_TIMEOUT_MS: u64 = 30_000;

/// Wait bound for the minimal configuration fallback strategy.
pub const DEFAULT_FALLBACK_TIMEOUT_MS: u64 = 20_000;

/// Wait bound for server-listen mode initialization.
pub const DEFAULT_SERVER_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// Pairing Configuration
// ============================================================================

/// Retry attempts requested from the driver in the full pairing configuration.
pub const PAIRING_RETRY_ATTEMPTS: u32 = 10;

/// Connection timeout requested from the driver in the full pairing configuration.
pub const PAIRING_CONNECTION_TIMEOUT_MS: u64 = 60_000;

/// Port the driver listens on in server mode.
pub const DEFAULT_SERVER_PORT: u16 = 8085;

// ============================================================================
// Defaults
// ============================================================================

/// Currency used when the caller does not specify one.
pub const DEFAULT_CURRENCY: &str = "DKK";

/// Username presented to the terminal on login.
pub const DEFAULT_LOGIN_USERNAME: &str = "username";

/// Authorization code sent back on host authorization pass-through.
pub const HOST_AUTHORIZATION_CODE: &str = "123456";

/// EMV tag carrying the authorization response code.
pub const EMV_TAG_AUTH_RESPONSE_CODE: &str = "8A";

/// Authorization response code "00" (approved), ASCII hex encoded.
pub const EMV_APPROVED_RESPONSE: &str = "3030";
