//! Device driver trait definitions.
//!
//! These traits describe the vendor driver as the connection core consumes
//! it. Calls are synchronous from our side; whatever the driver does
//! internally, results either come back as a [`DeviceStatus`] or arrive later
//! through the [`DeviceListener`] on the driver's own thread.
//!
//! Unlike async traits, these are object-safe, so listeners are passed around
//! as `Arc<dyn DeviceListener>`.

use std::sync::Arc;

use crate::error::Result;
use crate::events::DeviceEvent;
use crate::types::{
    ConnectionConfig, DeviceStatus, HostAuthorizationResponse, LoginCredentials,
    PaymentInstruction, SessionTransaction,
};

/// Receiver for asynchronous driver events.
///
/// Called from the driver's internal execution context, possibly concurrently
/// with application code. Implementations must not block.
pub trait DeviceListener: Send + Sync {
    fn on_event(&self, event: DeviceEvent);
}

impl std::fmt::Debug for dyn DeviceListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeviceListener")
    }
}

/// One live driver instance bound to a physical terminal link.
///
/// # Examples
///
/// ```
/// use payterm_device::mock::MockTerminalFactory;
/// use payterm_device::{DeviceFactory, LoginCredentials, TerminalDevice};
///
/// let (factory, _handle) = MockTerminalFactory::new();
/// let mut device = factory.create().unwrap();
///
/// let status = device
///     .login_with_credentials(&LoginCredentials::username("username"))
///     .unwrap();
/// assert!(status.is_success());
///
/// device.tear_down().unwrap();
/// ```
pub trait TerminalDevice: Send + 'static {
    /// Submit a configuration; the outcome arrives through `listener`.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver refuses the request before starting.
    fn initialize_from_values(
        &mut self,
        listener: Arc<dyn DeviceListener>,
        config: &ConnectionConfig,
    ) -> Result<()>;

    /// Log in to the terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to issue the call.
    fn login_with_credentials(&mut self, credentials: &LoginCredentials) -> Result<DeviceStatus>;

    /// Open a session; `false` means the terminal refused.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to issue the call.
    fn start_session(&mut self, transaction: &SessionTransaction) -> Result<bool>;

    /// Start a payment on the terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to issue the call.
    fn start_payment(&mut self, payment: &PaymentInstruction) -> Result<DeviceStatus>;

    /// Close the current session; `false` means the terminal refused.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to issue the call.
    fn end_session(&mut self) -> Result<bool>;

    /// Answer a host authorization request.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to issue the call.
    fn respond_to_host_authorization(
        &mut self,
        response: &HostAuthorizationResponse,
    ) -> Result<DeviceStatus>;

    /// Release the terminal link. Must be safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver reports a failure while releasing.
    fn tear_down(&mut self) -> Result<()>;
}

/// Creates driver instances (`PaymentSdk.create()` in vendor terms).
pub trait DeviceFactory: Send + Sync + 'static {
    type Device: TerminalDevice;

    /// Create a fresh, unconfigured driver instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot be instantiated.
    fn create(&self) -> Result<Self::Device>;
}
