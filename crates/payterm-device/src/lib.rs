//! Device driver boundary for the payment terminal.
//!
//! The vendor driver is an opaque asynchronous peripheral: commands are
//! fired synchronously, and their real outcome often arrives later through a
//! listener callback on the driver's own thread. This crate pins that
//! contract down as traits so the connection core can be written (and
//! tested) against it without the vendor library.
//!
//! # Driver Traits
//!
//! - [`DeviceFactory`] creates driver instances.
//! - [`TerminalDevice`] is one live instance: initialize, login, sessions,
//!   payments, host authorization, teardown.
//! - [`DeviceListener`] receives [`DeviceEvent`]s.
//!
//! ```
//! use std::sync::Arc;
//! use payterm_core::ConnectionType;
//! use payterm_device::mock::MockTerminalFactory;
//! use payterm_device::{ConnectionConfig, DeviceEvent, DeviceFactory, DeviceListener, TerminalDevice};
//!
//! struct PrintListener;
//!
//! impl DeviceListener for PrintListener {
//!     fn on_event(&self, event: DeviceEvent) {
//!         println!("{}: {}", event.name(), event.device_status());
//!     }
//! }
//!
//! let (factory, _handle) = MockTerminalFactory::new();
//! let mut device = factory.create().unwrap();
//! let config = ConnectionConfig::minimal("192.168.1.20", ConnectionType::Tcpip);
//! device.initialize_from_values(Arc::new(PrintListener), &config).unwrap();
//! ```
//!
//! # Error Handling
//!
//! Driver faults are [`DeviceError`]s. Non-success status codes are not
//! errors at this layer; they come back as [`DeviceStatus`] values and the
//! caller decides what they mean.
//!
//! # Mock Implementations
//!
//! The [`mock`] module provides a scriptable terminal used by the tests and
//! the command-line demo.

pub mod error;
pub mod events;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{DeviceError, Result};
pub use events::{
    CommerceEvent, DeviceEvent, EventCategory, HostAuthorizationEvent, PaymentCompletedEvent,
    TransactionEvent, TransactionEventKind,
};
pub use traits::{DeviceFactory, DeviceListener, TerminalDevice};
pub use types::{
    ConnectionConfig, DeviceAmount, DeviceStatus, HostAuthorizationResponse, HostDecision,
    LoginCredentials, PaymentInstruction, SessionTransaction,
};
