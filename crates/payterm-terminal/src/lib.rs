//! Payment terminal connection core.
//!
//! Bridges an asynchronous, callback-driven terminal driver to synchronous
//! session operations:
//!
//! - [`StatusDispatcher`]: single sink for driver events; counters, gate
//!   resolution, payment and host authorization forwarding
//! - [`InitGate`]: one-shot resolution slot awaited by the initialization worker
//! - [`TerminalManager`]: connection state machine, initialization strategies
//!   and the session operations (`login`, `start_session`, `submit_payment`,
//!   `end_session`, `tear_down`)
//!
//! # Example
//!
//! ```
//! use payterm_core::TerminalSettings;
//! use payterm_device::mock::{InitResponse, MockTerminalFactory};
//! use payterm_terminal::TerminalManager;
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (factory, handle) = MockTerminalFactory::new();
//!     // Pairing required on first contact; the pairing login still succeeds.
//!     handle.queue_init(InitResponse::status(-30, "Device configuration required"));
//!
//!     let manager = TerminalManager::new(factory, TerminalSettings::default());
//!     manager.initialize_terminal().wait().await;
//!     assert!(manager.is_ready());
//!
//!     manager.login()?;
//!     manager.start_session()?;
//!     let payment = manager.submit_payment(Decimal::new(1250, 2), Some("DKK"))?;
//!     assert_eq!(handle.payments()[0].payment_id, payment.payment_id);
//!     manager.end_session()?;
//!     manager.tear_down()?;
//!     Ok(())
//! }
//! ```

pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod manager;
pub mod session;
pub mod state;
pub mod status;

pub use dispatcher::{AttemptListener, HostAuthorizationRequest, StatusCounters, StatusDispatcher};
pub use error::{Result, TerminalError};
pub use gate::{AttemptId, InitGate, WaitResult};
pub use manager::{InitMode, InitializationHandle, TerminalManager, TerminalStatusReport};
pub use session::PaymentSubmission;
pub use state::{ConnectionStateMachine, ReadinessState, StateTransition, TerminalState};
pub use status::{InitOutcome, LOCAL_FAULT_CODE, NormalizedStatus};
