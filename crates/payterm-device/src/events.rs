//! Asynchronous events emitted by the device driver.
//!
//! The vendor listener interface has a callback per event category. Only a
//! handful matter to the connection core; everything else is carried as
//! [`DeviceEvent::Other`] so listeners can accept and discard it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::DeviceStatus;

/// Event categories the driver reports but the connection core ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EventCategory {
    Notification,
    AmountAdjusted,
    Basket,
    BasketAdjusted,
    DeviceManagement,
    Loyalty,
    CardInformation,
    ReceiptDeliveryMethod,
    StoredValueCard,
    UserInput,
    Reconciliation,
    ReconciliationsList,
    TransactionQuery,
    HostFinalizeTransaction,
    Pin,
    Print,
    ScannerData,
    ScannerState,
    DeviceVitals,
    TerminalConfigRequest,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Kind of a transaction-manager event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionEventKind {
    LoginCompleted,
    SessionStarted,
    SessionEnded,
    Other(String),
}

/// A payment finished on the terminal (approved or not).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompletedEvent {
    pub status: DeviceStatus,
    pub payment_id: String,
}

/// Commerce-level notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommerceEvent {
    pub kind: String,
    pub status: DeviceStatus,
}

/// Transaction-manager notification (login, session lifecycle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub kind: TransactionEventKind,
    pub status: DeviceStatus,
}

/// The terminal asks the host to authorize a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAuthorizationEvent {
    pub status: DeviceStatus,

    /// Total amount as formatted by the driver (e.g. `"12.50"`).
    pub total_amount: Option<String>,
}

/// Any event delivered through [`DeviceListener`](crate::DeviceListener).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// Plain status update; drives initialization.
    Status(DeviceStatus),
    PaymentCompleted(PaymentCompletedEvent),
    Commerce(CommerceEvent),
    Transaction(TransactionEvent),
    HostAuthorization(HostAuthorizationEvent),
    /// Categories with no handling in the connection core.
    Other {
        category: EventCategory,
        status: DeviceStatus,
    },
}

impl DeviceEvent {
    /// Shorthand for a status event.
    pub fn status(code: i32, message: impl Into<String>) -> Self {
        Self::Status(DeviceStatus::new(code, message))
    }

    /// Status carried by the event, whatever its kind.
    pub fn device_status(&self) -> &DeviceStatus {
        match self {
            Self::Status(status) => status,
            Self::PaymentCompleted(event) => &event.status,
            Self::Commerce(event) => &event.status,
            Self::Transaction(event) => &event.status,
            Self::HostAuthorization(event) => &event.status,
            Self::Other { status, .. } => status,
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> String {
        match self {
            Self::Status(_) => "Status".to_string(),
            Self::PaymentCompleted(_) => "PaymentCompleted".to_string(),
            Self::Commerce(_) => "Commerce".to_string(),
            Self::Transaction(_) => "Transaction".to_string(),
            Self::HostAuthorization(_) => "HostAuthorization".to_string(),
            Self::Other { category, .. } => category.to_string(),
        }
    }
}
