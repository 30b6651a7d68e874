use crate::{Result, constants::DEFAULT_CURRENCY, error::Error};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ISO 4217 alphabetic currency code (three ASCII letters, uppercase).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a new currency code with validation.
    ///
    /// The code is normalized (trimmed and converted to uppercase) before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCurrency` unless the code is exactly three ASCII letters.
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_uppercase();

        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(Error::InvalidCurrency(format!(
                "expected three ASCII letters, got {code:?}"
            )));
        }

        Ok(CurrencyCode(code))
    }

    /// Get the currency code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        CurrencyCode(DEFAULT_CURRENCY.to_string())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CurrencyCode::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        CurrencyCode::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// Payment amount in major currency units, kept as a fixed-point decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Create a new amount with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidAmount` if the value is zero or negative.
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "amount must be positive, got {value}"
            )));
        }
        Ok(Amount(value))
    }

    /// Get the underlying decimal value.
    #[must_use]
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::str::FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: Decimal = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidAmount(format!("not a decimal number: {s:?}")))?;
        Amount::new(value)
    }
}

/// Lifecycle status of a payment as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{status}")
    }
}

/// Payment request as submitted by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Requested amount in major currency units.
    pub amount: Decimal,

    /// Currency code; the configured default applies when absent.
    #[serde(default)]
    pub currency: Option<String>,
}

impl PaymentRequest {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            currency: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

/// Result of a payment request, returned instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub message: String,
    pub receipt_url: Option<String>,
}

impl PaymentResponse {
    pub fn processing(transaction_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            transaction_id: Some(transaction_id.into()),
            status: PaymentStatus::Processing,
            message: message.into(),
            receipt_url: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            transaction_id: None,
            status: PaymentStatus::Failed,
            message: message.into(),
            receipt_url: None,
        }
    }
}

impl From<PaymentStatusEvent> for PaymentResponse {
    fn from(event: PaymentStatusEvent) -> Self {
        Self {
            transaction_id: Some(event.payment_id),
            status: event.status,
            message: event.message,
            receipt_url: None,
        }
    }
}

/// Asynchronous payment outcome published when the terminal completes a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusEvent {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub message: String,
    pub received_at: DateTime<Utc>,
}

impl PaymentStatusEvent {
    pub fn new(
        payment_id: impl Into<String>,
        status: PaymentStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            payment_id: payment_id.into(),
            status,
            message: message.into(),
            received_at: Utc::now(),
        }
    }
}

/// Generate a fresh payment identifier.
#[must_use]
pub fn new_payment_id() -> String {
    Uuid::new_v4().to_string()
}
