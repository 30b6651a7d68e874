//! Session operations.
//!
//! Synchronous calls against the ready device. Each one checks readiness
//! first and fails with [`TerminalError::NotInitialized`] without touching
//! the driver; the driver's immediate result decides success.

use payterm_core::{Amount, CurrencyCode, PaymentRequest, PaymentResponse, new_payment_id};
use payterm_device::{
    DeviceAmount, DeviceError, DeviceFactory, LoginCredentials, PaymentInstruction,
    SessionTransaction, TerminalDevice,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, TerminalError};
use crate::manager::TerminalManager;

/// A payment accepted by the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSubmission {
    pub payment_id: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

fn fault(operation: &'static str) -> impl FnOnce(DeviceError) -> TerminalError {
    move |source| TerminalError::fault(operation, source)
}

impl<F: DeviceFactory> TerminalManager<F> {
    /// Run `call` against the device if the terminal is ready.
    fn with_ready_device<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&mut F::Device) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.shared.lock();
        if !inner.readiness.is_initialized() {
            warn!(operation, state = %inner.readiness.state(), "terminal not initialized");
            return Err(TerminalError::not_initialized(operation));
        }
        let Some(active) = inner.device.as_mut() else {
            warn!(operation, "ready without a device");
            return Err(TerminalError::not_initialized(operation));
        };
        call(active.device_mut())
    }

    /// Log in with the configured username.
    pub fn login(&self) -> Result<()> {
        let credentials = LoginCredentials::username(self.shared.settings.login_username.clone());
        self.with_ready_device("login", |device| {
            let status = device
                .login_with_credentials(&credentials)
                .map_err(fault("login"))?;
            if !status.is_success() {
                return Err(TerminalError::rejected("login", Some(status.code), status.message));
            }
            info!(username = %credentials.username, "logged in");
            Ok(())
        })
    }

    /// Open a session transaction in the default currency.
    pub fn start_session(&self) -> Result<()> {
        let transaction = SessionTransaction {
            currency: self.shared.settings.default_currency.to_string(),
        };
        self.with_ready_device("start session", |device| {
            let started = device
                .start_session(&transaction)
                .map_err(fault("start session"))?;
            if !started {
                return Err(TerminalError::rejected("start session", None, "Failed to start session"));
            }
            info!(currency = %transaction.currency, "session started");
            Ok(())
        })
    }

    /// Submit a payment for `amount`, in `currency` or the default one.
    ///
    /// The amount reaches the driver exactly as given: `12.50` becomes
    /// mantissa `1250`, scale `2`.
    pub fn submit_payment(
        &self,
        amount: Decimal,
        currency: Option<&str>,
    ) -> Result<PaymentSubmission> {
        self.with_ready_device("submit payment", |device| {
            let amount = Amount::new(amount)?;
            let currency = match currency {
                Some(code) => CurrencyCode::new(code)?,
                None => self.shared.settings.default_currency.clone(),
            };
            let total = DeviceAmount::from_decimal(amount.value())
                .map_err(|e| payterm_core::Error::InvalidAmount(e.to_string()))?;

            let instruction = PaymentInstruction {
                payment_id: new_payment_id(),
                total,
                currency: currency.to_string(),
            };
            debug!(payment_id = %instruction.payment_id, %total, %currency, "starting payment");

            let status = device
                .start_payment(&instruction)
                .map_err(fault("submit payment"))?;
            if !status.is_success() {
                return Err(TerminalError::rejected(
                    "submit payment",
                    Some(status.code),
                    status.message,
                ));
            }

            info!(payment_id = %instruction.payment_id, %total, %currency, "payment submitted");
            Ok(PaymentSubmission {
                payment_id: instruction.payment_id,
                amount: amount.value(),
                currency,
            })
        })
    }

    /// Submit a payment request; failures come back as a `Failed` response.
    pub fn initiate_payment(&self, request: &PaymentRequest) -> PaymentResponse {
        match self.submit_payment(request.amount, request.currency.as_deref()) {
            Ok(submission) => {
                PaymentResponse::processing(submission.payment_id, "Payment processing started")
            }
            Err(e) => {
                warn!(error = %e, "payment initiation failed");
                PaymentResponse::failed(format!("Payment initiation failed: {e}"))
            }
        }
    }

    /// Status of a submitted payment.
    ///
    /// Answers from the completions the terminal has reported; a payment
    /// with no reported completion is still processing.
    pub fn payment_status(&self, transaction_id: &str) -> PaymentResponse {
        match self.shared.dispatcher.payment_outcome(transaction_id) {
            Some(event) => event.into(),
            None => PaymentResponse::processing(transaction_id, "Payment status being processed"),
        }
    }

    pub fn end_session(&self) -> Result<()> {
        self.with_ready_device("end session", |device| {
            let ended = device.end_session().map_err(fault("end session"))?;
            if !ended {
                return Err(TerminalError::rejected("end session", None, "Failed to end session"));
            }
            info!("session ended");
            Ok(())
        })
    }

    /// Release the device and reset readiness.
    ///
    /// Readiness is cleared and any in-flight initialization superseded even
    /// when the driver's teardown fails; that failure is still reported.
    pub fn tear_down(&self) -> Result<()> {
        let released = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.readiness.reset();
            inner.device.take()
        };

        match released {
            Some(device) => {
                device.release().map_err(fault("tear down"))?;
                info!("terminal torn down");
            }
            None => debug!("tear down with no device"),
        }
        Ok(())
    }
}
