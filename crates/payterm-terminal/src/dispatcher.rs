//! Status dispatcher.
//!
//! Single sink for every asynchronous driver event. It keeps the diagnostic
//! counters, resolves the pending initialization gate, forwards host
//! authorization requests and publishes payment outcomes.
//!
//! Events arrive on the driver's thread and may race with application calls.
//! `on_event` never blocks: counters sit behind a short-lived mutex, the gate
//! resolution is a non-blocking store, and forwarding goes through
//! unbounded/broadcast channels.
//!
//! # Attempt binding
//!
//! Every initialization attempt arms a fresh [`InitGate`] and hands the driver
//! an [`AttemptListener`] bound to that attempt. An event carrying any other
//! attempt id still updates the counters but can never resolve the current
//! gate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use payterm_core::{PaymentStatus, PaymentStatusEvent};
use payterm_device::{
    DeviceAmount, DeviceEvent, DeviceListener, HostAuthorizationEvent, PaymentCompletedEvent,
    TransactionEvent, TransactionEventKind,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

use crate::gate::{AttemptId, InitGate};
use crate::status::{InitOutcome, NormalizedStatus};

/// Capacity of the payment event broadcast channel.
const PAYMENT_EVENT_CAPACITY: usize = 64;

/// Completed payments kept for status lookups.
const PAYMENT_HISTORY_SIZE: usize = 256;

/// Diagnostic counters exposed through the terminal manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounters {
    pub last_status_code: i32,
    pub last_status_message: String,
    /// Negative status codes seen on plain status events.
    pub error_count: u64,
    /// Every event observed, whatever its kind.
    pub event_count: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Host authorization request forwarded to the terminal manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAuthorizationRequest {
    pub attempt: AttemptId,
    pub amount: DeviceAmount,
}

/// Routes driver events to counters, the pending gate and subscribers.
#[derive(Debug)]
pub struct StatusDispatcher {
    counters: Mutex<StatusCounters>,
    pending: Mutex<Option<Arc<InitGate>>>,
    next_attempt: AtomicU64,
    payments: broadcast::Sender<PaymentStatusEvent>,
    completed: Mutex<VecDeque<PaymentStatusEvent>>,
    host_requests: mpsc::UnboundedSender<HostAuthorizationRequest>,
}

impl StatusDispatcher {
    /// Create a dispatcher and the receiving end of its host authorization
    /// channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostAuthorizationRequest>) {
        let (payments, _) = broadcast::channel(PAYMENT_EVENT_CAPACITY);
        let (host_requests, host_rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            counters: Mutex::new(StatusCounters::default()),
            pending: Mutex::new(None),
            next_attempt: AtomicU64::new(1),
            payments,
            completed: Mutex::new(VecDeque::with_capacity(PAYMENT_HISTORY_SIZE)),
            host_requests,
        };
        (dispatcher, host_rx)
    }

    /// Arm a fresh gate for a new attempt, replacing any previous one.
    pub fn arm(&self) -> Arc<InitGate> {
        let attempt = AttemptId::new(self.next_attempt.fetch_add(1, Ordering::Relaxed));
        let gate = Arc::new(InitGate::new(attempt));

        let previous = lock(&self.pending).replace(Arc::clone(&gate));
        if let Some(previous) = previous {
            debug!(previous = %previous.attempt(), %attempt, "replacing pending gate");
        }
        trace!(%attempt, "gate armed");
        gate
    }

    /// Drop the pending gate if it still belongs to `attempt`.
    ///
    /// Returns `true` if a gate was removed.
    pub fn disarm(&self, attempt: AttemptId) -> bool {
        let mut pending = lock(&self.pending);
        let owned = pending.as_ref().is_some_and(|gate| gate.attempt() == attempt);
        if owned {
            *pending = None;
        }
        owned
    }

    /// Attempt currently awaiting resolution, if any.
    pub fn pending_attempt(&self) -> Option<AttemptId> {
        lock(&self.pending).as_ref().map(|gate| gate.attempt())
    }

    /// Listener to hand to the driver for `attempt`.
    pub fn listener(self: &Arc<Self>, attempt: AttemptId) -> Arc<dyn DeviceListener> {
        Arc::new(AttemptListener {
            attempt,
            dispatcher: Arc::clone(self),
        })
    }

    /// Snapshot of the counters.
    pub fn counters(&self) -> StatusCounters {
        lock(&self.counters).clone()
    }

    pub fn reset_counters(&self) {
        *lock(&self.counters) = StatusCounters::default();
        debug!("status counters reset");
    }

    /// Subscribe to payment outcomes reported by the terminal.
    pub fn subscribe_payments(&self) -> broadcast::Receiver<PaymentStatusEvent> {
        self.payments.subscribe()
    }

    /// Latest completion reported for `payment_id`, if still remembered.
    pub fn payment_outcome(&self, payment_id: &str) -> Option<PaymentStatusEvent> {
        lock(&self.completed)
            .iter()
            .rev()
            .find(|event| event.payment_id == payment_id)
            .cloned()
    }

    /// Handle one driver event delivered through the listener of `attempt`.
    pub fn on_event(&self, attempt: AttemptId, event: DeviceEvent) {
        let status = event.device_status();
        let classified = match &event {
            DeviceEvent::Status(_) => NormalizedStatus::classify(status.code, &status.message),
            _ => None,
        };
        self.record(status.code, &status.message, classified.as_ref());

        match event {
            DeviceEvent::Status(status) => match classified {
                Some(normalized) => self.resolve(attempt, normalized),
                None => debug!(%attempt, code = status.code, message = %status.message, "informational status"),
            },
            DeviceEvent::PaymentCompleted(event) => self.publish_payment(event),
            DeviceEvent::Transaction(event) => log_transaction(&event),
            DeviceEvent::Commerce(event) => {
                info!(kind = %event.kind, status = %event.status, "commerce event");
            }
            DeviceEvent::HostAuthorization(event) => self.forward_host_authorization(attempt, event),
            DeviceEvent::Other { category, status } => {
                trace!(%category, %status, "unhandled event category");
            }
        }
    }

    fn record(&self, code: i32, message: &str, classified: Option<&NormalizedStatus>) {
        let mut counters = lock(&self.counters);
        counters.last_status_code = code;
        counters.last_status_message = message.to_string();
        counters.event_count += 1;
        counters.last_event_at = Some(Utc::now());
        if classified.is_some_and(|status| status.outcome == InitOutcome::Error) {
            counters.error_count += 1;
        }
    }

    fn resolve(&self, attempt: AttemptId, status: NormalizedStatus) {
        let gate = lock(&self.pending).clone();
        match gate {
            Some(gate) if gate.attempt() == attempt => {
                match status.outcome {
                    InitOutcome::Error => {
                        error!(%attempt, code = status.raw_code, message = %status.message, "initialization error reported");
                    }
                    outcome => {
                        info!(%attempt, %outcome, code = status.raw_code, message = %status.message, "initialization status reported");
                    }
                }
                gate.resolve(status);
            }
            Some(gate) => {
                warn!(
                    %attempt,
                    pending = %gate.attempt(),
                    code = status.raw_code,
                    "ignoring status from stale attempt"
                );
            }
            None => {
                debug!(%attempt, code = status.raw_code, message = %status.message, "status with no pending initialization");
            }
        }
    }

    fn publish_payment(&self, event: PaymentCompletedEvent) {
        let (status, message) = if event.status.is_success() {
            (PaymentStatus::Completed, "Payment successful".to_string())
        } else {
            (PaymentStatus::Failed, event.status.message.clone())
        };
        info!(payment_id = %event.payment_id, %status, code = event.status.code, "payment completed");

        let update = PaymentStatusEvent::new(event.payment_id, status, message);
        {
            let mut completed = lock(&self.completed);
            if completed.len() == PAYMENT_HISTORY_SIZE {
                completed.pop_front();
            }
            completed.push_back(update.clone());
        }
        if self.payments.send(update).is_err() {
            trace!("no payment subscribers");
        }
    }

    fn forward_host_authorization(&self, attempt: AttemptId, event: HostAuthorizationEvent) {
        if !event.status.is_success() {
            warn!(%attempt, status = %event.status, "host authorization event without success status");
            return;
        }
        let Some(total) = event.total_amount.as_deref() else {
            warn!(%attempt, "host authorization request without amount");
            return;
        };

        let amount = match total
            .trim()
            .parse::<Decimal>()
            .map_err(|e| e.to_string())
            .and_then(|value| DeviceAmount::from_decimal(value).map_err(|e| e.to_string()))
        {
            Ok(amount) => amount,
            Err(e) => {
                error!(%attempt, total, error = %e, "unparseable host authorization amount");
                return;
            }
        };

        info!(%attempt, %amount, "host authorization requested");
        if self
            .host_requests
            .send(HostAuthorizationRequest { attempt, amount })
            .is_err()
        {
            warn!(%attempt, "host authorization responder is gone");
        }
    }
}

fn log_transaction(event: &TransactionEvent) {
    let success = event.status.is_success();
    match &event.kind {
        TransactionEventKind::LoginCompleted if success => info!(status = %event.status, "login completed"),
        TransactionEventKind::LoginCompleted => warn!(status = %event.status, "login failed"),
        TransactionEventKind::SessionStarted => info!(status = %event.status, "session started"),
        TransactionEventKind::SessionEnded => info!(status = %event.status, "session ended"),
        TransactionEventKind::Other(kind) => debug!(kind, status = %event.status, "transaction event"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Driver listener bound to one initialization attempt.
#[derive(Debug)]
pub struct AttemptListener {
    attempt: AttemptId,
    dispatcher: Arc<StatusDispatcher>,
}

impl AttemptListener {
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }
}

impl DeviceListener for AttemptListener {
    fn on_event(&self, event: DeviceEvent) {
        self.dispatcher.on_event(self.attempt, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::WaitResult;
    use payterm_core::constants::STATUS_PAIRING_REQUIRED;
    use payterm_device::{CommerceEvent, DeviceStatus, EventCategory};
    use proptest::prelude::*;
    use std::time::Duration;

    fn dispatcher() -> (Arc<StatusDispatcher>, mpsc::UnboundedReceiver<HostAuthorizationRequest>) {
        let (dispatcher, rx) = StatusDispatcher::new();
        (Arc::new(dispatcher), rx)
    }

    #[tokio::test]
    async fn test_status_resolves_armed_gate() {
        let (dispatcher, _rx) = dispatcher();
        let gate = dispatcher.arm();
        let listener = dispatcher.listener(gate.attempt());

        listener.on_event(DeviceEvent::status(0, "Initialization complete"));

        match gate.wait(Duration::from_millis(10)).await {
            WaitResult::Resolved(status) => assert_eq!(status.outcome, InitOutcome::Success),
            WaitResult::TimedOut => panic!("gate should be resolved"),
        }
    }

    #[test]
    fn test_informational_status_does_not_resolve() {
        let (dispatcher, _rx) = dispatcher();
        let gate = dispatcher.arm();

        dispatcher.on_event(gate.attempt(), DeviceEvent::status(12, "Connecting"));

        assert!(!gate.is_resolved());
        let counters = dispatcher.counters();
        assert_eq!(counters.last_status_code, 12);
        assert_eq!(counters.last_status_message, "Connecting");
        assert_eq!(counters.error_count, 0);
    }

    #[test]
    fn test_stale_attempt_cannot_resolve() {
        let (dispatcher, _rx) = dispatcher();
        let stale = dispatcher.arm();
        let current = dispatcher.arm();
        assert_ne!(stale.attempt(), current.attempt());

        dispatcher.on_event(stale.attempt(), DeviceEvent::status(0, "late success"));

        assert!(!current.is_resolved());
        assert!(!stale.is_resolved());
        assert_eq!(dispatcher.counters().last_status_message, "late success");
    }

    #[test]
    fn test_status_without_pending_gate_only_counts() {
        let (dispatcher, _rx) = dispatcher();
        let gate = dispatcher.arm();
        assert!(dispatcher.disarm(gate.attempt()));
        assert_eq!(dispatcher.pending_attempt(), None);

        dispatcher.on_event(gate.attempt(), DeviceEvent::status(-5, "late failure"));

        assert!(!gate.is_resolved());
        assert_eq!(dispatcher.counters().error_count, 1);
    }

    #[test]
    fn test_disarm_ignores_other_attempt() {
        let (dispatcher, _rx) = dispatcher();
        let first = dispatcher.arm();
        let second = dispatcher.arm();

        assert!(!dispatcher.disarm(first.attempt()));
        assert_eq!(dispatcher.pending_attempt(), Some(second.attempt()));
    }

    #[test]
    fn test_second_status_for_same_attempt_is_ignored() {
        let (dispatcher, _rx) = dispatcher();
        let gate = dispatcher.arm();

        dispatcher.on_event(gate.attempt(), DeviceEvent::status(-30, "Configure device"));
        dispatcher.on_event(gate.attempt(), DeviceEvent::status(-2, "Follow-up error"));

        let outcome = gate.outcome().unwrap();
        assert_eq!(outcome.outcome, InitOutcome::FirstTimeSetup);
        assert_eq!(dispatcher.counters().error_count, 1);
    }

    #[test]
    fn test_non_status_events_update_last_status_only() {
        let (dispatcher, _rx) = dispatcher();
        let gate = dispatcher.arm();

        dispatcher.on_event(
            gate.attempt(),
            DeviceEvent::Commerce(CommerceEvent {
                kind: "CardInserted".to_string(),
                status: DeviceStatus::new(-3, "Card read error"),
            }),
        );
        dispatcher.on_event(
            gate.attempt(),
            DeviceEvent::Other {
                category: EventCategory::Print,
                status: DeviceStatus::new(4, "Printing"),
            },
        );

        assert!(!gate.is_resolved());
        let counters = dispatcher.counters();
        assert_eq!(counters.last_status_code, 4);
        assert_eq!(counters.error_count, 0);
        assert_eq!(counters.event_count, 2);
    }

    #[test]
    fn test_payment_completed_is_published() {
        let (dispatcher, _rx) = dispatcher();
        let mut payments = dispatcher.subscribe_payments();

        dispatcher.on_event(
            AttemptId::new(99),
            DeviceEvent::PaymentCompleted(PaymentCompletedEvent {
                status: DeviceStatus::success("Approved"),
                payment_id: "pay-1".to_string(),
            }),
        );
        dispatcher.on_event(
            AttemptId::new(99),
            DeviceEvent::PaymentCompleted(PaymentCompletedEvent {
                status: DeviceStatus::new(-8, "Card declined"),
                payment_id: "pay-2".to_string(),
            }),
        );

        let approved = payments.try_recv().unwrap();
        assert_eq!(approved.payment_id, "pay-1");
        assert_eq!(approved.status, PaymentStatus::Completed);
        assert_eq!(approved.message, "Payment successful");

        let declined = payments.try_recv().unwrap();
        assert_eq!(declined.status, PaymentStatus::Failed);
        assert_eq!(declined.message, "Card declined");
    }

    #[test]
    fn test_payment_outcome_lookup() {
        let (dispatcher, _rx) = dispatcher();
        assert!(dispatcher.payment_outcome("pay-1").is_none());

        for (code, message) in [(-8, "Card declined"), (0, "Approved")] {
            dispatcher.on_event(
                AttemptId::new(1),
                DeviceEvent::PaymentCompleted(PaymentCompletedEvent {
                    status: DeviceStatus::new(code, message),
                    payment_id: "pay-1".to_string(),
                }),
            );
        }

        let latest = dispatcher.payment_outcome("pay-1").unwrap();
        assert_eq!(latest.status, PaymentStatus::Completed);
        assert!(dispatcher.payment_outcome("pay-2").is_none());
    }

    #[test]
    fn test_payment_history_is_bounded() {
        let (dispatcher, _rx) = dispatcher();
        for index in 0..=PAYMENT_HISTORY_SIZE {
            dispatcher.on_event(
                AttemptId::new(1),
                DeviceEvent::PaymentCompleted(PaymentCompletedEvent {
                    status: DeviceStatus::success("Approved"),
                    payment_id: format!("pay-{index}"),
                }),
            );
        }

        assert!(dispatcher.payment_outcome("pay-0").is_none());
        assert!(dispatcher.payment_outcome(&format!("pay-{PAYMENT_HISTORY_SIZE}")).is_some());
    }

    #[test]
    fn test_host_authorization_is_forwarded() {
        let (dispatcher, mut rx) = dispatcher();

        dispatcher.on_event(
            AttemptId::new(3),
            DeviceEvent::HostAuthorization(HostAuthorizationEvent {
                status: DeviceStatus::success("Authorize"),
                total_amount: Some("12.50".to_string()),
            }),
        );

        let request = rx.try_recv().unwrap();
        assert_eq!(request.attempt, AttemptId::new(3));
        assert_eq!((request.amount.mantissa, request.amount.scale), (1250, 2));
    }

    #[test]
    fn test_host_authorization_without_amount_is_dropped() {
        let (dispatcher, mut rx) = dispatcher();

        for total in [None, Some("twelve".to_string())] {
            dispatcher.on_event(
                AttemptId::new(3),
                DeviceEvent::HostAuthorization(HostAuthorizationEvent {
                    status: DeviceStatus::success("Authorize"),
                    total_amount: total,
                }),
            );
        }

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reset_counters() {
        let (dispatcher, _rx) = dispatcher();
        dispatcher.on_event(AttemptId::new(1), DeviceEvent::status(-1, "boom"));
        assert_eq!(dispatcher.counters().error_count, 1);

        dispatcher.reset_counters();
        assert_eq!(dispatcher.counters(), StatusCounters::default());
    }

    #[test]
    fn test_counters_serialize_camel_case() {
        let json = serde_json::to_value(StatusCounters::default()).unwrap();
        assert!(json.get("lastStatusCode").is_some());
        assert!(json.get("errorCount").is_some());
    }

    proptest! {
        #[test]
        fn prop_counters_follow_status_stream(codes in prop::collection::vec(-200i32..200, 1..40)) {
            let (dispatcher, _rx) = StatusDispatcher::new();
            for (index, code) in codes.iter().enumerate() {
                dispatcher.on_event(AttemptId::new(1), DeviceEvent::status(*code, format!("event {index}")));
            }

            let counters = dispatcher.counters();
            let errors = codes
                .iter()
                .filter(|code| **code < 0 && **code != STATUS_PAIRING_REQUIRED)
                .count() as u64;
            prop_assert_eq!(counters.error_count, errors);
            prop_assert_eq!(counters.event_count, codes.len() as u64);
            prop_assert_eq!(counters.last_status_code, *codes.last().unwrap());
            prop_assert_eq!(counters.last_status_message, format!("event {}", codes.len() - 1));
        }
    }
}
