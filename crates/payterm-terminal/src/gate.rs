//! Pending-operation gate.
//!
//! A single-slot, first-resolution-wins signal bridging an asynchronous
//! driver callback to the one task waiting on an initialization attempt.
//! Resolving never blocks: it stores the outcome and wakes the waiter.
//!
//! ```text
//!  driver thread                      init worker
//!  ─────────────                      ───────────
//!  on_event(Status)                   gate.wait(30s).await
//!     │                                   ▲
//!     └──► gate.resolve(outcome) ─────────┘  (watch channel wake-up)
//! ```
//!
//! One gate is created per attempt and discarded afterwards; a resolved gate
//! stays resolved.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{trace, warn};

use crate::status::NormalizedStatus;

/// Identity of one initialization attempt (one driver instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a waiter observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResult {
    Resolved(NormalizedStatus),
    TimedOut,
}

/// Single-producer, single-consumer resolution slot for one attempt.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use payterm_terminal::{AttemptId, InitGate, NormalizedStatus, WaitResult};
///
/// #[tokio::main]
/// async fn main() {
///     let gate = InitGate::new(AttemptId::new(1));
///     gate.resolve(NormalizedStatus::classify(0, "OK").unwrap());
///
///     // Later resolutions are ignored.
///     gate.resolve(NormalizedStatus::fault("late"));
///
///     match gate.wait(Duration::from_millis(10)).await {
///         WaitResult::Resolved(status) => assert_eq!(status.message, "OK"),
///         WaitResult::TimedOut => unreachable!(),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct InitGate {
    attempt: AttemptId,
    slot: watch::Sender<Option<NormalizedStatus>>,
}

impl InitGate {
    pub fn new(attempt: AttemptId) -> Self {
        let (slot, _) = watch::channel(None);
        Self { attempt, slot }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Resolve the gate. Only the first call has an effect.
    ///
    /// Returns `true` if this call resolved the gate.
    pub fn resolve(&self, status: NormalizedStatus) -> bool {
        let outcome = status.outcome;
        let resolved = self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(status);
            true
        });

        if resolved {
            trace!(attempt = %self.attempt, %outcome, "gate resolved");
        } else {
            warn!(attempt = %self.attempt, %outcome, "gate already resolved, ignoring");
        }
        resolved
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Outcome, if resolved.
    pub fn outcome(&self) -> Option<NormalizedStatus> {
        self.slot.borrow().clone()
    }

    /// Wait until resolved or until `timeout` elapses.
    ///
    /// Returns immediately if the gate is already resolved.
    pub async fn wait(&self, timeout: Duration) -> WaitResult {
        let mut rx = self.slot.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|value| (*value).clone())
        })
        .await;

        match waited {
            Ok(Some(status)) => WaitResult::Resolved(status),
            // The sender lives as long as `self`, so a closed channel cannot
            // happen here; treat it like an elapsed wait.
            Ok(None) | Err(_) => WaitResult::TimedOut,
        }
    }
}
