//! Connection state machine.
//!
//! Tracks where the terminal is in its connection lifecycle and keeps a
//! bounded transition history for diagnostics.
//!
//! # Valid Transitions
//!
//! - Uninitialized → Initializing
//! - Initializing → Ready / Failed / FirstTimePairing
//! - FirstTimePairing → Ready / Failed / Initializing (fallback strategy)
//! - Ready / Failed / Initializing → Initializing (re-initialization supersedes)
//! - any → Uninitialized (teardown, via [`ConnectionStateMachine::reset`])
//!
//! # Examples
//!
//! ```
//! use payterm_terminal::{ConnectionStateMachine, TerminalState};
//!
//! let mut machine = ConnectionStateMachine::new();
//! machine.transition_to(TerminalState::Initializing).unwrap();
//! machine.transition_to(TerminalState::Ready).unwrap();
//! assert_eq!(machine.current_state(), TerminalState::Ready);
//!
//! // Ready cannot go straight to Failed.
//! assert!(machine.transition_to(TerminalState::Failed).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerminalError};

/// Maximum number of transitions kept in history.
///
/// A full initialization with fallback and pairing produces at most five
/// transitions, so this covers a long run of re-initializations.
const MAX_HISTORY_SIZE: usize = 64;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// No device, no attempt in flight.
    Uninitialized,

    /// A connection strategy is running.
    Initializing,

    /// Driver reported pairing required; running the login workaround.
    FirstTimePairing,

    /// Terminal usable for session operations.
    Ready,

    /// Every strategy failed. See `last_error`.
    Failed,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminalState::Uninitialized => "Uninitialized",
            TerminalState::Initializing => "Initializing",
            TerminalState::FirstTimePairing => "FirstTimePairing",
            TerminalState::Ready => "Ready",
            TerminalState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

impl TerminalState {
    /// Check if `target` is reachable from this state.
    ///
    /// ```
    /// use payterm_terminal::TerminalState;
    ///
    /// assert!(TerminalState::Ready.can_transition_to(&TerminalState::Initializing));
    /// assert!(!TerminalState::Uninitialized.can_transition_to(&TerminalState::Ready));
    /// ```
    pub fn can_transition_to(&self, target: &TerminalState) -> bool {
        use TerminalState::*;

        matches!(
            (self, target),
            // Any attempt can be (re)started, superseding whatever was running.
            (_, Initializing)
            | (Initializing, Ready | Failed | FirstTimePairing)
            | (FirstTimePairing, Ready | Failed)
        )
    }

    /// True while an initialization attempt is in flight.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, TerminalState::Initializing | TerminalState::FirstTimePairing)
    }
}

/// A single recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: TerminalState,
    pub to: TerminalState,
    pub at: DateTime<Utc>,
}

impl StateTransition {
    pub fn new(from: TerminalState, to: TerminalState) -> Self {
        Self {
            from,
            to,
            at: Utc::now(),
        }
    }
}

/// Validating state machine with bounded history.
///
/// Not synchronized; the terminal manager keeps it behind its own lock.
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    current: TerminalState,
    history: VecDeque<StateTransition>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            current: TerminalState::Uninitialized,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> TerminalState {
        self.current
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Transition to `target`, rejecting moves the lifecycle does not allow.
    pub fn transition_to(&mut self, target: TerminalState) -> Result<StateTransition> {
        if !self.current.can_transition_to(&target) {
            return Err(TerminalError::InvalidStateTransition {
                from: self.current,
                to: target,
            });
        }
        Ok(self.record(target))
    }

    /// Force the machine back to `Uninitialized` regardless of the current state.
    pub fn reset(&mut self) -> StateTransition {
        self.record(TerminalState::Uninitialized)
    }

    fn record(&mut self, target: TerminalState) -> StateTransition {
        let transition = StateTransition::new(self.current, target);
        self.current = target;
        self.history.push_back(transition.clone());
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        transition
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Readiness bookkeeping: the lifecycle state plus the last failure reason.
///
/// `is_initialized()` is true exactly when the state is `Ready`.
#[derive(Debug, Clone, Default)]
pub struct ReadinessState {
    machine: ConnectionStateMachine,
    last_error: String,
}

impl ReadinessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TerminalState {
        self.machine.current_state()
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == TerminalState::Ready
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn set_last_error(&mut self, message: impl Into<String>) {
        self.last_error = message.into();
    }

    pub fn history(&self) -> &VecDeque<StateTransition> {
        self.machine.history()
    }

    /// Start an attempt: clears the previous failure reason.
    pub fn begin(&mut self) -> Result<StateTransition> {
        let transition = self.machine.transition_to(TerminalState::Initializing)?;
        self.last_error.clear();
        Ok(transition)
    }

    /// Move back to `Initializing` for the next strategy without clearing
    /// the failure reason of the previous one.
    pub fn retry(&mut self) -> Result<StateTransition> {
        self.machine.transition_to(TerminalState::Initializing)
    }

    pub fn enter_pairing(&mut self) -> Result<StateTransition> {
        self.machine.transition_to(TerminalState::FirstTimePairing)
    }

    pub fn mark_ready(&mut self) -> Result<StateTransition> {
        self.machine.transition_to(TerminalState::Ready)
    }

    /// Finalize as failed. An empty failure reason is replaced by `fallback`.
    pub fn mark_failed(&mut self, fallback: &str) -> Result<StateTransition> {
        let transition = self.machine.transition_to(TerminalState::Failed)?;
        if self.last_error.is_empty() {
            self.last_error = fallback.to_string();
        }
        Ok(transition)
    }

    pub fn reset(&mut self) -> StateTransition {
        self.machine.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use TerminalState::*;

    #[rstest]
    #[case(Uninitialized, Initializing, true)]
    #[case(Initializing, Initializing, true)]
    #[case(Initializing, Ready, true)]
    #[case(Initializing, Failed, true)]
    #[case(Initializing, FirstTimePairing, true)]
    #[case(FirstTimePairing, Ready, true)]
    #[case(FirstTimePairing, Failed, true)]
    #[case(FirstTimePairing, Initializing, true)]
    #[case(Ready, Initializing, true)]
    #[case(Failed, Initializing, true)]
    #[case(Uninitialized, Ready, false)]
    #[case(Uninitialized, Failed, false)]
    #[case(Uninitialized, FirstTimePairing, false)]
    #[case(Ready, Failed, false)]
    #[case(Ready, FirstTimePairing, false)]
    #[case(Failed, Ready, false)]
    #[case(Ready, Uninitialized, false)]
    fn test_can_transition_to(
        #[case] from: TerminalState,
        #[case] to: TerminalState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(&to), allowed);
    }

    #[test]
    fn test_new_machine_starts_uninitialized() {
        let machine = ConnectionStateMachine::new();
        assert_eq!(machine.current_state(), Uninitialized);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_invalid_transition_leaves_state_untouched() {
        let mut machine = ConnectionStateMachine::new();
        let error = machine.transition_to(Ready).unwrap_err();

        assert!(matches!(
            error,
            TerminalError::InvalidStateTransition { from: Uninitialized, to: Ready }
        ));
        assert_eq!(machine.current_state(), Uninitialized);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_pairing_flow_history() {
        let mut machine = ConnectionStateMachine::new();
        machine.transition_to(Initializing).unwrap();
        machine.transition_to(FirstTimePairing).unwrap();
        machine.transition_to(Ready).unwrap();

        let path: Vec<_> = machine.history().iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            path,
            vec![
                (Uninitialized, Initializing),
                (Initializing, FirstTimePairing),
                (FirstTimePairing, Ready),
            ]
        );
    }

    #[test]
    fn test_reset_from_any_state() {
        for state in [Initializing, FirstTimePairing, Ready, Failed] {
            let mut machine = ConnectionStateMachine::new();
            machine.transition_to(Initializing).unwrap();
            if state != Initializing {
                if state == Ready || state == Failed {
                    machine.transition_to(state).unwrap();
                } else {
                    machine.transition_to(FirstTimePairing).unwrap();
                }
            }

            let transition = machine.reset();
            assert_eq!(transition.from, state);
            assert_eq!(transition.to, Uninitialized);
            assert_eq!(machine.current_state(), Uninitialized);
        }
    }

    #[test]
    fn test_history_size_limit() {
        let mut machine = ConnectionStateMachine::new();
        for _ in 0..100 {
            machine.transition_to(Initializing).unwrap();
            machine.transition_to(Failed).unwrap();
        }
        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(machine.history().back().map(|t| t.to), Some(Failed));
    }

    #[test]
    fn test_readiness_tracks_ready_state() {
        let mut readiness = ReadinessState::new();
        assert!(!readiness.is_initialized());

        readiness.begin().unwrap();
        assert!(!readiness.is_initialized());
        assert!(readiness.state().is_in_progress());

        readiness.mark_ready().unwrap();
        assert!(readiness.is_initialized());

        readiness.reset();
        assert!(!readiness.is_initialized());
        assert_eq!(readiness.state(), Uninitialized);
    }

    #[test]
    fn test_mark_failed_fills_empty_reason() {
        let mut readiness = ReadinessState::new();
        readiness.begin().unwrap();
        readiness.mark_failed("Initialization timed out").unwrap();
        assert_eq!(readiness.last_error(), "Initialization timed out");
    }

    #[test]
    fn test_mark_failed_keeps_recorded_reason() {
        let mut readiness = ReadinessState::new();
        readiness.begin().unwrap();
        readiness.set_last_error("Login failed after pairing-required status: locked");
        readiness.mark_failed("Initialization timed out").unwrap();
        assert_eq!(
            readiness.last_error(),
            "Login failed after pairing-required status: locked"
        );
    }

    #[test]
    fn test_begin_clears_previous_reason() {
        let mut readiness = ReadinessState::new();
        readiness.begin().unwrap();
        readiness.mark_failed("first attempt").unwrap();

        readiness.begin().unwrap();
        assert_eq!(readiness.last_error(), "");
    }

    #[test]
    fn test_retry_keeps_reason() {
        let mut readiness = ReadinessState::new();
        readiness.begin().unwrap();
        readiness.enter_pairing().unwrap();
        readiness.set_last_error("pairing login rejected");
        readiness.retry().unwrap();

        assert_eq!(readiness.state(), Initializing);
        assert_eq!(readiness.last_error(), "pairing login rejected");
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&FirstTimePairing).unwrap();
        assert_eq!(json, "\"first_time_pairing\"");
        assert_eq!(FirstTimePairing.to_string(), "FirstTimePairing");
    }
}
