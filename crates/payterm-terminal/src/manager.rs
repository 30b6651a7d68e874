//! Terminal connection manager.
//!
//! Owns the single device handle and the readiness state, and runs the
//! initialization strategy in a background task:
//!
//! 1. release whatever device is held
//! 2. arm a fresh gate, create a device, submit the full pairing config
//! 3. wait for the gate (primary timeout)
//! 4. if that did not make the terminal ready, repeat with the minimal
//!    config (fallback timeout)
//!
//! A `FirstTimeSetup` outcome triggers a pairing login: success or a
//! non-catastrophic failure code still yields `Ready`.
//!
//! Every call to [`TerminalManager::initialize_terminal`] or
//! [`TerminalManager::tear_down`] bumps a generation number. A worker only
//! touches the device slot and readiness while its generation is current, so
//! a superseded worker runs out its own timeout and exits without effect. The
//! generation check and the arming of the next gate happen under the same
//! lock, so an old worker can never displace the gate of a newer attempt.
//! Driver calls run with the lock released.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use payterm_core::constants::{
    EMV_APPROVED_RESPONSE, EMV_TAG_AUTH_RESPONSE_CODE, HOST_AUTHORIZATION_CODE,
};
use payterm_core::{ConnectionType, PaymentStatusEvent, TerminalSettings};
use payterm_device::{
    ConnectionConfig, DeviceFactory, HostAuthorizationResponse, HostDecision,
    LoginCredentials, TerminalDevice,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{HostAuthorizationRequest, StatusDispatcher};
use crate::gate::{AttemptId, InitGate, WaitResult};
use crate::state::{ReadinessState, StateTransition, TerminalState};
use crate::status::{InitOutcome, NormalizedStatus};

const FAILED_WITHOUT_REASON: &str = "Terminal initialization failed";

/// Which initialization path to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    /// Full pairing config, then minimal config as fallback.
    Primary,
    /// Terminal connects to us; single strategy.
    ServerMode,
}

/// One step of the initialization strategy.
#[derive(Debug, Clone)]
struct Strategy {
    name: &'static str,
    config: ConnectionConfig,
    timeout: Duration,
}

impl InitMode {
    fn strategies(self, settings: &TerminalSettings) -> Vec<Strategy> {
        match self {
            InitMode::Primary => vec![
                Strategy {
                    name: "full",
                    config: ConnectionConfig::full(
                        settings.device_address.clone(),
                        settings.connection_type,
                    ),
                    timeout: settings.primary_timeout(),
                },
                Strategy {
                    name: "minimal",
                    config: ConnectionConfig::minimal(
                        settings.device_address.clone(),
                        settings.connection_type,
                    ),
                    timeout: settings.fallback_timeout(),
                },
            ],
            InitMode::ServerMode => vec![Strategy {
                name: "server",
                config: ConnectionConfig::server(settings.server_port),
                timeout: settings.server_timeout(),
            }],
        }
    }
}

/// Serializable snapshot of the terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalStatusReport {
    pub initialized: bool,
    pub state: TerminalState,
    pub ip_address: String,
    pub connection_type: ConnectionType,
    pub last_error: String,
    pub last_status_code: i32,
    pub last_status_message: String,
    pub error_count: u64,
}

/// Device held by the manager, tagged with the attempt that created it.
///
/// Torn down on drop unless released explicitly.
#[derive(Debug)]
pub(crate) struct ActiveDevice<D: TerminalDevice> {
    device: D,
    attempt: AttemptId,
    released: bool,
}

impl<D: TerminalDevice> ActiveDevice<D> {
    fn new(device: D, attempt: AttemptId) -> Self {
        Self {
            device,
            attempt,
            released: false,
        }
    }

    pub(crate) fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Tear the device down, reporting the driver's result.
    pub(crate) fn release(mut self) -> payterm_device::Result<()> {
        self.released = true;
        self.device.tear_down()
    }

    /// Tear down; failures are logged and otherwise ignored.
    fn release_logged(self, reason: &str) {
        let attempt = self.attempt;
        match self.release() {
            Ok(()) => debug!(%attempt, reason, "device released"),
            Err(e) => warn!(%attempt, reason, error = %e, "device teardown failed"),
        }
    }
}

impl<D: TerminalDevice> Drop for ActiveDevice<D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.device.tear_down() {
            warn!(attempt = %self.attempt, error = %e, "device teardown on drop failed");
        }
    }
}

pub(crate) struct Inner<D: TerminalDevice> {
    pub(crate) generation: u64,
    pub(crate) device: Option<ActiveDevice<D>>,
    pub(crate) readiness: ReadinessState,
}

pub(crate) struct Shared<F: DeviceFactory> {
    pub(crate) factory: F,
    pub(crate) settings: TerminalSettings,
    pub(crate) dispatcher: Arc<StatusDispatcher>,
    inner: Mutex<Inner<F::Device>>,
}

enum Launch {
    Started(Arc<InitGate>),
    Superseded,
    Fault(Arc<InitGate>, String),
}

enum PairingLogin {
    Usable,
    Failed(String),
    Superseded,
}

impl<F: DeviceFactory> Shared<F> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner<F::Device>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm a gate for the next strategy, create a device and submit `config`.
    ///
    /// The slot lock is not held across driver calls. The gate is armed only
    /// while `generation` is current, and the new device is stored only if it
    /// still is once the driver returns.
    fn launch(&self, generation: u64, strategy: &Strategy) -> Launch {
        let (gate, previous) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return Launch::Superseded;
            }
            if inner.readiness.state() == TerminalState::FirstTimePairing
                && let Err(e) = inner.readiness.retry()
            {
                warn!(generation, error = %e, "could not re-enter initializing state");
            }
            (self.dispatcher.arm(), inner.device.take())
        };
        if let Some(previous) = previous {
            previous.release_logged("replaced by next strategy");
        }
        let attempt = gate.attempt();

        let mut device = match self.factory.create() {
            Ok(device) => device,
            Err(e) => {
                return Launch::Fault(gate, format!("Failed to create terminal device: {e}"));
            }
        };

        info!(
            generation,
            %attempt,
            strategy = strategy.name,
            address = strategy.config.device_address.as_deref().unwrap_or(""),
            pairing = strategy.config.is_pairing(),
            "submitting connection configuration"
        );
        let listener = self.dispatcher.listener(attempt);
        let submitted = device.initialize_from_values(listener, &strategy.config);
        let active = ActiveDevice::new(device, attempt);

        let mut inner = self.lock();
        if inner.generation != generation {
            drop(inner);
            self.dispatcher.disarm(attempt);
            active.release_logged("superseded during initialization request");
            return Launch::Superseded;
        }
        inner.device = Some(active);
        drop(inner);

        match submitted {
            Ok(()) => Launch::Started(gate),
            Err(e) => Launch::Fault(gate, format!("Initialization request rejected: {e}")),
        }
    }

    /// Login attempt after a pairing-required status.
    ///
    /// The device leaves the slot for the duration of the driver call.
    fn pairing_login(&self, generation: u64) -> PairingLogin {
        let mut active = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return PairingLogin::Superseded;
            }
            if let Err(e) = inner.readiness.enter_pairing() {
                warn!(generation, error = %e, "could not enter pairing state");
            }
            match inner.device.take() {
                Some(active) => active,
                None => {
                    return PairingLogin::Failed(
                        "No terminal device available for pairing login".into(),
                    );
                }
            }
        };

        let credentials = LoginCredentials::username(self.settings.login_username.clone());
        let threshold = self.settings.login_failure_threshold;
        info!(generation, username = %credentials.username, "pairing required, attempting login");

        let outcome = match active.device_mut().login_with_credentials(&credentials) {
            Ok(status) if status.is_success() => {
                info!(generation, "login after pairing-required status succeeded");
                PairingLogin::Usable
            }
            Ok(status) if status.code > threshold => {
                warn!(
                    generation,
                    code = status.code,
                    message = %status.message,
                    threshold,
                    "login after pairing-required status failed non-catastrophically, treating terminal as usable"
                );
                PairingLogin::Usable
            }
            Ok(status) => PairingLogin::Failed(format!(
                "Login failed after pairing-required status: {}",
                status.message
            )),
            Err(e) => PairingLogin::Failed(format!(
                "Exception during login after pairing-required status: {e}"
            )),
        };

        let mut inner = self.lock();
        if inner.generation != generation {
            drop(inner);
            active.release_logged("superseded during pairing login");
            return PairingLogin::Superseded;
        }
        inner.device = Some(active);
        outcome
    }

    fn record_error(&self, generation: u64, message: String) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.readiness.set_last_error(message);
        }
    }

    /// Commit the final outcome if `generation` is still current.
    fn finalize(&self, generation: u64, ready: bool) -> TerminalState {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, current = inner.generation, "superseded attempt finished");
            return inner.readiness.state();
        }

        let committed = if ready {
            inner.readiness.mark_ready()
        } else {
            inner.readiness.mark_failed(FAILED_WITHOUT_REASON)
        };
        match committed {
            Ok(_) if ready => info!(generation, "terminal ready"),
            Ok(_) => error!(generation, last_error = inner.readiness.last_error(), "terminal initialization failed"),
            Err(e) => error!(generation, error = %e, "could not record initialization outcome"),
        }
        inner.readiness.state()
    }

    fn respond_to_host_authorization(&self, request: &HostAuthorizationRequest) {
        let mut inner = self.lock();
        let Some(active) = inner.device.as_mut() else {
            warn!(attempt = %request.attempt, "host authorization request with no device");
            return;
        };
        if active.attempt != request.attempt {
            warn!(
                attempt = %request.attempt,
                current = %active.attempt,
                "host authorization request from stale device"
            );
            return;
        }

        let response = HostAuthorizationResponse {
            authorization_code: HOST_AUTHORIZATION_CODE.to_string(),
            decision: HostDecision::Authorized,
            emv_data: BTreeMap::from([(
                EMV_TAG_AUTH_RESPONSE_CODE.to_string(),
                EMV_APPROVED_RESPONSE.to_string(),
            )]),
            amount: request.amount,
        };
        match active.device_mut().respond_to_host_authorization(&response) {
            Ok(status) if status.is_success() => {
                info!(amount = %request.amount, "host authorization approved");
            }
            Ok(status) => warn!(%status, "terminal rejected host authorization response"),
            Err(e) => error!(error = %e, "host authorization response failed"),
        }
    }
}

/// Finalizes the attempt as failed if the worker exits without finishing.
struct FinalizeGuard<F: DeviceFactory> {
    shared: Arc<Shared<F>>,
    generation: u64,
    finished: bool,
}

impl<F: DeviceFactory> FinalizeGuard<F> {
    fn finish(mut self, ready: bool) -> TerminalState {
        self.finished = true;
        self.shared.finalize(self.generation, ready)
    }
}

impl<F: DeviceFactory> Drop for FinalizeGuard<F> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        error!(generation = self.generation, "initialization worker exited unexpectedly");
        self.shared
            .record_error(self.generation, "Initialization worker exited unexpectedly".into());
        self.shared.finalize(self.generation, false);
    }
}

async fn run_initialization<F: DeviceFactory>(
    shared: Arc<Shared<F>>,
    generation: u64,
    mode: InitMode,
) -> TerminalState {
    let guard = FinalizeGuard {
        shared: Arc::clone(&shared),
        generation,
        finished: false,
    };
    let strategies = mode.strategies(&shared.settings);
    let total = strategies.len();

    for (index, strategy) in strategies.iter().enumerate() {
        let gate = match shared.launch(generation, strategy) {
            Launch::Started(gate) => gate,
            Launch::Superseded => {
                debug!(generation, strategy = strategy.name, "attempt superseded");
                return guard.finish(false);
            }
            Launch::Fault(gate, message) => {
                error!(generation, attempt = %gate.attempt(), strategy = strategy.name, %message, "strategy failed to start");
                gate.resolve(NormalizedStatus::fault(message));
                gate
            }
        };
        let attempt = gate.attempt();

        let waited = gate.wait(strategy.timeout).await;
        if waited == WaitResult::TimedOut {
            gate.resolve(NormalizedStatus::fault("timed out"));
        }
        shared.dispatcher.disarm(attempt);

        match waited {
            WaitResult::Resolved(status) => match status.outcome {
                InitOutcome::Success => return guard.finish(true),
                InitOutcome::FirstTimeSetup => match shared.pairing_login(generation) {
                    PairingLogin::Usable => return guard.finish(true),
                    PairingLogin::Failed(message) => {
                        error!(generation, %message, "pairing login failed");
                        shared.record_error(generation, message);
                    }
                    PairingLogin::Superseded => return guard.finish(false),
                },
                InitOutcome::Error => shared.record_error(generation, status.message),
            },
            WaitResult::TimedOut => {
                let timeout_ms = strategy.timeout.as_millis();
                warn!(generation, %attempt, strategy = strategy.name, timeout_ms, "initialization timed out");
                shared.record_error(
                    generation,
                    format!(
                        "Initialization timed out after {timeout_ms}ms ({} configuration)",
                        strategy.name
                    ),
                );
            }
        }

        if index + 1 < total {
            info!(generation, strategy = strategy.name, "strategy did not make the terminal ready, falling back");
        }
    }

    guard.finish(false)
}

/// Handle to an initialization running in the background.
///
/// Dropping it leaves the attempt running (fire-and-poll); [`wait`](Self::wait)
/// returns the final state once the attempt has finished.
#[derive(Debug)]
pub struct InitializationHandle {
    generation: u64,
    task: JoinHandle<TerminalState>,
}

impl InitializationHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the attempt to finish.
    ///
    /// Bounded by the strategy timeouts. A superseded attempt reports the
    /// state current at the time it exits.
    pub async fn wait(self) -> TerminalState {
        match self.task.await {
            Ok(state) => state,
            Err(e) => {
                error!(generation = self.generation, error = %e, "initialization task failed");
                TerminalState::Failed
            }
        }
    }
}

/// Owns the terminal device and drives its connection lifecycle.
///
/// Must be created inside a Tokio runtime: construction spawns the host
/// authorization responder.
///
/// # Examples
///
/// ```
/// use payterm_core::TerminalSettings;
/// use payterm_device::mock::MockTerminalFactory;
/// use payterm_terminal::{TerminalManager, TerminalState};
///
/// #[tokio::main]
/// async fn main() {
///     let (factory, _handle) = MockTerminalFactory::new();
///     let manager = TerminalManager::new(factory, TerminalSettings::default());
///
///     let state = manager.initialize_terminal().wait().await;
///     assert_eq!(state, TerminalState::Ready);
///     assert!(manager.is_ready());
/// }
/// ```
pub struct TerminalManager<F: DeviceFactory> {
    pub(crate) shared: Arc<Shared<F>>,
    responder: JoinHandle<()>,
}

impl<F: DeviceFactory> TerminalManager<F> {
    pub fn new(factory: F, settings: TerminalSettings) -> Self {
        if settings.device_address.trim().is_empty() {
            warn!("no terminal address configured");
        }

        let (dispatcher, host_requests) = StatusDispatcher::new();
        let shared = Arc::new(Shared {
            factory,
            settings,
            dispatcher: Arc::new(dispatcher),
            inner: Mutex::new(Inner {
                generation: 0,
                device: None,
                readiness: ReadinessState::new(),
            }),
        });
        let responder = tokio::spawn(respond_to_host_authorizations(
            Arc::downgrade(&shared),
            host_requests,
        ));

        Self { shared, responder }
    }

    pub fn settings(&self) -> &TerminalSettings {
        &self.shared.settings
    }

    /// Start the primary initialization (full config, then minimal fallback).
    ///
    /// Supersedes any attempt in flight.
    pub fn initialize_terminal(&self) -> InitializationHandle {
        self.start(InitMode::Primary)
    }

    /// Start server-mode initialization: the terminal connects to us.
    pub fn initialize_terminal_server_mode(&self) -> InitializationHandle {
        self.start(InitMode::ServerMode)
    }

    fn start(&self, mode: InitMode) -> InitializationHandle {
        let (generation, previous) = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            if let Err(e) = inner.readiness.begin() {
                warn!(error = %e, "could not enter initializing state");
            }
            (inner.generation, inner.device.take())
        };
        if let Some(previous) = previous {
            previous.release_logged("superseded by new initialization");
        }

        info!(generation, ?mode, "starting terminal initialization");
        let task = tokio::spawn(run_initialization(Arc::clone(&self.shared), generation, mode));
        InitializationHandle { generation, task }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.lock().readiness.is_initialized()
    }

    pub fn state(&self) -> TerminalState {
        self.shared.lock().readiness.state()
    }

    /// Reason of the last failure; empty if none.
    pub fn last_error(&self) -> String {
        self.shared.lock().readiness.last_error().to_string()
    }

    pub fn last_status_code(&self) -> i32 {
        self.shared.dispatcher.counters().last_status_code
    }

    pub fn last_status_message(&self) -> String {
        self.shared.dispatcher.counters().last_status_message
    }

    pub fn error_count(&self) -> u64 {
        self.shared.dispatcher.counters().error_count
    }

    pub fn reset_counters(&self) {
        self.shared.dispatcher.reset_counters();
    }

    /// Recent state transitions, oldest first.
    pub fn transitions(&self) -> Vec<StateTransition> {
        self.shared.lock().readiness.history().iter().cloned().collect()
    }

    pub fn subscribe_payments(&self) -> broadcast::Receiver<PaymentStatusEvent> {
        self.shared.dispatcher.subscribe_payments()
    }

    pub fn status(&self) -> TerminalStatusReport {
        let counters = self.shared.dispatcher.counters();
        let inner = self.shared.lock();
        TerminalStatusReport {
            initialized: inner.readiness.is_initialized(),
            state: inner.readiness.state(),
            ip_address: self.shared.settings.device_address.clone(),
            connection_type: self.shared.settings.connection_type,
            last_error: inner.readiness.last_error().to_string(),
            last_status_code: counters.last_status_code,
            last_status_message: counters.last_status_message,
            error_count: counters.error_count,
        }
    }
}

impl<F: DeviceFactory> Drop for TerminalManager<F> {
    fn drop(&mut self) {
        self.responder.abort();
        let device = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.device.take()
        };
        if let Some(device) = device {
            device.release_logged("terminal manager dropped");
        }
    }
}

async fn respond_to_host_authorizations<F: DeviceFactory>(
    shared: Weak<Shared<F>>,
    mut requests: mpsc::UnboundedReceiver<HostAuthorizationRequest>,
) {
    while let Some(request) = requests.recv().await {
        let Some(manager) = shared.upgrade() else {
            break;
        };
        manager.respond_to_host_authorization(&request);
    }
    debug!("host authorization responder stopped");
}
