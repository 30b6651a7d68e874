//! Mock payment terminal driver.
//!
//! Simulates the vendor driver closely enough to exercise the connection
//! state machine: initialization results are delivered asynchronously from a
//! separate thread, and every call is recorded for inspection.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{DeviceError, Result};
use crate::events::DeviceEvent;
use crate::traits::{DeviceFactory, DeviceListener, TerminalDevice};
use crate::types::{
    ConnectionConfig, DeviceStatus, HostAuthorizationResponse, LoginCredentials,
    PaymentInstruction, SessionTransaction,
};

/// Scripted reaction to one `initialize_from_values` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitResponse {
    /// Deliver a single status event after the callback delay.
    Status { code: i32, message: String },

    /// Deliver these events, in order, after the callback delay.
    Events(Vec<DeviceEvent>),

    /// Accept the request and never call back.
    Silent,

    /// Refuse the request synchronously.
    Fail(String),
}

impl InitResponse {
    pub fn status(code: i32, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Successful initialization.
    pub fn ready() -> Self {
        Self::status(0, "Initialization complete")
    }
}

#[derive(Debug)]
struct MockState {
    // Scripts
    init_script: VecDeque<InitResponse>,
    default_init: InitResponse,
    login_script: VecDeque<DeviceStatus>,
    default_login: DeviceStatus,
    payment_status: DeviceStatus,
    host_authorization_status: DeviceStatus,
    session_start_result: bool,
    session_end_result: bool,
    fail_create: bool,
    fail_teardown: bool,
    callback_delay: Duration,
    login_delay: Duration,

    // Records
    created: usize,
    torn_down: usize,
    configs: Vec<ConnectionConfig>,
    logins: Vec<LoginCredentials>,
    sessions: Vec<SessionTransaction>,
    sessions_ended: usize,
    payments: Vec<PaymentInstruction>,
    host_responses: Vec<HostAuthorizationResponse>,
    listener: Option<Arc<dyn DeviceListener>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            init_script: VecDeque::new(),
            default_init: InitResponse::ready(),
            login_script: VecDeque::new(),
            default_login: DeviceStatus::success("Login successful"),
            payment_status: DeviceStatus::success("Payment started"),
            host_authorization_status: DeviceStatus::success("Host response accepted"),
            session_start_result: true,
            session_end_result: true,
            fail_create: false,
            fail_teardown: false,
            callback_delay: Duration::from_millis(5),
            login_delay: Duration::ZERO,
            created: 0,
            torn_down: 0,
            configs: Vec::new(),
            logins: Vec::new(),
            sessions: Vec::new(),
            sessions_ended: 0,
            payments: Vec::new(),
            host_responses: Vec::new(),
            listener: None,
        }
    }
}

type SharedState = Arc<Mutex<MockState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Factory producing [`MockTerminal`] instances that share one script.
///
/// # Examples
///
/// ```
/// use payterm_device::mock::{InitResponse, MockTerminalFactory};
///
/// let (factory, handle) = MockTerminalFactory::new();
///
/// // First-time pairing reported on the first initialization
/// handle.queue_init(InitResponse::status(-30, "Device configuration required"));
/// assert_eq!(handle.created_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockTerminalFactory {
    state: SharedState,
}

impl MockTerminalFactory {
    /// Create a factory and the handle used to script and inspect it.
    pub fn new() -> (Self, MockTerminalHandle) {
        let state: SharedState = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockTerminalHandle { state },
        )
    }
}

impl DeviceFactory for MockTerminalFactory {
    type Device = MockTerminal;

    fn create(&self) -> Result<MockTerminal> {
        let mut state = lock(&self.state);
        if state.fail_create {
            return Err(DeviceError::creation_failed("mock driver refused to start"));
        }
        state.created += 1;
        let id = state.created;
        debug!(id, "mock terminal created");

        Ok(MockTerminal {
            id,
            state: Arc::clone(&self.state),
            listener: None,
            torn_down: false,
        })
    }
}

/// Simulated driver instance.
#[derive(Debug)]
pub struct MockTerminal {
    id: usize,
    state: SharedState,
    listener: Option<Arc<dyn DeviceListener>>,
    torn_down: bool,
}

impl MockTerminal {
    /// Sequence number of this instance (1 for the first created).
    pub fn id(&self) -> usize {
        self.id
    }

    fn ensure_live(&self) -> Result<()> {
        if self.torn_down {
            return Err(DeviceError::disconnected(format!("Mock Terminal #{}", self.id)));
        }
        Ok(())
    }
}

impl TerminalDevice for MockTerminal {
    fn initialize_from_values(
        &mut self,
        listener: Arc<dyn DeviceListener>,
        config: &ConnectionConfig,
    ) -> Result<()> {
        self.ensure_live()?;

        let (response, delay) = {
            let mut state = lock(&self.state);
            state.configs.push(config.clone());
            state.listener = Some(Arc::clone(&listener));
            let response = state
                .init_script
                .pop_front()
                .unwrap_or_else(|| state.default_init.clone());
            (response, state.callback_delay)
        };
        self.listener = Some(Arc::clone(&listener));

        let events = match response {
            InitResponse::Status { code, message } => vec![DeviceEvent::status(code, message)],
            InitResponse::Events(events) => events,
            InitResponse::Silent => {
                trace!(id = self.id, "mock terminal stays silent");
                return Ok(());
            }
            InitResponse::Fail(message) => {
                return Err(DeviceError::initialization_failed(message));
            }
        };

        // Callbacks come from the driver's own thread, never the caller's.
        thread::spawn(move || {
            thread::sleep(delay);
            for event in events {
                listener.on_event(event);
            }
        });
        Ok(())
    }

    fn login_with_credentials(&mut self, credentials: &LoginCredentials) -> Result<DeviceStatus> {
        self.ensure_live()?;
        let delay = lock(&self.state).login_delay;
        if !delay.is_zero() {
            // Blocks the caller like the vendor's synchronous login.
            thread::sleep(delay);
        }
        let mut state = lock(&self.state);
        state.logins.push(credentials.clone());
        let status = state
            .login_script
            .pop_front()
            .unwrap_or_else(|| state.default_login.clone());
        Ok(status)
    }

    fn start_session(&mut self, transaction: &SessionTransaction) -> Result<bool> {
        self.ensure_live()?;
        let mut state = lock(&self.state);
        state.sessions.push(transaction.clone());
        Ok(state.session_start_result)
    }

    fn start_payment(&mut self, payment: &PaymentInstruction) -> Result<DeviceStatus> {
        self.ensure_live()?;
        let mut state = lock(&self.state);
        state.payments.push(payment.clone());
        Ok(state.payment_status.clone())
    }

    fn end_session(&mut self) -> Result<bool> {
        self.ensure_live()?;
        let mut state = lock(&self.state);
        state.sessions_ended += 1;
        Ok(state.session_end_result)
    }

    fn respond_to_host_authorization(
        &mut self,
        response: &HostAuthorizationResponse,
    ) -> Result<DeviceStatus> {
        self.ensure_live()?;
        let mut state = lock(&self.state);
        state.host_responses.push(response.clone());
        Ok(state.host_authorization_status.clone())
    }

    fn tear_down(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let mut state = lock(&self.state);
        state.torn_down += 1;
        let owns_listener = match (&state.listener, &self.listener) {
            (Some(current), Some(mine)) => Arc::ptr_eq(current, mine),
            _ => false,
        };
        if owns_listener {
            state.listener = None;
        }
        self.listener = None;
        debug!(id = self.id, "mock terminal torn down");

        if state.fail_teardown {
            return Err(DeviceError::communication("mock teardown failure"));
        }
        Ok(())
    }
}

/// Handle for scripting and inspecting mock terminals.
///
/// Every device created by the paired factory shares the same script and
/// call records.
#[derive(Debug, Clone)]
pub struct MockTerminalHandle {
    state: SharedState,
}

impl MockTerminalHandle {
    /// Queue the reaction to the next `initialize_from_values` call.
    pub fn queue_init(&self, response: InitResponse) {
        lock(&self.state).init_script.push_back(response);
    }

    /// Reaction used once the init script is exhausted.
    pub fn set_default_init(&self, response: InitResponse) {
        lock(&self.state).default_init = response;
    }

    /// Queue the status returned by the next login.
    pub fn queue_login(&self, status: DeviceStatus) {
        lock(&self.state).login_script.push_back(status);
    }

    /// Status returned by logins once the login script is exhausted.
    pub fn set_default_login(&self, status: DeviceStatus) {
        lock(&self.state).default_login = status;
    }

    pub fn set_payment_status(&self, status: DeviceStatus) {
        lock(&self.state).payment_status = status;
    }

    pub fn set_session_results(&self, start: bool, end: bool) {
        let mut state = lock(&self.state);
        state.session_start_result = start;
        state.session_end_result = end;
    }

    pub fn set_fail_create(&self, fail: bool) {
        lock(&self.state).fail_create = fail;
    }

    pub fn set_fail_teardown(&self, fail: bool) {
        lock(&self.state).fail_teardown = fail;
    }

    /// Delay before scripted initialization events are delivered.
    pub fn set_callback_delay(&self, delay: Duration) {
        lock(&self.state).callback_delay = delay;
    }

    /// Time each login blocks its caller before answering.
    pub fn set_login_delay(&self, delay: Duration) {
        lock(&self.state).login_delay = delay;
    }

    /// Deliver an event to the listener of the most recently initialized live
    /// device, on the calling thread.
    ///
    /// Returns `false` if no live device has a listener.
    pub fn emit(&self, event: DeviceEvent) -> bool {
        let listener = lock(&self.state).listener.clone();
        match listener {
            Some(listener) => {
                listener.on_event(event);
                true
            }
            None => false,
        }
    }

    pub fn created_count(&self) -> usize {
        lock(&self.state).created
    }

    pub fn teardown_count(&self) -> usize {
        lock(&self.state).torn_down
    }

    /// Devices created and not yet torn down.
    pub fn live_count(&self) -> usize {
        let state = lock(&self.state);
        state.created - state.torn_down
    }

    /// Configurations received, in call order.
    pub fn init_configs(&self) -> Vec<ConnectionConfig> {
        lock(&self.state).configs.clone()
    }

    pub fn logins(&self) -> Vec<LoginCredentials> {
        lock(&self.state).logins.clone()
    }

    pub fn sessions(&self) -> Vec<SessionTransaction> {
        lock(&self.state).sessions.clone()
    }

    pub fn sessions_ended(&self) -> usize {
        lock(&self.state).sessions_ended
    }

    pub fn payments(&self) -> Vec<PaymentInstruction> {
        lock(&self.state).payments.clone()
    }

    pub fn host_responses(&self) -> Vec<HostAuthorizationResponse> {
        lock(&self.state).host_responses.clone()
    }
}
