//! Shared doubles and the scenario world for the behavioural suites.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ortho_config::{OrthoConfig, OrthoError};
use rstest::fixture;
use serde_json::json;

use tickbridge_config::Config;

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::executor::{CapturedOutput, ExecutionFailure, Executor};
use crate::health::HealthReporter;
use crate::protocol::Response;
use crate::scheduler::{
    HeadlessDriver, HostTimers, InteractiveDriver, OperatingMode, TickOutcome, TimerCallback,
};
use crate::service::{Service, ServiceError};
use crate::transport::ConnectionId;

const RESPONSE_DEADLINE: Duration = Duration::from_secs(5);
const TICK_BUDGET: Duration = Duration::from_millis(5);

/// Configuration used by every scenario: an ephemeral port and short
/// timeouts.
pub fn test_config() -> Config {
    Config {
        port: 0,
        tick_interval_ms: 2,
        partial_frame_timeout_ms: 150,
        ..Config::default()
    }
}

/// Executor with a tiny scripted language.
///
/// - `a+b+...` with integer operands returns their sum as the result
/// - `print: text` writes `text` and a newline to captured output
/// - `raise: text` fails with `text`
/// - `restricted: text` fails with a host context restriction
/// - `panic` panics inside the executor
/// - anything else succeeds with no output
#[derive(Debug, Default, Clone)]
pub struct ScriptedExecutor {
    history: Rc<RefCell<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads executed so far, in execution order.
    pub fn history(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.history)
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&mut self, payload: &str) -> Result<CapturedOutput, ExecutionFailure> {
        self.history.borrow_mut().push(payload.to_owned());
        if let Some(text) = payload.strip_prefix("print: ") {
            return Ok(CapturedOutput::text(format!("{text}\n")));
        }
        if let Some(text) = payload.strip_prefix("raise: ") {
            return Err(ExecutionFailure::raised(text));
        }
        if let Some(text) = payload.strip_prefix("restricted: ") {
            return Err(ExecutionFailure::restricted(text));
        }
        if payload == "panic" {
            panic!("scripted executor panic");
        }
        let operands: Result<Vec<i64>, _> = payload
            .split('+')
            .map(|part| part.trim().parse())
            .collect();
        match operands {
            Ok(values) => Ok(CapturedOutput::value(json!(values.iter().sum::<i64>()))),
            Err(_) => Ok(CapturedOutput::default()),
        }
    }
}

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ServiceStarted(u16),
    ServiceStartFailed(String),
    ServiceStopped(u16),
    ConnectionOpened(ConnectionId),
    ConnectionClosed(ConnectionId),
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn service_started(&self, address: SocketAddr, _mode: OperatingMode) {
        self.record(HealthEvent::ServiceStarted(address.port()));
    }

    fn service_start_failed(&self, error: &ServiceError) {
        self.record(HealthEvent::ServiceStartFailed(error.to_string()));
    }

    fn service_stopped(&self, port: u16) {
        self.record(HealthEvent::ServiceStopped(port));
    }

    fn connection_opened(&self, id: ConnectionId, _peer: SocketAddr) {
        self.record(HealthEvent::ConnectionOpened(id));
    }

    fn connection_closed(&self, id: ConnectionId, _peer: SocketAddr) {
        self.record(HealthEvent::ConnectionClosed(id));
    }
}

/// Loader returning a fixed configuration.
pub struct TestConfigLoader {
    config: Config,
}

impl TestConfigLoader {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("tickbridged"),
            OsString::from("--port"),
            OsString::from("not-a-port"),
        ])
    }
}

/// Host timer facility fired by hand.
#[derive(Default)]
pub struct ManualTimers {
    callbacks: RefCell<Vec<TimerCallback>>,
}

impl ManualTimers {
    /// Invokes every registered callback once, dropping those that stop.
    pub fn fire_all(&self) -> Vec<TickOutcome> {
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        let mut outcomes = Vec::new();
        let mut retained = Vec::new();
        for mut callback in callbacks {
            let outcome = callback();
            if outcome != TickOutcome::Stop {
                retained.push(callback);
            }
            outcomes.push(outcome);
        }
        self.callbacks.borrow_mut().extend(retained);
        outcomes
    }

    pub fn registered(&self) -> usize {
        self.callbacks.borrow().len()
    }
}

impl HostTimers for ManualTimers {
    fn register(&self, _first_delay: Duration, callback: TimerCallback) {
        self.callbacks.borrow_mut().push(callback);
    }
}

/// Blocking-free TCP client that reads newline-terminated responses.
pub struct TestClient {
    stream: TcpStream,
    buffer: Vec<u8>,
    closed: bool,
}

impl TestClient {
    pub fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect client");
        stream.set_nodelay(true).expect("disable nagle");
        stream.set_nonblocking(true).expect("non-blocking client");
        Self {
            stream,
            buffer: Vec::new(),
            closed: false,
        }
    }

    pub fn send(&mut self, bytes: &[u8]) {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(count) => written += count,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(1));
                }
                Err(error) => panic!("client write failed: {error}"),
            }
        }
    }

    pub fn send_code(&mut self, code: &str) {
        let request = json!({"message": "test", "code": code}).to_string();
        self.send(request.as_bytes());
    }

    /// Reads whatever the socket has ready without blocking.
    pub fn fill(&mut self) {
        let mut chunk = [0_u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    return;
                }
                Ok(count) => self.buffer.extend_from_slice(&chunk[..count]),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => {
                    self.closed = true;
                    return;
                }
            }
        }
    }

    /// Removes one complete response from the buffer, if present.
    pub fn take_response(&mut self) -> Option<Response> {
        let end = self.buffer.iter().position(|byte| *byte == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(serde_json::from_slice(&line).expect("response is valid JSON"))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn has_buffered_bytes(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// How the scenario advances the scheduler.
pub enum Ticker {
    Headless,
    Interactive(Rc<ManualTimers>),
}

/// Scenario world shared across BDD steps.
pub struct ServiceWorld {
    pub service: Service,
    pub ticker: Ticker,
    pub reporter: Arc<RecordingHealthReporter>,
    pub history: Rc<RefCell<Vec<String>>>,
    pub clients: HashMap<String, TestClient>,
    pub last_response: Option<Response>,
    pub start_result: Option<Result<(), ServiceError>>,
    pub previous_port: Option<u16>,
    pub last_outcomes: Vec<TickOutcome>,
    pub blocker: Option<TcpListener>,
}

impl ServiceWorld {
    pub fn new() -> Self {
        Self::with_ticker(Ticker::Headless)
    }

    pub fn with_ticker(ticker: Ticker) -> Self {
        let config = test_config();
        let executor = ScriptedExecutor::new();
        let history = executor.history();
        let reporter = Arc::new(RecordingHealthReporter::default());
        let driver: Box<dyn crate::scheduler::TickDriver> = match &ticker {
            Ticker::Headless => Box::new(HeadlessDriver::new(config.tick_interval())),
            Ticker::Interactive(timers) => {
                let timers: Rc<dyn HostTimers> = Rc::clone(timers) as Rc<dyn HostTimers>;
                Box::new(InteractiveDriver::new(timers, config.tick_interval()))
            }
        };
        let service = Service::new(
            &config,
            driver,
            Box::new(executor),
            Arc::clone(&reporter) as Arc<dyn HealthReporter>,
        );
        Self {
            service,
            ticker,
            reporter,
            history,
            clients: HashMap::new(),
            last_response: None,
            start_result: None,
            previous_port: None,
            last_outcomes: Vec::new(),
            blocker: None,
        }
    }

    /// Starts the service, remembering the outcome.
    pub fn start(&mut self) {
        self.start_result = Some(self.service.start());
    }

    /// Advances the scheduler by one short slice.
    pub fn tick(&mut self) {
        match &self.ticker {
            Ticker::Headless => {
                self.service.pump(TICK_BUDGET);
            }
            Ticker::Interactive(timers) => {
                self.last_outcomes = timers.fire_all();
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    pub fn connect(&mut self, name: &str) {
        let port = self.service.status().port;
        self.clients
            .insert(name.to_owned(), TestClient::connect(port));
        // Let the listener accept before requests start flowing.
        self.tick();
    }

    pub fn client(&mut self, name: &str) -> &mut TestClient {
        self.clients
            .get_mut(name)
            .unwrap_or_else(|| panic!("client {name} is not connected"))
    }

    /// Ticks until `name` has a complete response.
    pub fn next_response(&mut self, name: &str) -> Response {
        let deadline = Instant::now() + RESPONSE_DEADLINE;
        loop {
            if let Some(response) = self.client(name).take_response() {
                self.last_response = Some(response.clone());
                return response;
            }
            assert!(
                Instant::now() < deadline,
                "client {name} received no response in time"
            );
            assert!(!self.client(name).is_closed(), "client {name} was disconnected");
            self.tick();
            self.client(name).fill();
        }
    }

    /// Ticks for `duration` and reports whether `name` received anything.
    pub fn stays_silent(&mut self, name: &str, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.tick();
            self.client(name).fill();
        }
        !self.client(name).has_buffered_bytes()
    }

    /// Ticks until the server closes `name`'s socket.
    pub fn wait_for_disconnect(&mut self, name: &str) -> bool {
        let deadline = Instant::now() + RESPONSE_DEADLINE;
        while Instant::now() < deadline {
            self.client(name).fill();
            if self.client(name).is_closed() {
                return true;
            }
            if self.service.is_running() {
                self.tick();
            } else {
                thread::sleep(Duration::from_millis(5));
            }
        }
        false
    }

    /// Reads from `name` after the service stopped, returning the first
    /// response that arrives before the socket closes.
    pub fn final_response(&mut self, name: &str) -> Option<Response> {
        let deadline = Instant::now() + RESPONSE_DEADLINE;
        while Instant::now() < deadline {
            self.client(name).fill();
            if let Some(response) = self.client(name).take_response() {
                return Some(response);
            }
            if self.client(name).is_closed() {
                return None;
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    /// Ticks until the registry reports `expected` open connections.
    pub fn wait_for_connections(&mut self, expected: usize) -> bool {
        let deadline = Instant::now() + RESPONSE_DEADLINE;
        while Instant::now() < deadline {
            if self.service.status().connection_count == expected {
                return true;
            }
            self.tick();
        }
        false
    }
}

impl Default for ServiceWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[fixture]
pub fn world() -> RefCell<ServiceWorld> {
    RefCell::new(ServiceWorld::new())
}
