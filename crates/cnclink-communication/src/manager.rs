//! Connection lifecycle
//!
//! [`ConnectionManager`] owns at most one session: a transport, the read loop
//! draining it, and the timer polling for status. The session is created on a
//! successful open and torn down as a unit, either by [`disconnect`] or when
//! the transport's stream ends.
//!
//! Teardown order is fixed: poll timer, then read loop, then transport close,
//! then the machine snapshot is cleared.
//!
//! [`disconnect`]: ConnectionManager::disconnect

use crate::dispatcher::{Command, CommandDispatcher, LogSink};
use crate::firmware::grbl::{GrblResponse, StatusParser};
use crate::framing::LineBuffer;
use crate::state::MachineStateStore;
use crate::transport::{
    shared, DefaultTransportFactory, IncomingStream, TransportEvent, TransportFactory,
};
use cnclink_core::{
    thread_safe_rw, CommunicatorState, ConnectionConfig, ControllerError, EventDispatcher,
    EventLog, LinkEvent, LogEntry, MachineState, Result, ThreadSafeRw, DEFAULT_LOG_CAPACITY,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default status poll period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default pause between commands of a sequence
pub const DEFAULT_SEQUENCE_GAP: Duration = Duration::from_millis(100);

/// Runtime settings for a [`ConnectionManager`]
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Period of the `?` status poll
    pub poll_interval: Duration,
    /// Entries kept in the event log
    pub log_capacity: usize,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_capacity: DEFAULT_LOG_CAPACITY,
            event_buffer: 256,
        }
    }
}

/// Everything that lives exactly as long as one connection
struct ConnectionSession {
    id: u64,
    config: ConnectionConfig,
    dispatcher: CommandDispatcher,
    poll_task: JoinHandle<()>,
    read_task: JoinHandle<()>,
}

struct ManagerShared {
    state: ThreadSafeRw<CommunicatorState>,
    machine: MachineStateStore,
    sink: LogSink,
    events: EventDispatcher,
    session: Mutex<Option<ConnectionSession>>,
    next_session: AtomicU64,
}

impl ManagerShared {
    fn set_state(&self, next: CommunicatorState) {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, next)
        };
        if previous != next {
            debug_assert!(previous.can_transition_to(next));
            tracing::info!("Connection state: {} -> {}", previous, next);
            self.events.publish(LinkEvent::StateChanged(next));
        }
    }

    /// Route one complete incoming line
    fn handle_line(&self, line: &str) {
        if let Some(delta) = StatusParser::parse(line) {
            if !delta.is_empty() {
                let snapshot = self.machine.apply_delta(&delta);
                self.events.publish(LinkEvent::MachineStateChanged(snapshot));
            }
            return;
        }

        tracing::debug!("<< {}", line);
        self.sink.record(LogEntry::received(line));
        match GrblResponse::classify(line) {
            GrblResponse::Alarm(code) => {
                let description = crate::firmware::grbl::alarm_description(code);
                tracing::warn!("Controller alarm {}: {}", code, description);
                self.events.publish(LinkEvent::ControllerAlarm {
                    code,
                    description: description.to_string(),
                });
            }
            GrblResponse::Error(code) => {
                let description = crate::firmware::grbl::error_description(code);
                tracing::warn!("Controller error {}: {}", code, description);
                self.events.publish(LinkEvent::ControllerError {
                    code,
                    description: description.to_string(),
                });
            }
            GrblResponse::Welcome(version) => {
                tracing::info!("Controller reports Grbl {}", version);
            }
            _ => {}
        }
    }

    /// Implicit disconnect after the stream of session `id` ended
    ///
    /// Runs on the read task itself, so that task is not aborted.
    async fn handle_stream_end(&self, id: u64, reason: String) {
        // Held through teardown so a concurrent `disconnect` waits for it.
        let mut slot = self.session.lock().await;
        if !slot.as_ref().is_some_and(|session| session.id == id) {
            return;
        }
        let Some(session) = slot.take() else {
            return;
        };

        tracing::error!("Connection lost: {}", reason);
        self.sink
            .record(LogEntry::error(format!("Connection lost: {}", reason)));
        let ConnectionSession {
            dispatcher,
            poll_task,
            read_task,
            ..
        } = session;
        stop_task(poll_task).await;
        drop(read_task);
        self.finish_teardown(&dispatcher).await;
        drop(slot);
    }

    async fn finish_teardown(&self, dispatcher: &CommandDispatcher) {
        if let Err(e) = dispatcher.close().await {
            tracing::warn!("Error closing transport: {}", e);
        }
        self.machine.reset();
        self.set_state(CommunicatorState::Disconnected);
    }
}

/// Returns a cancelled or failed connect to `Disconnected`
struct ConnectingGuard<'a> {
    shared: &'a ManagerShared,
    armed: bool,
}

impl ConnectingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.set_state(CommunicatorState::Disconnected);
        }
    }
}

async fn stop_task(task: JoinHandle<()>) {
    task.abort();
    let _ = task.await;
}

async fn read_loop(shared: Arc<ManagerShared>, id: u64, mut incoming: IncomingStream) {
    let mut lines = LineBuffer::new();
    let reason = loop {
        match incoming.recv().await {
            Some(TransportEvent::Data(chunk)) => {
                for line in lines.push(&chunk) {
                    shared.handle_line(&line);
                }
            }
            Some(TransportEvent::Closed { reason }) => break reason,
            None => break "transport stream ended".to_string(),
        }
    };
    if let Some(line) = lines.flush() {
        shared.handle_line(&line);
    }
    shared.handle_stream_end(id, reason).await;
}

async fn poll_loop(dispatcher: CommandDispatcher, period: Duration) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        // Failures are already traced by the dispatcher; the poll keeps going.
        let _ = dispatcher.send(&Command::StatusQuery).await;
    }
}

/// Owns the link to one controller
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct ConnectionManager {
    shared: Arc<ManagerShared>,
    factory: Arc<dyn TransportFactory>,
    config: ManagerConfig,
}

impl ConnectionManager {
    /// Create a manager that builds transports with `factory`
    pub fn new(factory: Arc<dyn TransportFactory>, config: ManagerConfig) -> Self {
        let events = EventDispatcher::new(config.event_buffer);
        let log = Arc::new(EventLog::with_capacity(config.log_capacity));
        Self {
            shared: Arc::new(ManagerShared {
                state: thread_safe_rw(CommunicatorState::Disconnected),
                machine: MachineStateStore::new(),
                sink: LogSink::new(log, events.clone()),
                events,
                session: Mutex::new(None),
                next_session: AtomicU64::new(1),
            }),
            factory,
            config,
        }
    }

    /// Create a manager using the hardware transports
    pub fn with_config(config: ManagerConfig) -> Self {
        Self::new(Arc::new(DefaultTransportFactory), config)
    }

    /// Open a session over the transport `config` selects
    ///
    /// Rejected with [`ControllerError::AlreadyConnected`] while another
    /// session is connecting or live. If the transport fails to open, the
    /// error is returned and the manager is back in `Disconnected` with
    /// nothing else changed.
    pub async fn connect(&self, config: ConnectionConfig) -> Result<()> {
        config.validate()?;
        {
            let mut state = self.shared.state.write();
            if state.is_active() {
                return Err(ControllerError::AlreadyConnected.into());
            }
            *state = CommunicatorState::Connecting;
        }
        tracing::info!("Connection state: Disconnected -> Connecting ({})", config);
        self.shared
            .events
            .publish(LinkEvent::StateChanged(CommunicatorState::Connecting));

        // Dropping this future before the session is stored lands here too.
        let guard = ConnectingGuard {
            shared: &self.shared,
            armed: true,
        };

        let mut transport = self.factory.create(config.kind());
        let incoming = match transport.open(&config).await {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::error!("Failed to open {}: {}", config, e);
                return Err(e);
            }
        };

        // Held until the session is stored so a stream that ends at once
        // still finds its session to tear down.
        let mut slot = self.shared.session.lock().await;
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        self.shared.machine.reset();

        let dispatcher = CommandDispatcher::new(shared(transport), self.shared.sink.clone());
        let read_task = tokio::spawn(read_loop(self.shared.clone(), id, incoming));
        let poll_task = tokio::spawn(poll_loop(dispatcher.clone(), self.config.poll_interval));
        *slot = Some(ConnectionSession {
            id,
            config,
            dispatcher,
            poll_task,
            read_task,
        });
        guard.disarm();
        self.shared.set_state(CommunicatorState::Connected);
        Ok(())
    }

    /// Tear down the live session
    ///
    /// A no-op when nothing is connected. If the session is already being
    /// torn down after its stream ended, waits for that to finish, so the
    /// state is `Disconnected` once this returns.
    pub async fn disconnect(&self) -> Result<()> {
        let mut slot = self.shared.session.lock().await;
        let Some(session) = slot.take() else {
            return Ok(());
        };
        tracing::info!("Disconnecting from {}", session.config);
        stop_task(session.poll_task).await;
        stop_task(session.read_task).await;
        self.shared.finish_teardown(&session.dispatcher).await;
        Ok(())
    }

    /// Send a soft reset to the controller
    ///
    /// The connection state does not change; the controller's reboot shows
    /// up only in the lines that follow.
    pub async fn reset(&self) -> Result<()> {
        self.dispatcher().await?.send(&Command::SoftReset).await
    }

    /// Send one command
    ///
    /// `"?"` goes out as a realtime status query and is not logged; anything
    /// else is a line command. Fails with [`ControllerError::NotConnected`]
    /// when no session is live.
    pub async fn send_command(&self, text: &str) -> Result<()> {
        self.dispatcher().await?.send(&Command::parse(text)).await
    }

    /// Send commands in order with `gap` between them
    ///
    /// Stops at the first command that fails and returns its error.
    pub async fn send_sequence<I, S>(&self, commands: I, gap: Duration) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (i, command) in commands.into_iter().enumerate() {
            if i > 0 && !gap.is_zero() {
                tokio::time::sleep(gap).await;
            }
            self.send_command(command.as_ref()).await?;
        }
        Ok(())
    }

    async fn dispatcher(&self) -> Result<CommandDispatcher> {
        self.shared
            .session
            .lock()
            .await
            .as_ref()
            .map(|session| session.dispatcher.clone())
            .ok_or_else(|| ControllerError::NotConnected.into())
    }

    /// Current lifecycle state
    pub fn state(&self) -> CommunicatorState {
        *self.shared.state.read()
    }

    /// Whether a session is live
    pub fn is_connected(&self) -> bool {
        self.state() == CommunicatorState::Connected
    }

    /// Copy of the current machine snapshot
    pub fn machine_state(&self) -> MachineState {
        self.shared.machine.current()
    }

    /// The machine state store
    pub fn machine(&self) -> &MachineStateStore {
        &self.shared.machine
    }

    /// The event log; it outlives sessions
    pub fn event_log(&self) -> Arc<EventLog> {
        self.shared.sink.log().clone()
    }

    /// Receive link events
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.shared.events.subscribe()
    }

    /// Config of the live session, if any
    pub async fn active_config(&self) -> Option<ConnectionConfig> {
        self.shared
            .session
            .lock()
            .await
            .as_ref()
            .map(|session| session.config.clone())
    }

    /// Settings this manager was built with
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.shared.session.try_lock() {
            if let Some(session) = slot.take() {
                session.poll_task.abort();
                session.read_task.abort();
            }
        }
    }
}
