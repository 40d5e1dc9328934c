//! Lifecycle of the persistent event stream
//!
//! The supervisor owns the one connection a receiver allows. An explicit [`connect`] opens it and
//! spawns a read loop that feeds the line parser and dispatcher. The loop watches for EOF, read
//! errors and idle staleness; any of these moves the state to `Reconnecting`, clears the parser
//! and retries with capped exponential backoff. [`disconnect`] cancels the loop wherever it is,
//! including in a backoff wait, and leaves the supervisor `Closed`.
//!
//! [`connect`]: ConnectionSupervisor::connect
//! [`disconnect`]: ConnectionSupervisor::disconnect

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};

use crate::config::StreamConfig;
use crate::connector::{BoxedStream, Connector, TcpConnector};
use crate::dispatcher::EventDispatcher;
use crate::error::{Result, StreamError};
use crate::line_parser::LineParser;
use crate::types::{ConnectionEvent, ConnectionState};

/// Query sent as heartbeat; the receiver answers with its power state
pub const HEARTBEAT_COMMAND: &str = "PW?";

const READ_BUFFER_SIZE: usize = 1024;

struct Shared {
    config: StreamConfig,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<EventDispatcher>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ConnectionEvent>,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            tracing::debug!("Stream {}: {} -> {}", self.connector.describe(), previous, next);
            // No receivers is fine
            let _ = self.events_tx.send(ConnectionEvent::StateChanged(next));
        }
    }

    async fn open(&self) -> Result<BoxedStream> {
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, self.connector.connect()).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(StreamError::Transport(e)),
            Err(_) => Err(StreamError::ConnectTimeout {
                target: self.connector.describe(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

struct RunningLoop {
    shutdown_tx: mpsc::Sender<()>,
    command_tx: mpsc::Sender<String>,
    handle: JoinHandle<()>,
}

/// Owns the stream connection of one receiver.
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
    running: Mutex<Option<RunningLoop>>,
}

impl ConnectionSupervisor {
    /// Supervisor connecting over TCP to `config.host:config.port`
    pub fn new(config: StreamConfig, dispatcher: Arc<EventDispatcher>) -> Self {
        let connector = Arc::new(TcpConnector::new(&config.host, config.port));
        Self::with_connector(config, dispatcher, connector)
    }

    pub fn with_connector(
        config: StreamConfig,
        dispatcher: Arc<EventDispatcher>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(config.event_buffer_size.max(1));

        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                dispatcher,
                state_tx,
                events_tx,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.shared.dispatcher
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Open the connection and start the read loop.
    ///
    /// Valid from `Disconnected` or `Closed`. A failed or timed out handshake returns
    /// [`StreamError::ConnectionFailed`] and leaves the supervisor `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.take() {
            let live = matches!(
                self.state(),
                ConnectionState::Connected | ConnectionState::Reconnecting
            );
            if live && !current.handle.is_finished() {
                *running = Some(current);
                return Err(StreamError::AlreadyConnected);
            }
            // A loop that gave up is finishing on its own
            if let Err(e) = current.handle.await {
                tracing::warn!("Previous stream read loop ended abnormally: {}", e);
            }
        }

        self.shared.config.validate()?;
        self.shared.set_state(ConnectionState::Connecting);

        let stream = match self.shared.open().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Connect to {} failed: {}", self.shared.connector.describe(), e);
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(StreamError::ConnectionFailed {
                    target: self.shared.connector.describe(),
                    reason: e.to_string(),
                });
            }
        };

        tracing::info!("Connected to {}", self.shared.connector.describe());
        self.shared.set_state(ConnectionState::Connected);

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (command_tx, command_rx) = mpsc::channel(self.shared.config.event_buffer_size);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            stream,
            shutdown_rx,
            command_rx,
        ));

        *running = Some(RunningLoop {
            shutdown_tx,
            command_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the read loop or a pending reconnect and move to `Closed`
    pub async fn disconnect(&self) {
        let running = self.running.lock().await.take();
        if let Some(running) = running {
            // The loop may already have exited
            let _ = running.shutdown_tx.send(()).await;
            if let Err(e) = running.handle.await {
                tracing::warn!("Stream read loop ended abnormally: {}", e);
            }
        }
        self.shared.set_state(ConnectionState::Closed);
        tracing::info!("Disconnected from {}", self.shared.connector.describe());
    }

    /// Write `command` followed by CR on the live connection.
    ///
    /// The receiver's answer arrives as ordinary stream events.
    pub async fn send_command(&self, command: &str) -> Result<()> {
        if !self.state().is_connected() {
            return Err(StreamError::NotConnected);
        }

        let sender = {
            let running = self.running.lock().await;
            running.as_ref().map(|r| r.command_tx.clone())
        };
        let sender = sender.ok_or(StreamError::NotConnected)?;

        sender
            .send(command.trim_end_matches('\r').to_string())
            .await
            .map_err(|_| StreamError::NotConnected)
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("target", &self.shared.connector.describe())
            .field("state", &self.state())
            .finish()
    }
}

enum Action {
    Shutdown,
    Read(std::io::Result<usize>),
    Stale,
    Write(String),
}

enum Reconnect {
    Connected(BoxedStream),
    Shutdown,
    Exhausted { attempts: u32, reason: String },
}

async fn run_loop(
    shared: Arc<Shared>,
    mut stream: BoxedStream,
    mut shutdown_rx: mpsc::Receiver<()>,
    mut command_rx: mpsc::Receiver<String>,
) {
    let mut parser = LineParser::new(shared.config.max_line_length);

    loop {
        let session = read_session(
            &shared,
            &mut stream,
            &mut parser,
            &mut shutdown_rx,
            &mut command_rx,
        );
        let lost = match session.await {
            Some(reason) => reason,
            None => return,
        };

        tracing::warn!("Stream {} lost: {}", shared.connector.describe(), lost);
        parser.reset();
        shared.set_state(ConnectionState::Reconnecting);

        match reconnect(&shared, &mut shutdown_rx).await {
            Reconnect::Connected(next) => {
                while command_rx.try_recv().is_ok() {}
                stream = next;
                tracing::info!("Reconnected to {}", shared.connector.describe());
                shared.set_state(ConnectionState::Connected);
            }
            Reconnect::Shutdown => return,
            Reconnect::Exhausted { attempts, reason } => {
                tracing::warn!(
                    "Giving up on {} after {} reconnect attempts: {}",
                    shared.connector.describe(),
                    attempts,
                    reason
                );
                shared.set_state(ConnectionState::Disconnected);
                let _ = shared
                    .events_tx
                    .send(ConnectionEvent::ConnectionFailed { attempts, reason });
                return;
            }
        }
    }
}

/// Read and dispatch until the connection is lost (`Some(reason)`) or shutdown is requested
async fn read_session(
    shared: &Shared,
    stream: &mut BoxedStream,
    parser: &mut LineParser,
    shutdown_rx: &mut mpsc::Receiver<()>,
    command_rx: &mut mpsc::Receiver<String>,
) -> Option<StreamError> {
    let idle_timeout = shared.config.idle_timeout;
    let mut heartbeat = shared
        .config
        .heartbeat_interval
        .map(|period| tokio::time::interval_at(Instant::now() + period, period));
    let mut last_data = Instant::now();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        let action = tokio::select! {
            _ = shutdown_rx.recv() => Action::Shutdown,
            read = stream.read(&mut buf) => Action::Read(read),
            _ = tokio::time::sleep_until(last_data + idle_timeout) => Action::Stale,
            _ = next_tick(&mut heartbeat) => Action::Write(HEARTBEAT_COMMAND.to_string()),
            Some(command) = command_rx.recv() => Action::Write(command),
        };

        match action {
            Action::Shutdown => return None,
            Action::Stale => {
                return Some(StreamError::StaleConnection(idle_timeout.as_millis() as u64));
            }
            Action::Read(Ok(0)) => {
                return Some(StreamError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by receiver",
                )));
            }
            Action::Read(Ok(n)) => {
                last_data = Instant::now();
                for line in parser.feed(&buf[..n]) {
                    match line {
                        Ok(line) => {
                            shared.dispatcher.dispatch(&line);
                        }
                        Err(e) => tracing::warn!("Skipping malformed line: {}", e),
                    }
                }
            }
            Action::Read(Err(e)) => return Some(StreamError::Transport(e)),
            Action::Write(command) => {
                tracing::debug!("Sending {:?}", command);
                let line = format!("{}\r", command);
                if let Err(e) = stream.write_all(line.as_bytes()).await {
                    return Some(StreamError::Transport(e));
                }
                if let Err(e) = stream.flush().await {
                    return Some(StreamError::Transport(e));
                }
            }
        }
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn reconnect(shared: &Shared, shutdown_rx: &mut mpsc::Receiver<()>) -> Reconnect {
    let mut attempts: u32 = 0;
    let mut last_error = String::from("no attempt made");

    loop {
        if let Some(max) = shared.config.max_reconnect_attempts {
            if attempts >= max {
                return Reconnect::Exhausted {
                    attempts,
                    reason: last_error,
                };
            }
        }

        let delay = shared.config.backoff_delay(attempts);
        tracing::debug!(
            "Reconnecting to {} in {:?} (attempt {})",
            shared.connector.describe(),
            delay,
            attempts + 1
        );

        tokio::select! {
            _ = shutdown_rx.recv() => return Reconnect::Shutdown,
            _ = tokio::time::sleep(delay) => {}
        }

        attempts += 1;
        let result = tokio::select! {
            _ = shutdown_rx.recv() => return Reconnect::Shutdown,
            result = shared.open() => result,
        };

        match result {
            Ok(stream) => return Reconnect::Connected(stream),
            Err(e) => {
                tracing::warn!(
                    "Reconnect attempt {} to {} failed: {}",
                    attempts,
                    shared.connector.describe(),
                    e
                );
                last_error = e.to_string();
            }
        }
    }
}
