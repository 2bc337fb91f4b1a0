use crate::config::TelemetryClientConfig;
use crate::connection::{Connection, ConnectionCommand, ConnectionState};
use crate::error::{Error, ErrorSink, LogSink};
use crate::frame::{MetricFrame, MetricKind};
use crate::hub::{DispatchHub, SubscriptionHandle};
use crate::metrics::Metrics;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Command channel buffer; only lifecycle commands flow through it
const COMMAND_CHANNEL_SIZE: usize = 4;

struct Session {
    command_tx: mpsc::Sender<ConnectionCommand>,
    task: JoinHandle<()>,
}

/// Public entry point composing the connection manager and dispatch hub.
///
/// Explicitly constructed and owned; there is no process-wide instance.
/// All methods are synchronous and non-blocking. `start` must be called
/// from within a tokio runtime; everything else can be called from anywhere.
///
/// # Example
///
/// ```ignore
/// use sse_telemetry_client::{MetricFrame, MetricKind, TelemetryClient, TelemetryClientConfig};
///
/// let config = TelemetryClientConfig::builder()
///     .url("http://127.0.0.1:8080/events")
///     .build()?;
/// let client = TelemetryClient::new(config);
/// client.subscribe(MetricKind::Memory, |frame| {
///     if let MetricFrame::Memory(m) = frame {
///         println!("used: {:.1}%", m.used_percent);
///     }
/// });
/// client.start()?;
/// ```
pub struct TelemetryClient {
    config: TelemetryClientConfig,
    hub: Arc<DispatchHub>,
    metrics: Arc<Metrics>,
    sink: Arc<dyn ErrorSink>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    /// Serializes start/stop so concurrent calls cannot race a second
    /// connection into existence
    session: Mutex<Option<Session>>,
}

impl TelemetryClient {
    /// Create a client with the default error sink (logs via `tracing`).
    pub fn new(config: TelemetryClientConfig) -> Self {
        Self::with_sink(config, Arc::new(LogSink))
    }

    /// Create a client routing faults to a custom sink.
    pub fn with_sink(config: TelemetryClientConfig, sink: Arc<dyn ErrorSink>) -> Self {
        let metrics = Arc::new(Metrics::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            hub: Arc::new(DispatchHub::new(sink.clone(), metrics.clone())),
            metrics,
            sink,
            state_tx,
            state_rx,
            session: Mutex::new(None),
        }
    }

    /// Start streaming. Idempotent: calling `start` while a session is
    /// already running is a no-op. After `stop`, a new call begins a fresh
    /// session.
    pub fn start(&self) -> Result<(), Error> {
        let mut session = self.session.lock();
        if let Some(existing) = session.as_ref() {
            if !existing.task.is_finished() {
                debug!("client already running");
                return Ok(());
            }
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        // Leaving Closed is only allowed here, when a new session begins
        self.state_tx.send_replace(ConnectionState::Disconnected);
        let connection = Connection::new(
            self.config.clone(),
            self.hub.clone(),
            self.metrics.clone(),
            self.sink.clone(),
            command_rx,
            self.state_tx.clone(),
        )?;
        let task = tokio::spawn(connection.run());
        *session = Some(Session { command_tx, task });
        Ok(())
    }

    /// Stop streaming. Transitions to `Closed`, cancels any pending
    /// reconnection timer, clears all subscriptions, and releases the
    /// transport. Safe to call repeatedly and without a running session.
    pub fn stop(&self) {
        let mut session = self.session.lock();
        self.hub.clear();
        let Some(session) = session.take() else {
            return;
        };
        // Mark Closed first so the task cannot announce another state,
        // then wake it; a dropped command channel also reads as Close.
        self.state_tx.send_replace(ConnectionState::Closed);
        let _ = session.command_tx.try_send(ConnectionCommand::Close);
        // Abort outright so a winding-down task cannot touch the watch
        // channel after a later restart resets it
        session.task.abort();
        self.metrics.record_disconnection();
    }

    /// Tear down the current stream and reconnect immediately, skipping any
    /// pending backoff delay. No-op when not running.
    pub fn force_reconnect(&self) {
        let session = self.session.lock();
        if let Some(session) = session.as_ref() {
            let _ = session.command_tx.try_send(ConnectionCommand::Reconnect);
        }
    }

    /// Register a callback for decoded frames of `kind`. Frames arrive in
    /// stream order; frames published before registration are never replayed.
    pub fn subscribe<F>(&self, kind: MetricKind, callback: F) -> SubscriptionHandle
    where
        F: Fn(&MetricFrame) + Send + Sync + 'static,
    {
        self.hub.subscribe(kind, callback)
    }

    /// Remove a subscription. Idempotent.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.hub.unsubscribe(handle)
    }

    /// Synchronous, non-blocking read of the connection state.
    pub fn current_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A watch receiver observing state transitions. Useful for waiting on
    /// a particular lifecycle phase without polling.
    ///
    /// The channel keeps only the latest value, so a slow reader can miss
    /// short-lived intermediate states such as `Connecting`. Rely on the
    /// current state, not on seeing every hop.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Whether a session is currently running.
    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    /// Get the metrics for this client.
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_config() -> TelemetryClientConfig {
        // TEST-NET-1 address; connect attempts stall or fail, which is all
        // these lifecycle tests need
        TelemetryClientConfig::builder()
            .url("http://192.0.2.1:9/events")
            .build()
            .unwrap()
    }

    #[test]
    fn test_initial_state_is_disconnected() {
        let client = TelemetryClient::new(unreachable_config());
        assert_eq!(client.current_state(), ConnectionState::Disconnected);
        assert!(!client.is_running());
    }

    #[test]
    fn test_subscribe_unsubscribe_without_session() {
        let client = TelemetryClient::new(unreachable_config());
        let handle = client.subscribe(MetricKind::Cpu, |_| {});
        client.unsubscribe(handle);
        client.unsubscribe(handle);
    }

    #[test]
    fn test_stop_without_start_is_safe() {
        let client = TelemetryClient::new(unreachable_config());
        client.stop();
        client.stop();
        assert_eq!(client.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let client = TelemetryClient::new(unreachable_config());
        client.start().unwrap();
        assert!(client.is_running());
        // Second start while running must not spawn a second session
        client.start().unwrap();
        assert!(client.is_running());
        client.stop();
    }

    #[tokio::test]
    async fn test_stop_is_terminal_and_repeatable() {
        let client = TelemetryClient::new(unreachable_config());
        client.subscribe(MetricKind::Memory, |_| {});
        client.start().unwrap();
        client.stop();
        assert_eq!(client.current_state(), ConnectionState::Closed);
        client.stop();
        assert_eq!(client.current_state(), ConnectionState::Closed);

        // State stays Closed even while the task winds down
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.current_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_restart_after_stop_begins_fresh_session() {
        let client = TelemetryClient::new(unreachable_config());
        client.start().unwrap();
        client.stop();
        client.start().unwrap();
        assert!(client.is_running());
        assert_ne!(client.current_state(), ConnectionState::Closed);
        client.stop();
    }
}
