use crate::config::TelemetryClientConfig;
use crate::error::{Error, ErrorSink};
use crate::frame::MetricFrame;
use crate::hub::DispatchHub;
use crate::metrics::Metrics;
use crate::sse::SseParser;
use futures_util::StreamExt;
use http::{header, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Commands accepted by the connection task
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    /// Gracefully close the connection (terminal)
    Close,
    /// Tear down the current stream and reconnect immediately
    Reconnect,
}

/// Connection lifecycle states. Exactly one value at a time, owned by the
/// connection task; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session has been started yet
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// The stream is live
    Connected,
    /// Waiting out the backoff delay before the next attempt
    Reconnecting,
    /// Explicitly stopped; no further transitions
    Closed,
}

/// Reconnection bookkeeping. The attempt counter resets to zero on every
/// successful connection; `server_retry` carries the stream's `retry:`
/// suggestion and replaces the configured base delay once seen.
#[derive(Debug, Default)]
struct BackoffState {
    attempt: u32,
    server_retry: Option<Duration>,
}

impl BackoffState {
    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Manages the single streaming connection: handshake, SSE parsing, frame
/// decode and dispatch, and the reconnect loop.
pub(crate) struct Connection {
    config: TelemetryClientConfig,
    http: reqwest::Client,
    hub: Arc<DispatchHub>,
    metrics: Arc<Metrics>,
    sink: Arc<dyn ErrorSink>,
    command_rx: mpsc::Receiver<ConnectionCommand>,
    state_tx: watch::Sender<ConnectionState>,
    backoff: BackoffState,
    last_event_id: Option<String>,
}

impl Connection {
    pub(crate) fn new(
        config: TelemetryClientConfig,
        hub: Arc<DispatchHub>,
        metrics: Arc<Metrics>,
        sink: Arc<dyn ErrorSink>,
        command_rx: mpsc::Receiver<ConnectionCommand>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connection.connect_timeout)
            .build()?;
        Ok(Self {
            config,
            http,
            hub,
            metrics,
            sink,
            command_rx,
            state_tx,
            backoff: BackoffState::default(),
            last_event_id: None,
        })
    }

    /// Run the connection loop. Reconnects on any transport or protocol
    /// failure; returns only on explicit stop.
    pub(crate) async fn run(mut self) {
        let mut is_first_connect = true;

        loop {
            if !is_first_connect {
                self.transition(ConnectionState::Reconnecting);
                let delay = match self.backoff.server_retry {
                    Some(base) => self.config.backoff.delay_from_base(base, self.backoff.attempt),
                    None => self.config.backoff.delay_for_attempt(self.backoff.attempt),
                };
                debug!(
                    ?delay,
                    attempt = self.backoff.attempt + 1,
                    "waiting before reconnect"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    cmd = self.command_rx.recv() => match cmd {
                        Some(ConnectionCommand::Reconnect) => {
                            debug!("reconnect requested, skipping remaining delay");
                        }
                        Some(ConnectionCommand::Close) | None => {
                            self.transition(ConnectionState::Closed);
                            return;
                        }
                    }
                }
                self.backoff.attempt += 1;
                self.metrics.record_reconnection();
            }
            is_first_connect = false;

            self.transition(ConnectionState::Connecting);
            match self.connect_and_stream().await {
                Ok(true) => {
                    info!("telemetry stream closed");
                    self.transition(ConnectionState::Closed);
                    return;
                }
                Ok(false) => {
                    // Stream ended or forced reconnect; the attempt counter
                    // was already reset when the connection opened
                }
                Err(e) => {
                    self.metrics.record_transport_error();
                    self.sink.transport_error(&e, self.backoff.attempt);
                }
            }
        }
    }

    /// Connect and stream until disconnection.
    /// Returns Ok(true) if the client should stop, Ok(false) to reconnect.
    async fn connect_and_stream(&mut self) -> Result<bool, Error> {
        let mut request = self
            .http
            .get(self.config.url.as_str())
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");
        for (name, value) in &self.config.connection.headers {
            request = request.header(name.clone(), value.clone());
        }
        if let Some(id) = &self.last_event_id {
            // Ids with bytes illegal in a header value are simply not resent
            if let Ok(value) = HeaderValue::from_str(id) {
                request = request.header("Last-Event-ID", value);
            }
        }

        let response = request.send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Protocol(format!("unexpected HTTP status {status}")));
        }
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.starts_with("text/event-stream") {
            return Err(Error::Protocol(format!(
                "unexpected content type {content_type:?}"
            )));
        }

        self.backoff.reset();
        self.metrics.record_connection();
        self.transition(ConnectionState::Connected);
        info!(url = %self.config.url, "telemetry stream connected");

        let mut parser = SseParser::new(self.config.connection.max_line_length);
        let mut body = Box::pin(response.bytes_stream());

        let result = loop {
            tokio::select! {
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        match parser.feed(&bytes) {
                            Ok(events) => {
                                for event in events {
                                    self.handle_event(&event.name, &event.data);
                                }
                            }
                            Err(e) => break Err(e),
                        }
                        if let Some(id) = parser.last_event_id() {
                            self.last_event_id = Some(id.to_string());
                        }
                        if let Some(retry) = parser.retry() {
                            self.backoff.server_retry = Some(retry);
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "stream read failed");
                        break Err(Error::Transport(e));
                    }
                    None => {
                        info!("server ended the stream");
                        break Ok(false);
                    }
                },
                cmd = self.command_rx.recv() => match cmd {
                    Some(ConnectionCommand::Close) | None => break Ok(true),
                    Some(ConnectionCommand::Reconnect) => {
                        debug!("forced reconnect");
                        break Ok(false);
                    }
                },
            }
        };

        self.metrics.record_disconnection();
        result
    }

    /// Decode one wire event and fan it out. Decode failures are reported
    /// and dropped; one malformed frame must not drop the stream.
    fn handle_event(&self, name: &str, data: &str) {
        self.metrics.record_frame_received();
        match MetricFrame::decode(name, data) {
            Ok(frame) => {
                self.metrics.record_frame_decoded();
                let delivered = self.hub.publish(&frame);
                self.metrics.record_dispatched(delivered as u64);
            }
            Err(e) => {
                self.metrics.record_decode_error();
                self.sink.decode_error(name, data, &e);
            }
        }
    }

    /// Publish a state transition. `Closed` is terminal: once there, the
    /// task never announces another state.
    fn transition(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == ConnectionState::Closed || *state == next {
                return false;
            }
            debug!(from = ?*state, to = ?next, "connection state transition");
            *state = next;
            true
        });
    }
}
