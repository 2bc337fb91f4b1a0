use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics for observability
///
/// Counters and gauges for monitoring stream health. Use `snapshot()` for a
/// point-in-time view of everything, or the individual getters for specific
/// values.
#[derive(Debug, Default)]
pub struct Metrics {
    connections_total: AtomicU64,
    reconnections_total: AtomicU64,
    frames_received_total: AtomicU64,
    frames_decoded_total: AtomicU64,
    frames_dispatched_total: AtomicU64,
    decode_errors_total: AtomicU64,
    transport_errors_total: AtomicU64,
    subscriber_panics_total: AtomicU64,

    link: RwLock<LinkState>,
}

#[derive(Debug, Default)]
struct LinkState {
    is_connected: bool,
    last_connected_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    total_uptime: Duration,
}

/// Gauge view of the single transport connection
#[derive(Debug, Clone, Default)]
pub struct LinkMetrics {
    /// Whether the stream is currently connected
    pub is_connected: bool,
    /// Duration since the last successful connection (None if never connected)
    pub time_since_connected: Option<Duration>,
    /// Duration since the last decoded frame (None if no frames yet)
    pub time_since_last_frame: Option<Duration>,
    /// Total connected time across the client's lifetime
    pub total_uptime: Duration,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Getters ==========

    /// Total connections established
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Total reconnection cycles entered
    pub fn reconnections(&self) -> u64 {
        self.reconnections_total.load(Ordering::Relaxed)
    }

    /// Total raw events received off the wire
    pub fn frames_received(&self) -> u64 {
        self.frames_received_total.load(Ordering::Relaxed)
    }

    /// Total frames successfully decoded
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded_total.load(Ordering::Relaxed)
    }

    /// Total subscriber deliveries
    pub fn frames_dispatched(&self) -> u64 {
        self.frames_dispatched_total.load(Ordering::Relaxed)
    }

    /// Total per-frame decode failures
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors_total.load(Ordering::Relaxed)
    }

    /// Total transport and handshake failures
    pub fn transport_errors(&self) -> u64 {
        self.transport_errors_total.load(Ordering::Relaxed)
    }

    /// Total isolated subscriber panics
    pub fn subscriber_panics(&self) -> u64 {
        self.subscriber_panics_total.load(Ordering::Relaxed)
    }

    /// Gauge view of the transport connection
    pub fn link(&self) -> LinkMetrics {
        self.link.read().snapshot()
    }

    // ========== Recording methods (called internally) ==========

    pub(crate) fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        let mut link = self.link.write();
        link.is_connected = true;
        link.last_connected_at = Some(Instant::now());
    }

    pub(crate) fn record_disconnection(&self) {
        let mut link = self.link.write();
        if link.is_connected {
            if let Some(connected_at) = link.last_connected_at {
                link.total_uptime += connected_at.elapsed();
            }
        }
        link.is_connected = false;
    }

    pub(crate) fn record_reconnection(&self) {
        self.reconnections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_received(&self) {
        self.frames_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_decoded(&self) {
        self.frames_decoded_total.fetch_add(1, Ordering::Relaxed);
        self.link.write().last_frame_at = Some(Instant::now());
    }

    pub(crate) fn record_dispatched(&self, deliveries: u64) {
        self.frames_dispatched_total
            .fetch_add(deliveries, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_error(&self) {
        self.decode_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transport_error(&self) {
        self.transport_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_subscriber_panic(&self) {
        self.subscriber_panics_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all metrics for export
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Acquire),
            reconnections_total: self.reconnections_total.load(Ordering::Acquire),
            frames_received_total: self.frames_received_total.load(Ordering::Acquire),
            frames_decoded_total: self.frames_decoded_total.load(Ordering::Acquire),
            frames_dispatched_total: self.frames_dispatched_total.load(Ordering::Acquire),
            decode_errors_total: self.decode_errors_total.load(Ordering::Acquire),
            transport_errors_total: self.transport_errors_total.load(Ordering::Acquire),
            subscriber_panics_total: self.subscriber_panics_total.load(Ordering::Acquire),
            link: self.link.read().snapshot(),
        }
    }
}

impl LinkState {
    fn snapshot(&self) -> LinkMetrics {
        let uptime = if self.is_connected {
            self.total_uptime
                + self
                    .last_connected_at
                    .map(|t| t.elapsed())
                    .unwrap_or_default()
        } else {
            self.total_uptime
        };
        LinkMetrics {
            is_connected: self.is_connected,
            time_since_connected: self.last_connected_at.map(|t| t.elapsed()),
            time_since_last_frame: self.last_frame_at.map(|t| t.elapsed()),
            total_uptime: uptime,
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub reconnections_total: u64,
    pub frames_received_total: u64,
    pub frames_decoded_total: u64,
    pub frames_dispatched_total: u64,
    pub decode_errors_total: u64,
    pub transport_errors_total: u64,
    pub subscriber_panics_total: u64,
    pub link: LinkMetrics,
}
