use crate::error::ErrorSink;
use crate::frame::{MetricFrame, MetricKind};
use crate::metrics::Metrics;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Opaque handle identifying one subscription, returned by `subscribe` and
/// consumed by `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

type Callback = Box<dyn Fn(&MetricFrame) + Send + Sync>;

struct Subscriber {
    handle: SubscriptionHandle,
    kind: MetricKind,
    callback: Callback,
}

/// Fan-out point delivering each decoded frame to every subscriber of its
/// kind, synchronously, in registration order.
///
/// This is a live tap, not a log: subscribers registered after a frame was
/// published never see it.
pub struct DispatchHub {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    next_handle: AtomicU64,
    sink: Arc<dyn ErrorSink>,
    metrics: Arc<Metrics>,
}

impl DispatchHub {
    pub fn new(sink: Arc<dyn ErrorSink>, metrics: Arc<Metrics>) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_handle: AtomicU64::new(0),
            sink,
            metrics,
        }
    }

    /// Register a callback for frames of `kind`.
    pub fn subscribe<F>(&self, kind: MetricKind, callback: F) -> SubscriptionHandle
    where
        F: Fn(&MetricFrame) + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Arc::new(Subscriber {
            handle,
            kind,
            callback: Box::new(callback),
        }));
        trace!(?handle, ?kind, "subscriber registered");
        handle
    }

    /// Remove a subscription. Idempotent: unknown or already-removed handles
    /// are a no-op.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers.write().retain(|s| s.handle != handle);
    }

    /// Deliver a frame to every current subscriber of the matching kind.
    /// Returns the number of deliveries attempted.
    ///
    /// A panicking callback is isolated and reported to the error sink;
    /// the remaining subscribers still receive the frame.
    pub fn publish(&self, frame: &MetricFrame) -> usize {
        let kind = frame.kind();
        // Snapshot the matching subscribers so callbacks can subscribe or
        // unsubscribe without deadlocking against the registry lock.
        let targets: Vec<Arc<Subscriber>> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect();

        for subscriber in &targets {
            if catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(frame))).is_err() {
                self.metrics.record_subscriber_panic();
                self.sink.subscriber_panic(kind);
            }
        }
        targets.len()
    }

    /// Drop every subscription (client shutdown).
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    /// Current number of registered subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogSink;
    use crate::frame::{CpuStats, MemoryStats};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn hub() -> DispatchHub {
        DispatchHub::new(Arc::new(LogSink), Arc::new(Metrics::new()))
    }

    fn mem_frame(used_percent: f64) -> MetricFrame {
        MetricFrame::Memory(MemoryStats {
            total: 100,
            free: 25,
            available: 30,
            used: 75,
            used_percent,
        })
    }

    fn cpu_frame() -> MetricFrame {
        MetricFrame::Cpu(CpuStats {
            user: 10.0,
            system: 5.0,
            idle: 85.0,
        })
    }

    #[test]
    fn test_kind_filtering() {
        let hub = hub();
        let mem_seen = Arc::new(AtomicUsize::new(0));
        let cpu_seen = Arc::new(AtomicUsize::new(0));

        let m = mem_seen.clone();
        hub.subscribe(MetricKind::Memory, move |_| {
            m.fetch_add(1, Ordering::SeqCst);
        });
        let c = cpu_seen.clone();
        hub.subscribe(MetricKind::Cpu, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hub.publish(&mem_frame(10.0));
        hub.publish(&cpu_frame());
        hub.publish(&mem_frame(20.0));

        assert_eq!(mem_seen.load(Ordering::SeqCst), 2);
        assert_eq!(cpu_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let hub = hub();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            hub.subscribe(MetricKind::Memory, move |_| {
                order.lock().push(tag);
            });
        }

        hub.publish(&mem_frame(50.0));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_frames_arrive_in_published_order() {
        let hub = hub();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        hub.subscribe(MetricKind::Memory, move |frame| {
            if let MetricFrame::Memory(m) = frame {
                sink.lock().push(m.used_percent);
            }
        });

        for pct in [10.0, 20.0, 30.0] {
            hub.publish(&mem_frame(pct));
        }
        assert_eq!(*seen.lock(), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let hub = hub();
        hub.publish(&mem_frame(10.0));

        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        hub.subscribe(MetricKind::Memory, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        hub.publish(&mem_frame(20.0));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let hub = hub();
        let survivor_seen = Arc::new(AtomicUsize::new(0));

        let handle = hub.subscribe(MetricKind::Memory, |_| {});
        let s = survivor_seen.clone();
        hub.subscribe(MetricKind::Memory, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        hub.unsubscribe(handle);
        hub.unsubscribe(handle); // second call: no-op, no panic
        assert_eq!(hub.subscriber_count(), 1);

        hub.publish(&mem_frame(10.0));
        assert_eq!(survivor_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let hub = hub();
        let seen = Arc::new(AtomicUsize::new(0));

        hub.subscribe(MetricKind::Cpu, |_| panic!("subscriber bug"));
        let s = seen.clone();
        hub.subscribe(MetricKind::Cpu, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        let delivered = hub.publish(&cpu_frame());
        assert_eq!(delivered, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_removes_everything() {
        let hub = hub();
        hub.subscribe(MetricKind::Memory, |_| {});
        hub.subscribe(MetricKind::Cpu, |_| {});
        hub.clear();
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(&mem_frame(1.0)), 0);
    }
}
