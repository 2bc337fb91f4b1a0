//! # sse-telemetry-client
//!
//! A resilient client for server-sent-event telemetry streams carrying live
//! memory and CPU metrics.
//!
//! ## Features
//!
//! - **Auto-reconnection** with exponential backoff, jitter, and honor for
//!   the server's `retry:` suggestion
//! - **Typed frames** decoded and range-checked at the boundary
//! - **Fan-out dispatch** to kind-filtered subscribers, in arrival order,
//!   with panic isolation
//! - **Last-Event-ID** resumption on reconnect
//! - **Error sink** receiving every non-fatal fault; one malformed frame
//!   never drops the stream
//! - **Metrics** for observability
//!
//! ## Example
//!
//! ```ignore
//! use sse_telemetry_client::{MetricFrame, MetricKind, TelemetryClient, TelemetryClientConfig};
//!
//! let config = TelemetryClientConfig::builder()
//!     .url("http://127.0.0.1:8080/events")
//!     .build()?;
//!
//! let client = TelemetryClient::new(config);
//! client.subscribe(MetricKind::Cpu, |frame| {
//!     if let MetricFrame::Cpu(cpu) = frame {
//!         println!("user {:.2} system {:.2} idle {:.2}", cpu.user, cpu.system, cpu.idle);
//!     }
//! });
//! client.start()?;
//! ```

mod client;
mod config;
mod connection;
mod error;
mod frame;
mod hub;
mod metrics;
mod sse;

pub use client::TelemetryClient;
pub use config::{BackoffConfig, ConfigError, ConnectionConfig, TelemetryClientConfig};
pub use connection::ConnectionState;
pub use error::{DecodeError, Error, ErrorKind, ErrorSink, LogSink};
pub use frame::{CpuStats, MemoryStats, MetricFrame, MetricKind};
pub use hub::SubscriptionHandle;
pub use metrics::{LinkMetrics, Metrics, MetricsSnapshot};

// Re-export http types for extra request headers
pub use http::{HeaderName, HeaderValue};

/// Result type for sse-telemetry-client operations
pub type Result<T> = std::result::Result<T, Error>;
