use crate::frame::MetricKind;
use thiserror::Error;
use tracing::{error, warn};

/// Categorizes faults for sink implementations that make type-based decisions.
///
/// This is a lightweight, cloneable representation that avoids handing out
/// references into the underlying error values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport-level failure (connect, TLS, mid-stream read)
    Transport,
    /// The server violated the SSE contract (bad status, wrong content type,
    /// oversized line)
    Protocol,
    /// A frame payload failed to decode
    Decode,
    /// A subscriber callback panicked
    Subscriber,
}

/// Connection-level errors.
///
/// None of these are fatal to the client: the connection manager reports them
/// to the [`ErrorSink`] and reconnects, unless it has been explicitly stopped.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error (connect failure, timeout, mid-stream read error)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server response does not look like an SSE stream
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl Error {
    /// Get the kind of this error for decision-making.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Protocol(_) => ErrorKind::Protocol,
        }
    }
}

/// Per-frame decode failures.
///
/// A frame that fails to decode is dropped and reported; it never tears down
/// the stream.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The event name is not a recognized metric kind
    #[error("unknown event kind: {0:?}")]
    UnknownKind(String),

    /// The payload is not valid JSON or is missing required numeric fields
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// A percentage field lies outside [0, 100]
    #[error("{field} out of range: {value} (expected 0..=100)")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Receives every non-fatal fault the client encounters.
///
/// The default methods log via `tracing`, so a custom sink only needs to
/// override the cases it cares about. All methods are called from the
/// connection task; keep them quick.
pub trait ErrorSink: Send + Sync + 'static {
    /// A frame failed to decode. The stream continues.
    fn decode_error(&self, event: &str, payload: &str, error: &DecodeError) {
        warn!(event, payload, %error, "dropping undecodable frame");
    }

    /// The transport or handshake failed. A reconnect follows unless the
    /// client was stopped. `attempt` counts consecutive failed attempts since
    /// the last successful connection.
    fn transport_error(&self, error: &Error, attempt: u32) {
        warn!(attempt, %error, "stream transport error");
    }

    /// A subscriber callback panicked while handling a frame of `kind`.
    /// Delivery to the remaining subscribers continued.
    fn subscriber_panic(&self, kind: MetricKind) {
        error!(?kind, "subscriber callback panicked");
    }
}

/// Default sink: routes every fault to `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {}
