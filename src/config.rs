use http::{HeaderName, HeaderValue};
use std::time::Duration;
use url::Url;

/// Configuration for the telemetry client
#[derive(Debug, Clone)]
pub struct TelemetryClientConfig {
    /// The SSE endpoint to stream from
    pub url: Url,
    /// Connection-related settings
    pub connection: ConnectionConfig,
    /// Backoff settings for reconnection
    pub backoff: BackoffConfig,
}

impl TelemetryClientConfig {
    /// Create a new builder for configuration
    pub fn builder() -> TelemetryClientConfigBuilder {
        TelemetryClientConfigBuilder::default()
    }
}

/// Builder for TelemetryClientConfig
#[derive(Debug, Clone, Default)]
pub struct TelemetryClientConfigBuilder {
    url: String,
    connection: ConnectionConfig,
    backoff: BackoffConfig,
}

impl TelemetryClientConfigBuilder {
    /// Set the SSE endpoint URL (required)
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set connection configuration
    pub fn connection(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = config;
        self
    }

    /// Add a header to send with every stream request (e.g., auth)
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.connection.headers.push((name, value));
        self
    }

    /// Build the configuration with validation.
    pub fn build(self) -> Result<TelemetryClientConfig, ConfigError> {
        let url = Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {e}", self.url)))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::InvalidUrl(format!(
                    "unsupported scheme {other:?} (expected http or https)"
                )))
            }
        }

        if self.backoff.max_delay < self.backoff.base_delay {
            return Err(ConfigError::InvalidBackoff(
                "max_delay must be >= base_delay".to_string(),
            ));
        }
        if self.backoff.multiplier <= 0.0 {
            return Err(ConfigError::InvalidBackoff(
                "multiplier must be > 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.backoff.jitter_ratio) {
            return Err(ConfigError::InvalidBackoff(
                "jitter_ratio must be in [0, 1)".to_string(),
            ));
        }

        if self.connection.max_line_length == 0 {
            return Err(ConfigError::InvalidConnection(
                "max_line_length cannot be 0".to_string(),
            ));
        }

        Ok(TelemetryClientConfig {
            url,
            connection: self.connection,
            backoff: self.backoff,
        })
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// The endpoint URL is missing or unparseable
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
    /// Invalid backoff configuration
    #[error("Invalid backoff configuration: {0}")]
    InvalidBackoff(String),
    /// Invalid connection configuration
    #[error("Invalid connection configuration: {0}")]
    InvalidConnection(String),
}

/// Connection-related configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// Extra headers to send with every stream request
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Maximum length of a single SSE line; longer input is treated as a
    /// protocol violation to bound memory use
    pub max_line_length: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            headers: Vec::new(),
            max_line_length: 256 * 1024,
        }
    }
}

/// Backoff configuration for reconnection
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnection attempt
    pub base_delay: Duration,
    /// Maximum pre-jitter delay between reconnection attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (typically 2.0)
    pub multiplier: f64,
    /// Jitter applied symmetrically around the computed delay; 0.2 means
    /// the delay is spread over +/-20% to avoid thundering-herd reconnects
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_ratio: 0.2,
        }
    }
}

impl BackoffConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_from_base(self.base_delay, attempt)
    }

    /// Calculate the delay using an alternate base, e.g. a server-suggested
    /// `retry:` value that overrides the configured base delay.
    pub fn delay_from_base(&self, base: Duration, attempt: u32) -> Duration {
        let raw = base.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_millis() as f64);

        if self.jitter_ratio > 0.0 {
            let spread = 1.0 + self.jitter_ratio * (2.0 * rand::random::<f64>() - 1.0);
            Duration::from_millis((capped * spread) as u64)
        } else {
            Duration::from_millis(capped as u64)
        }
    }
}
