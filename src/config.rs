//! Configuration loading from TOML files and environment variables.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::DaemonError;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub ticker: TickerConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP address to accept event-stream clients on.
    pub listen_addr: String,

    /// Path clients request the event stream from.
    pub path: String,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Timeout for receiving the request head (seconds).
    pub request_timeout_secs: u64,

    /// Largest accepted request head, in bytes.
    pub max_request_head: usize,

    /// Graceful shutdown timeout (seconds).
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            path: "/events".to_string(),
            max_connections: 10_000,
            request_timeout_secs: 5,
            max_request_head: 8192,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Per-stream settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Working buffer size for each connection's event writer.
    pub buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: crate::streaming::DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Built-in ticker feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// Delay between events (milliseconds).
    pub interval_ms: u64,

    /// Event name written on the `event:` line.
    pub event_name: String,

    /// Close the stream after this many events (unlimited if unset).
    pub max_events: Option<u64>,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            event_name: "tick".to_string(),
            max_events: None,
        }
    }
}

impl TickerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Metrics/Prometheus configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint.
    pub enabled: bool,

    /// Listen address for metrics server.
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn").
    pub level: String,

    /// Output format: "pretty" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DaemonError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DaemonError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file, then apply environment variable overrides.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, DaemonError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> Result<(), DaemonError> {
        // Room for "data: ", "\n" and at least one payload byte.
        if self.stream.buffer_size < 8 {
            return Err(DaemonError::Config(format!(
                "stream.buffer_size must be at least 8 bytes, got {}",
                self.stream.buffer_size
            )));
        }
        if self.server.max_connections == 0 {
            return Err(DaemonError::Config(
                "server.max_connections must be positive".to_string(),
            ));
        }
        if self.ticker.interval_ms == 0 {
            return Err(DaemonError::Config(
                "ticker.interval_ms must be positive".to_string(),
            ));
        }
        if !self.server.path.starts_with('/') {
            return Err(DaemonError::Config(format!(
                "server.path must start with '/', got {:?}",
                self.server.path
            )));
        }
        Ok(())
    }

    /// Apply overrides from `lookup`, normally the process environment.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SSE_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = lookup("SSE_PATH") {
            self.server.path = v;
        }
        if let Some(n) = lookup("SSE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.server.max_connections = n;
        }
        if let Some(n) = lookup("SSE_REQUEST_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.server.request_timeout_secs = n;
        }
        if let Some(n) = lookup("SSE_BUFFER_SIZE").and_then(|v| v.parse().ok()) {
            self.stream.buffer_size = n;
        }
        if let Some(n) = lookup("SSE_TICK_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.ticker.interval_ms = n;
        }

        if let Some(v) = lookup("SSE_METRICS_ENABLED") {
            self.metrics.enabled = v == "true" || v == "1";
        }
        if let Some(v) = lookup("SSE_METRICS_ADDR") {
            self.metrics.listen_addr = v;
        }

        if let Some(v) = lookup("SSE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("SSE_LOG_FORMAT") {
            self.logging.format = v;
        }
    }
}
