//! Prometheus metrics for the SSE daemon.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use nix::libc;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{RequestError, StreamError};

/// Error reason labels for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    /// Client went away (EPIPE, ECONNRESET).
    ClientDisconnected,
    /// Deadline exceeded.
    Timeout,
    /// Transport accepted only part of a frame.
    ShortWrite,
    /// Payload source failed.
    Source,
    /// Malformed or oversized request.
    BadRequest,
    Network,
    Other,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::ClientDisconnected => "client_disconnected",
            ErrorReason::Timeout => "timeout",
            ErrorReason::ShortWrite => "short_write",
            ErrorReason::Source => "source",
            ErrorReason::BadRequest => "bad_request",
            ErrorReason::Network => "network",
            ErrorReason::Other => "other",
        }
    }

    /// Classify an I/O error.
    pub fn from_io_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
                ErrorReason::ClientDisconnected
            }
            io::ErrorKind::TimedOut => ErrorReason::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrInUse
            | io::ErrorKind::AddrNotAvailable => ErrorReason::Network,
            _ => match err.raw_os_error() {
                Some(libc::EPIPE) | Some(libc::ECONNRESET) => ErrorReason::ClientDisconnected,
                Some(libc::ETIMEDOUT) => ErrorReason::Timeout,
                _ => ErrorReason::Other,
            },
        }
    }

    pub fn from_stream_error(err: &StreamError) -> Self {
        match err {
            StreamError::StreamEnded => ErrorReason::ClientDisconnected,
            StreamError::Write(e) => Self::from_io_error(e),
            StreamError::Read(_) => ErrorReason::Source,
            StreamError::ShortWrite { .. } => ErrorReason::ShortWrite,
            StreamError::BufferTooSmall { .. } => ErrorReason::Other,
        }
    }

    pub fn from_request_error(err: &RequestError) -> Self {
        match err {
            RequestError::Io(e) => Self::from_io_error(e),
            RequestError::Timeout => ErrorReason::Timeout,
            RequestError::Incomplete => ErrorReason::ClientDisconnected,
            RequestError::TooLarge(_) | RequestError::Malformed(_) => ErrorReason::BadRequest,
        }
    }
}

static ACTIVE_STREAMS: AtomicI64 = AtomicI64::new(0);
static PEAK_STREAMS: AtomicI64 = AtomicI64::new(0);

/// Initialize metrics descriptions.
pub fn init_metrics() {
    describe_gauge!(
        "sse_active_connections",
        "Number of currently open client connections"
    );
    describe_counter!("sse_connections_total", "Total connections accepted");
    describe_counter!(
        "sse_connections_rejected_total",
        "Connections refused before streaming started"
    );
    describe_counter!("sse_request_errors_total", "Request head read failures");

    describe_gauge!("sse_active_streams", "Number of open event streams");
    describe_gauge!("sse_peak_streams", "Peak number of concurrent event streams");
    describe_counter!("sse_events_sent_total", "Events written and flushed");
    describe_counter!("sse_bytes_sent_total", "Event bytes accepted by transports");
    describe_counter!("sse_stream_errors_total", "Event stream failures");
    describe_histogram!("sse_stream_duration_seconds", "Lifetime of each event stream");
}

/// Start the Prometheus metrics HTTP server.
pub async fn start_metrics_server(addr: SocketAddr) -> anyhow::Result<()> {
    // Streams live from milliseconds to hours: 10ms .. ~11.6h, factor 4.
    let duration_buckets: [f64; 12] = [
        0.01, 0.04, 0.16, 0.64, 2.56, 10.24, 40.96, 163.84, 655.36, 2621.44, 10485.76, 41943.04,
    ];

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("sse_stream_duration_seconds".to_string()),
            &duration_buckets,
        )?
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics server: {}", e))?;

    tracing::info!(%addr, "Metrics server started");
    Ok(())
}

pub fn record_connection_accepted() {
    counter!("sse_connections_total").increment(1);
}

pub fn record_connection_rejected(status: u16) {
    counter!("sse_connections_rejected_total", "status" => status.to_string()).increment(1);
}

pub fn set_active_connections(count: u64) {
    gauge!("sse_active_connections").set(count as f64);
}

pub fn record_request_error(reason: ErrorReason) {
    counter!("sse_request_errors_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_event_sent() {
    counter!("sse_events_sent_total").increment(1);
}

pub fn record_bytes_sent(bytes: u64) {
    counter!("sse_bytes_sent_total").increment(bytes);
}

pub fn record_stream_error(reason: ErrorReason) {
    counter!("sse_stream_errors_total", "reason" => reason.as_str()).increment(1);
}

/// Number of event streams currently open.
pub fn active_streams() -> i64 {
    ACTIVE_STREAMS.load(Ordering::Relaxed)
}

/// Count a stream as open and track the peak.
pub fn record_stream_start() {
    let current = ACTIVE_STREAMS.fetch_add(1, Ordering::Relaxed) + 1;
    gauge!("sse_active_streams").set(current as f64);

    let prev_peak = PEAK_STREAMS.fetch_max(current, Ordering::Relaxed);
    if current > prev_peak {
        gauge!("sse_peak_streams").set(current as f64);
    }
}

pub fn record_stream_end(duration: Duration) {
    let current = ACTIVE_STREAMS.fetch_sub(1, Ordering::Relaxed) - 1;
    gauge!("sse_active_streams").set(current as f64);
    histogram!("sse_stream_duration_seconds").record(duration.as_secs_f64());
}

/// Keeps one event stream counted while alive.
///
/// Dropping the guard closes the stream in the metrics, including when the
/// handler unwinds.
pub struct StreamGuard {
    timer: Timer,
}

impl StreamGuard {
    pub fn start() -> Self {
        record_stream_start();
        Self {
            timer: Timer::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        record_stream_end(self.timer.elapsed());
    }
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
