//! Error types for the SSE daemon.

use std::io;
use thiserror::Error;

/// Result type alias for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Top-level error type for the daemon.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Socket error: {0}")]
    Socket(String),
}

/// Errors while emitting events to a client.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The transport rejected a write.
    #[error("Write error: {0}")]
    Write(#[source] io::Error),

    /// The payload source failed for a reason other than end-of-stream.
    #[error("Read error: {0}")]
    Read(#[source] io::Error),

    /// The transport accepted fewer bytes than one frame without reporting an error.
    #[error("Incomplete write: {written} of {requested} bytes")]
    ShortWrite { requested: usize, written: usize },

    /// The working buffer has no room for payload once framing is reserved.
    #[error("Buffer of {len} bytes cannot hold {padding} bytes of framing plus payload")]
    BufferTooSmall { len: usize, padding: usize },

    /// The peer closed the connection.
    #[error("Stream ended")]
    StreamEnded,
}

impl StreamError {
    pub fn is_stream_ended(&self) -> bool {
        matches!(self, StreamError::StreamEnded)
    }
}

/// Failure of a padded copy, with the bytes that reached the destination before it.
#[derive(Error, Debug)]
#[error("{source} (after {written} bytes)")]
pub struct CopyError {
    /// Sum of the destination's write-call returns up to and including the failing one.
    pub written: u64,
    #[source]
    pub source: StreamError,
}

impl CopyError {
    pub fn into_inner(self) -> StreamError {
        self.source
    }
}

/// Errors while reading an HTTP request head.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed before request head was complete")]
    Incomplete,

    #[error("Request head exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Request timeout")]
    Timeout,
}

/// Errors while setting up or running one event stream.
#[derive(Error, Debug)]
pub enum ServeError {
    /// The transport cannot push buffered data to the peer on demand.
    #[error("Transport does not support flushing")]
    FlushUnsupported,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}
