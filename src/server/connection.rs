//! Per-connection handling: read the request, then stream events.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::Instrument;

use super::request::read_request;
use crate::config::{ServerConfig, StreamConfig};
use crate::error::{RequestError, ServeError};
use crate::handler::{EventHandler, StreamContext};
use crate::metrics::{self, ErrorReason, StreamGuard};
use crate::shutdown::ConnectionGuard;
use crate::streaming::{format_error_response, serve_event_stream};

/// Serves one event-stream client per call to [`handle`](Self::handle).
pub struct ConnectionHandler {
    server: ServerConfig,
    stream: StreamConfig,
    handler: Arc<dyn EventHandler>,
}

impl ConnectionHandler {
    pub fn new(server: ServerConfig, stream: StreamConfig, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            server,
            stream,
            handler,
        }
    }

    /// Handle a client from accept to close.
    ///
    /// Errors and panics are logged here; nothing propagates to the accept loop.
    pub async fn handle(&self, stream: TcpStream, peer: SocketAddr, guard: ConnectionGuard) {
        let conn_id = guard.id();
        let span = tracing::info_span!("connection", id = conn_id, %peer);

        let result = AssertUnwindSafe(self.handle_inner(stream, &guard))
            .catch_unwind()
            .instrument(span.clone())
            .await;
        let _enter = span.enter();

        match result {
            Ok(Ok(())) => {
                tracing::debug!(id = conn_id, "Connection completed");
            }
            Ok(Err(e)) => {
                tracing::warn!(id = conn_id, error = %e, "Connection error");
            }
            Err(panic) => {
                let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                tracing::error!(id = conn_id, panic = %panic_msg, "Connection handler panicked");
            }
        }
    }

    async fn handle_inner(
        &self,
        mut stream: TcpStream,
        guard: &ConnectionGuard,
    ) -> Result<(), ConnectionError> {
        let request = match read_request(
            &mut stream,
            self.server.max_request_head,
            self.server.request_timeout(),
        )
        .await
        {
            Ok(request) => request,
            Err(e) => {
                metrics::record_request_error(ErrorReason::from_request_error(&e));
                if let Some(status) = request_error_status(&e) {
                    reject(&mut stream, status, &e.to_string()).await;
                }
                return Err(ConnectionError::Request(e));
            }
        };

        tracing::info!(
            method = request.method(),
            path = request.path(),
            last_event_id = request.last_event_id(),
            "Received request"
        );

        if request.method() != "GET" {
            reject(&mut stream, 405, "Only GET is supported").await;
            return Ok(());
        }
        if request.path() != self.server.path {
            reject(&mut stream, 404, request.path()).await;
            return Ok(());
        }

        let mut ctx = StreamContext::new(request, guard.id(), guard.subscribe());
        let open_stream = StreamGuard::start();

        let result = serve_event_stream(
            stream,
            self.stream.buffer_size,
            self.handler.as_ref(),
            &mut ctx,
        )
        .await;

        let duration = open_stream.elapsed();
        drop(open_stream);

        match result {
            Ok(summary) => {
                if summary.client_gone {
                    metrics::record_stream_error(ErrorReason::ClientDisconnected);
                }
                tracing::info!(
                    handler = self.handler.name(),
                    events = summary.events,
                    bytes = summary.bytes,
                    client_gone = summary.client_gone,
                    duration_ms = duration.as_millis() as u64,
                    "Stream closed"
                );
                Ok(())
            }
            Err(e) => {
                let reason = match &e {
                    ServeError::Stream(err) => ErrorReason::from_stream_error(err),
                    ServeError::Io(err) => ErrorReason::from_io_error(err),
                    ServeError::FlushUnsupported => ErrorReason::Other,
                };
                metrics::record_stream_error(reason);
                Err(ConnectionError::Serve(e))
            }
        }
    }
}

fn request_error_status(err: &RequestError) -> Option<u16> {
    match err {
        RequestError::Malformed(_) => Some(400),
        RequestError::Timeout => Some(408),
        RequestError::TooLarge(_) => Some(431),
        RequestError::Io(_) | RequestError::Incomplete => None,
    }
}

/// Answer with an error response and close; failures are only logged.
async fn reject(stream: &mut TcpStream, status: u16, reason: &str) {
    metrics::record_connection_rejected(status);
    let response = format_error_response(status, reason);
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!(status, error = %e, "Failed to send error response to client");
        return;
    }
    let _ = stream.shutdown().await;
}

/// Errors during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Serve error: {0}")]
    Serve(#[from] ServeError),
}
