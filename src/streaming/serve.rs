//! Event-stream response lifecycle for one connection.

use tokio::io::AsyncWriteExt;

use super::sse::{format_empty_response, CONNECTION_GREETING, SSE_HEADERS};
use super::transport::{DynTransport, Transport};
use super::writer::EventWriter;
use crate::error::{ServeError, StreamError};
use crate::handler::{EventHandler, StreamContext};

/// What one served stream amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub events: u64,
    pub bytes: u64,
    /// The client hung up while the handler was still writing.
    pub client_gone: bool,
}

/// Turn `transport` into an event stream and run `handler` on it.
///
/// Answers `500` with an empty body, without invoking the handler, when the
/// transport cannot flush. Otherwise writes the event-stream head and the
/// greeting comment, flushes, and hands a fresh [`EventWriter`] with a
/// `buffer_size` working buffer to the handler.
pub async fn serve_event_stream<T, H>(
    transport: T,
    buffer_size: usize,
    handler: &H,
    ctx: &mut StreamContext,
) -> Result<StreamSummary, ServeError>
where
    T: Transport + 'static,
    H: EventHandler + ?Sized,
{
    let mut transport: DynTransport = Box::new(transport);

    if !transport.can_flush() {
        transport
            .write_all(format_empty_response(500).as_bytes())
            .await?;
        let _ = transport.shutdown().await;
        return Err(ServeError::FlushUnsupported);
    }

    transport.write_all(SSE_HEADERS.as_bytes()).await?;
    transport.write_all(CONNECTION_GREETING.as_bytes()).await?;
    if let Err(e) = transport.flush().await {
        tracing::debug!(error = %e, "Flush after greeting failed");
    }

    let mut events = EventWriter::with_buffer_size(transport, buffer_size);
    let result = handler.serve(&mut events, ctx).await;

    let summary = StreamSummary {
        events: events.events_written(),
        bytes: events.bytes_written(),
        client_gone: matches!(result, Err(StreamError::StreamEnded)),
    };

    match result {
        Ok(()) | Err(StreamError::StreamEnded) => {
            let _ = events.into_inner().shutdown().await;
            Ok(summary)
        }
        Err(e) => Err(e.into()),
    }
}
