//! SSE event writer.
//!
//! Writes events straight to the transport without staging whole frames,
//! so payloads of any length stream through one fixed working buffer.

use tokio::io::{AsyncRead, AsyncWriteExt};

use super::copy::padded_copy_buf;
use super::event::Event;
use super::transport::{DynTransport, Transport};
use crate::error::StreamError;
use crate::metrics;

/// Working buffer size for a new connection.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

const MSG_ID: &[u8] = b"id: ";
const MSG_EVENT: &[u8] = b"event: ";
const MSG_DATA: &[u8] = b"data: ";
const MSG_END: &[u8] = b"\n";

/// Payload source for one event.
pub type Payload<'a> = &'a mut (dyn AsyncRead + Unpin + Send);

/// Frames events onto a single transport.
///
/// A writer owns its transport and working buffer. Every method takes
/// `&mut self`, so events on one connection are emitted strictly one after
/// another; to feed a connection from several tasks, route them through the
/// task that owns the writer.
pub struct EventWriter<T: Transport = DynTransport> {
    transport: T,
    buf: Box<[u8]>,
    bytes_written: u64,
    events_written: u64,
}

impl<T: Transport> EventWriter<T> {
    /// Create a writer with a [`DEFAULT_BUFFER_SIZE`] working buffer.
    pub fn new(transport: T) -> Self {
        Self::with_buffer_size(transport, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(transport: T, size: usize) -> Self {
        Self::with_buffer(transport, vec![0u8; size])
    }

    /// Create a writer that reuses a caller-supplied working buffer.
    pub fn with_buffer(transport: T, buf: Vec<u8>) -> Self {
        Self {
            transport,
            buf: buf.into_boxed_slice(),
            bytes_written: 0,
            events_written: 0,
        }
    }

    /// Send one event and flush it to the client.
    ///
    /// Writes the `id:` and `event:` lines for non-empty metadata, frames the
    /// payload as one `data:` line per read from `payload`, terminates the
    /// event with a blank line, and flushes. With neither an event nor a
    /// payload this is a no-op.
    ///
    /// Returns [`StreamError::StreamEnded`] when the transport reports that
    /// the peer has gone away. Once any error is returned the connection
    /// should not be written to again.
    pub async fn write_event(
        &mut self,
        event: Option<&Event>,
        payload: Option<Payload<'_>>,
    ) -> Result<(), StreamError> {
        if event.is_none() && payload.is_none() {
            return Ok(());
        }

        // Refuse before the metadata lines go out, so no partial event reaches the client.
        let padding = MSG_DATA.len() + MSG_END.len();
        if payload.is_some() && self.buf.len() <= padding {
            return Err(StreamError::BufferTooSmall {
                len: self.buf.len(),
                padding,
            });
        }

        match self.write_frame(event, payload).await {
            Ok(()) => {
                self.events_written += 1;
                metrics::record_event_sent();
                Ok(())
            }
            Err(StreamError::Write(e)) if self.transport.is_peer_gone(&e) => {
                tracing::debug!(error = %e, "Peer closed event stream");
                Err(StreamError::StreamEnded)
            }
            Err(e) => Err(e),
        }
    }

    /// Send an event whose payload is already in memory.
    pub async fn send(&mut self, event: &Event, data: &[u8]) -> Result<(), StreamError> {
        let mut data = data;
        self.write_event(Some(event), Some(&mut data)).await
    }

    /// Total bytes the transport accepted through this writer.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of events completed and flushed.
    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    async fn write_frame(
        &mut self,
        event: Option<&Event>,
        payload: Option<Payload<'_>>,
    ) -> Result<(), StreamError> {
        if let Some(event) = event {
            if !event.id().is_empty() {
                self.write_parts(&[MSG_ID, event.id().as_bytes(), MSG_END])
                    .await?;
            }
            if !event.name().is_empty() {
                self.write_parts(&[MSG_EVENT, event.name().as_bytes(), MSG_END])
                    .await?;
            }
        }

        if let Some(src) = payload {
            let result =
                padded_copy_buf(&mut self.transport, src, MSG_DATA, MSG_END, &mut self.buf).await;
            let written = match &result {
                Ok(n) => *n,
                Err(e) => e.written,
            };
            self.record_written(written);
            result.map_err(|e| e.into_inner())?;
        }

        self.write_parts(&[MSG_END]).await?;

        if let Err(e) = self.transport.flush().await {
            tracing::debug!(error = %e, "Flush failed");
        }

        Ok(())
    }

    async fn write_parts(&mut self, parts: &[&[u8]]) -> Result<(), StreamError> {
        for part in parts {
            self.transport
                .write_all(part)
                .await
                .map_err(StreamError::Write)?;
            self.record_written(part.len() as u64);
        }
        Ok(())
    }

    fn record_written(&mut self, n: u64) {
        self.bytes_written += n;
        metrics::record_bytes_sent(n);
    }
}

impl<T: Transport + std::fmt::Debug> std::fmt::Debug for EventWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWriter")
            .field("transport", &self.transport)
            .field("buffer_size", &self.buf.len())
            .field("bytes_written", &self.bytes_written)
            .field("events_written", &self.events_written)
            .finish()
    }
}
