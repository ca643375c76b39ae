//! SSE framing and response writing.

mod copy;
mod event;
mod serve;
mod sse;
mod transport;
mod writer;

#[cfg(test)]
pub(crate) mod mock;

pub use copy::{padded_copy, padded_copy_buf, DEFAULT_COPY_BUFFER_SIZE};
pub use event::Event;
pub use serve::{serve_event_stream, StreamSummary};
pub use sse::{format_empty_response, format_error_response, CONNECTION_GREETING, SSE_HEADERS};
pub use transport::{is_disconnect, DynTransport, Transport};
pub use writer::{EventWriter, Payload, DEFAULT_BUFFER_SIZE};
