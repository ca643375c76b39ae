//! TCP listener, request reading and per-connection handling.

mod connection;
mod listener;
mod request;

pub use connection::{ConnectionError, ConnectionHandler};
pub use listener::{AcceptedConnection, StreamListener};
pub use request::{read_request, Request};
