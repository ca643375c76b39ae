//! Server-sent events daemon.
//!
//! The core is [`streaming::EventWriter`], which frames events onto any
//! [`streaming::Transport`] through one fixed-size working buffer, so
//! payloads of any length stream to the client without being staged in
//! memory. The [`server`] module wraps it in a small TCP daemon.

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod streaming;

pub use config::Config;
pub use error::{DaemonError, Result};
