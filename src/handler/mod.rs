//! Event handlers: the code that decides what a connected client receives.

mod ticker;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::StreamError;
use crate::server::Request;
use crate::streaming::EventWriter;

pub use ticker::TickerHandler;

/// Produces the events for one client connection.
///
/// `serve` runs for as long as the stream should stay open. Returning
/// `Ok(())` closes the connection normally; a [`StreamError::StreamEnded`]
/// from the writer means the client left and is not treated as a failure.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name for logging.
    fn name(&self) -> &'static str;

    async fn serve(
        &self,
        events: &mut EventWriter,
        ctx: &mut StreamContext,
    ) -> Result<(), StreamError>;
}

/// Per-connection state handed to an [`EventHandler`].
#[derive(Debug)]
pub struct StreamContext {
    request: Request,
    conn_id: u64,
    shutdown: watch::Receiver<bool>,
}

impl StreamContext {
    pub fn new(request: Request, conn_id: u64, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            request,
            conn_id,
            shutdown,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolve once the daemon starts shutting down.
    pub async fn shutdown_signaled(&mut self) {
        if self.shutdown.wait_for(|stop| *stop).await.is_err() {
            // Coordinator dropped without signalling; nothing will ever fire.
            std::future::pending::<()>().await;
        }
    }
}
