//! TCP listener for event-stream clients.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ServerConfig;
use crate::error::{DaemonError, Result};
use crate::metrics;
use crate::shutdown::{ConnectionGuard, ShutdownCoordinator};

/// Listener that hands out connections while capacity remains.
pub struct StreamListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    connection_semaphore: Arc<Semaphore>,
    shutdown: ShutdownCoordinator,
}

impl StreamListener {
    /// Bind to `config.listen_addr`.
    pub async fn bind(config: &ServerConfig, shutdown: ShutdownCoordinator) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).await.map_err(|e| {
            DaemonError::Socket(format!("Failed to bind {}: {}", config.listen_addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            addr = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            listener,
            local_addr,
            connection_semaphore: Arc::new(Semaphore::new(config.max_connections)),
            shutdown,
        })
    }

    /// Accept the next client.
    ///
    /// Waits for a free slot when at capacity. Returns `None` once shutdown
    /// has been signaled. Transient accept errors are logged and retried
    /// after a brief backoff.
    pub async fn accept(&self) -> Option<AcceptedConnection> {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if self.shutdown.is_shutdown() {
                return None;
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => return None,
                permit = self.connection_semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => return None,
                },
            };

            let accept_result = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => return None,
                result = self.listener.accept() => result,
            };

            match accept_result {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, %peer, "Failed to set TCP_NODELAY");
                    }
                    metrics::record_connection_accepted();
                    let guard = self.shutdown.register_connection();

                    return Some(AcceptedConnection {
                        stream,
                        peer,
                        guard,
                        _permit: permit,
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Accept error");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Remaining connection capacity.
    pub fn available_permits(&self) -> usize {
        self.connection_semaphore.available_permits()
    }
}

/// An accepted client with its capacity permit and tracking guard.
pub struct AcceptedConnection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    /// Decrements the active count when dropped.
    pub guard: ConnectionGuard,
    _permit: OwnedSemaphorePermit,
}
