//! Graceful shutdown coordination.
//!
//! A watch channel broadcasts the shutdown signal to every open stream, and
//! a counter of live streams lets the daemon wait for them to drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};

use crate::metrics;

/// Shutdown coordinator shared by the listener and every connection.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<ShutdownInner>,
}

struct ShutdownInner {
    shutdown_tx: watch::Sender<bool>,
    active_connections: AtomicU64,
    drained: Notify,
    next_conn_id: AtomicU64,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ShutdownInner {
                shutdown_tx,
                active_connections: AtomicU64::new(0),
                drained: Notify::new(),
                next_conn_id: AtomicU64::new(1),
            }),
        }
    }

    /// Tell every stream to wind down.
    pub fn shutdown(&self) {
        self.inner.shutdown_tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// A receiver that observes the shutdown flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    pub fn active_connections(&self) -> u64 {
        self.inner.active_connections.load(Ordering::Relaxed)
    }

    /// Count a new connection; the returned guard uncounts it on drop.
    pub fn register_connection(&self) -> ConnectionGuard {
        let id = self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let count = self.inner.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_active_connections(count);

        ConnectionGuard {
            coordinator: self.clone(),
            id,
        }
    }

    /// Resolve once no connections remain.
    pub async fn wait_for_drain(&self) {
        loop {
            // Register interest before reading the count so a concurrent
            // final unregister cannot slip between the two.
            let notified = self.inner.drained.notified();
            if self.active_connections() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn unregister_connection(&self) {
        let prev = self
            .inner
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));

        match prev {
            Ok(prev) => {
                let count = prev - 1;
                metrics::set_active_connections(count);
                if count == 0 {
                    self.inner.drained.notify_waiters();
                }
            }
            Err(_) => {
                tracing::error!("Connection unregistered with no active connections");
                metrics::set_active_connections(0);
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps one connection counted while alive.
pub struct ConnectionGuard {
    coordinator: ShutdownCoordinator,
    id: u64,
}

impl ConnectionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_shutdown(&self) -> bool {
        self.coordinator.is_shutdown()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.coordinator.subscribe()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.coordinator.unregister_connection();
    }
}
