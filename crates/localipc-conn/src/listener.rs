use std::convert::Infallible;
use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use localipc_transport::{Endpoint, EndpointCleanup, IpcListener};
use tracing::{debug, error, info, warn};

use crate::config::ListenerConfig;
use crate::connection::Connection;
use crate::error::Result;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Connection counters for a running listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Connections accepted since bind.
    pub accepted: AtomicU64,
    /// Handlers currently running.
    pub active: AtomicU64,
    /// Handlers that returned an error or panicked.
    pub failed: AtomicU64,
}

impl ListenerStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// A bound endpoint that hands every accepted client to a handler running
/// on its own thread.
pub struct Listener {
    inner: IpcListener,
    config: ListenerConfig,
    stats: Arc<ListenerStats>,
    next_id: u64,
}

impl Listener {
    /// Bind `endpoint` with default settings.
    pub fn bind(endpoint: impl Into<Endpoint>) -> Result<Self> {
        Self::bind_with_config(endpoint, ListenerConfig::default())
    }

    /// Bind `endpoint` with explicit settings.
    pub fn bind_with_config(endpoint: impl Into<Endpoint>, config: ListenerConfig) -> Result<Self> {
        let endpoint = endpoint.into();
        let inner = IpcListener::bind_with_mode(&endpoint, config.endpoint_mode)?;
        info!(
            endpoint = %endpoint,
            transport = inner.transport_name(),
            "listening"
        );

        Ok(Self {
            inner,
            config,
            stats: Arc::new(ListenerStats::default()),
            next_id: 1,
        })
    }

    /// Block until the next client connects.
    pub fn accept(&mut self) -> Result<Connection> {
        let stream = self.inner.accept()?;
        let id = format!("conn-{}", self.next_id);
        self.next_id += 1;
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        debug!(connection = %id, "accepted connection");
        Connection::from_stream(id, stream, self.config.connection.clone())
    }

    /// Accept clients forever, running `handler` on a dedicated thread for
    /// each one.
    ///
    /// A handler that returns an error or panics only ends its own
    /// connection; the loop keeps accepting. The connection is closed when
    /// the handler finishes, whatever the outcome.
    pub fn serve<H, E>(mut self, handler: H) -> Result<Infallible>
    where
        H: Fn(Connection) -> std::result::Result<(), E> + Send + Sync + 'static,
        E: Display,
    {
        let handler = Arc::new(handler);

        loop {
            let conn = match self.accept() {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(endpoint = %self.path().display(), error = %err, "accept failed");
                    thread::sleep(ACCEPT_BACKOFF);
                    continue;
                }
            };

            let id = conn.id().to_string();
            let handler = Arc::clone(&handler);
            let guard = ActiveGuard::new(Arc::clone(&self.stats), id.clone());

            let spawned = thread::Builder::new()
                .name(format!("localipc-{id}"))
                .spawn(move || {
                    let guard = guard;
                    if let Err(err) = handler(conn) {
                        error!(connection = %guard.id, error = %err, "handler failed");
                        guard.stats.failed.fetch_add(1, Ordering::Relaxed);
                    }
                });

            if let Err(err) = spawned {
                error!(connection = %id, error = %err, "failed to spawn handler thread");
            }
        }
    }

    /// The bound endpoint path.
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Handle that removes the endpoint file, for use from a shutdown path
    /// that never gets to drop the listener.
    pub fn cleanup(&self) -> EndpointCleanup {
        self.inner.cleanup()
    }

    /// Shared counters, readable while [`Listener::serve`] runs.
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("inner", &self.inner)
            .field("accepted", &self.stats.accepted())
            .finish()
    }
}

/// Bind `endpoint` and serve every client with `handler`.
///
/// Only returns on a bind failure.
pub fn listen<H, E>(endpoint: impl Into<Endpoint>, handler: H) -> Result<Infallible>
where
    H: Fn(Connection) -> std::result::Result<(), E> + Send + Sync + 'static,
    E: Display,
{
    Listener::bind(endpoint)?.serve(handler)
}

/// Tracks one running handler; also notices handler panics.
struct ActiveGuard {
    stats: Arc<ListenerStats>,
    id: String,
}

impl ActiveGuard {
    fn new(stats: Arc<ListenerStats>, id: String) -> Self {
        stats.active.fetch_add(1, Ordering::Relaxed);
        Self { stats, id }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(connection = %self.id, "handler panicked");
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        debug!(
            connection = %self.id,
            active = self.stats.active(),
            "handler finished"
        );
    }
}
