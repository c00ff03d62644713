use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use localipc_transport::{connect_once, Endpoint, TransportError};
use tracing::{debug, trace, warn};

use crate::config::ConnectConfig;
use crate::connection::Connection;
use crate::error::{IpcError, Result};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Connect to a listening endpoint with default settings.
///
/// Keeps retrying while the endpoint does not exist yet or refuses
/// connections, for up to 30 seconds.
pub fn connect(endpoint: impl Into<Endpoint>) -> Result<Connection> {
    connect_with_config(endpoint, &ConnectConfig::default())
}

/// Connect with explicit retry and connection settings.
///
/// Not-ready errors (no endpoint yet, refused, or every pipe instance busy)
/// are retried until `config.timeout` elapses, then reported as
/// [`IpcError::Timeout`]. Any other failure is returned immediately.
pub fn connect_with_config(
    endpoint: impl Into<Endpoint>,
    config: &ConnectConfig,
) -> Result<Connection> {
    let endpoint = endpoint.into();
    let deadline = Instant::now() + config.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match connect_once(&endpoint) {
            Ok(stream) => {
                let id = format!("client-{}", NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed));
                debug!(endpoint = %endpoint, connection = %id, attempts, "connected");
                return Connection::from_stream(id, stream, config.connection.clone());
            }
            Err(err) if is_retryable(&err) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    warn!(endpoint = %endpoint, attempts, "gave up connecting");
                    return Err(IpcError::Timeout(config.timeout));
                }
                trace!(endpoint = %endpoint, attempts, error = %err, "endpoint not ready");
                wait_before_retry(&endpoint, &err, remaining.min(config.retry_interval));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn is_retryable(err: &TransportError) -> bool {
    match err {
        TransportError::Connect { source, .. } => {
            localipc_transport::is_not_ready(source) || localipc_transport::is_pipe_busy(source)
        }
        _ => false,
    }
}

#[cfg(windows)]
fn wait_before_retry(endpoint: &Endpoint, err: &TransportError, wait: Duration) {
    let busy = matches!(
        err,
        TransportError::Connect { source, .. } if localipc_transport::is_pipe_busy(source)
    );
    if busy {
        // A free instance wakes the wait early; a failed wait falls through
        // to the next attempt.
        if let Err(err) = localipc_transport::wait_for_instance(endpoint.path(), wait) {
            trace!(endpoint = %endpoint, error = %err, "pipe wait failed");
        }
        return;
    }
    thread::sleep(wait);
}

#[cfg(unix)]
fn wait_before_retry(_endpoint: &Endpoint, _err: &TransportError, wait: Duration) {
    thread::sleep(wait);
}
