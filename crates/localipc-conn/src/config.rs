use std::time::Duration;

use localipc_frame::DEFAULT_MAX_PAYLOAD;
use localipc_transport::DEFAULT_ENDPOINT_MODE;

/// Default wait for one `read`.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Default wait for a `write` to become possible.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default budget for establishing a client connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default pause between connection attempts while the server is not up.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Per-connection behaviour.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout used by `read`, `xread` and friends.
    pub read_timeout: Duration,
    /// Timeout used by `write` and `xwrite`.
    pub write_timeout: Duration,
    /// Largest accepted or sent payload in bytes.
    pub max_payload_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Client-side connection establishment.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Give up with a timeout once this much time has passed.
    pub timeout: Duration,
    /// Fixed pause between attempts while the endpoint is not ready.
    pub retry_interval: Duration,
    /// Configuration for the resulting connection.
    pub connection: ConnectionConfig,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            connection: ConnectionConfig::default(),
        }
    }
}

/// Server-side listener behaviour.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Mode applied to the endpoint file (Unix only).
    pub endpoint_mode: u32,
    /// Configuration for every accepted connection.
    pub connection: ConnectionConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            endpoint_mode: DEFAULT_ENDPOINT_MODE,
            connection: ConnectionConfig::default(),
        }
    }
}
