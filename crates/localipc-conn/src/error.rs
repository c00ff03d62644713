use std::time::Duration;

use localipc_frame::FrameError;
use localipc_transport::TransportError;

/// Errors that can occur on a connection, a listener or a connector.
///
/// Callers usually only need three kinds: [`IpcError::is_timeout`],
/// [`IpcError::is_disconnect`], and everything else.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Value serialization/deserialization error.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Peer disconnected, or the connection was already closed locally.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// A blocking operation exceeded its allotted wait.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl IpcError {
    /// True for [`IpcError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// True when the channel is gone and the connection must be treated as
    /// closed.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Disconnected(_) => true,
            Self::Frame(FrameError::ConnectionClosed) => true,
            Self::Frame(FrameError::Io(err)) => localipc_transport::is_disconnect(err),
            Self::Transport(err) => err
                .io_source()
                .is_some_and(localipc_transport::is_disconnect),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IpcError>;
