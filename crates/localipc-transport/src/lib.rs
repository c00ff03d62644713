//! Local IPC transport abstraction.
//!
//! Provides one interface over the two local transport families:
//! - Unix domain sockets (Linux/macOS)
//! - Duplex named pipes (Windows)
//!
//! This is the lowest layer of localipc. Everything else builds on top of
//! the [`IpcStream`] and [`IpcListener`] types provided here.

#[cfg(not(any(unix, windows)))]
compile_error!("localipc requires Unix domain sockets or Windows named pipes");

pub mod classify;
pub mod endpoint;
pub mod error;
pub mod listener;
pub mod traits;

#[cfg(windows)]
pub mod pipe;
#[cfg(unix)]
pub mod uds;

pub use classify::{is_disconnect, is_not_ready, is_pipe_busy};
pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use listener::{connect_once, EndpointCleanup, IpcListener, DEFAULT_ENDPOINT_MODE};
pub use traits::IpcStream;

#[cfg(windows)]
pub use pipe::{wait_for_instance, NamedPipeListener};
#[cfg(unix)]
pub use uds::{SocketFile, UnixDomainSocket};
