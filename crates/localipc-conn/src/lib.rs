//! Message-oriented connections over local IPC.
//!
//! This is the "just works" layer. Bind a [`Listener`] and hand each client
//! to a handler thread, or [`connect`] as a client, then exchange serialized
//! values with [`Connection::read`] and [`Connection::write`]. Streams of
//! values go through [`Connection::xwrite`] and [`Connection::xread`].
//!
//! Every blocking call is bounded by a timeout. Failures fall into three
//! kinds: [`IpcError::is_timeout`], [`IpcError::is_disconnect`], and
//! everything else.

pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod listener;
pub mod stream;

pub use config::{
    ConnectConfig, ConnectionConfig, ListenerConfig, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_READ_TIMEOUT, DEFAULT_RETRY_INTERVAL, DEFAULT_WRITE_TIMEOUT,
};
pub use connection::Connection;
pub use connector::{connect, connect_with_config};
pub use error::{IpcError, Result};
pub use listener::{listen, Listener, ListenerStats};
pub use stream::{StreamItem, XRead};
