//! Message-oriented local inter-process communication.
//!
//! localipc lets a server accept many concurrent clients on a named local
//! endpoint (a Unix domain socket, or a duplex named pipe on Windows) and
//! exchange discrete serialized messages with each of them.
//!
//! # Crate Structure
//!
//! - [`transport`]: endpoints, OS transports and readiness waits
//! - [`frame`]: `<length>-<payload>` framing over any byte stream
//! - [`conn`]: connections, streams of values, listeners and connectors
//!
//! The most used items of [`conn`] are re-exported at the top level.
//!
//! ```no_run
//! use localipc::{connect, listen, Connection};
//!
//! std::thread::spawn(|| {
//!     listen("/tmp/demo.sock", |mut conn: Connection| -> localipc::Result<()> {
//!         let name: String = conn.read()?;
//!         conn.write(&format!("hello, {name}"))
//!     })
//! });
//!
//! let mut client = connect("/tmp/demo.sock")?;
//! client.write(&"world")?;
//! let greeting: String = client.read()?;
//! println!("{greeting}");
//! # Ok::<(), localipc::IpcError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use localipc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use localipc_frame::*;
}

/// Re-export connection types.
pub mod conn {
    pub use localipc_conn::*;
}

pub use localipc_conn::{
    connect, connect_with_config, listen, ConnectConfig, Connection, ConnectionConfig, IpcError,
    Listener, ListenerConfig, ListenerStats, Result, StreamItem, XRead,
};
pub use localipc_transport::Endpoint;
