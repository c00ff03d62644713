use std::path::Path;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::traits::IpcStream;

/// Default access mode applied to a freshly bound endpoint file.
///
/// Only meaningful on Unix; the pipe transport uses the default DACL.
pub const DEFAULT_ENDPOINT_MODE: u32 = 0o622;

/// A bound local endpoint that accepts client streams.
///
/// Selects the platform transport at compile time: a Unix domain socket
/// with a kernel backlog, or a chain of single-client named pipe instances.
pub struct IpcListener {
    inner: IpcListenerInner,
}

enum IpcListenerInner {
    #[cfg(unix)]
    Unix(crate::uds::UnixDomainSocket),
    #[cfg(windows)]
    Pipe(crate::pipe::NamedPipeListener),
}

impl IpcListener {
    /// Bind `endpoint` with [`DEFAULT_ENDPOINT_MODE`].
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        Self::bind_with_mode(endpoint, DEFAULT_ENDPOINT_MODE)
    }

    /// Bind `endpoint`, applying `mode` to the endpoint file where the
    /// platform has one.
    pub fn bind_with_mode(endpoint: &Endpoint, mode: u32) -> Result<Self> {
        #[cfg(unix)]
        {
            let socket = crate::uds::UnixDomainSocket::bind_with_mode(endpoint.path(), mode)?;
            Ok(Self {
                inner: IpcListenerInner::Unix(socket),
            })
        }

        #[cfg(windows)]
        {
            let _ = mode;
            let pipe = crate::pipe::NamedPipeListener::bind(endpoint.path())?;
            Ok(Self {
                inner: IpcListenerInner::Pipe(pipe),
            })
        }
    }

    /// Block until the next client connects.
    pub fn accept(&mut self) -> Result<IpcStream> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcListenerInner::Unix(socket) => socket.accept(),
            #[cfg(windows)]
            IpcListenerInner::Pipe(pipe) => pipe.accept(),
        }
    }

    /// The bound endpoint path.
    pub fn path(&self) -> &Path {
        match &self.inner {
            #[cfg(unix)]
            IpcListenerInner::Unix(socket) => socket.path(),
            #[cfg(windows)]
            IpcListenerInner::Pipe(pipe) => pipe.path(),
        }
    }

    /// A handle that removes this endpoint's file later, as long as the path
    /// still refers to this listener's socket.
    pub fn cleanup(&self) -> EndpointCleanup {
        match &self.inner {
            #[cfg(unix)]
            IpcListenerInner::Unix(socket) => EndpointCleanup {
                file: socket.socket_file(),
            },
            #[cfg(windows)]
            IpcListenerInner::Pipe(_) => EndpointCleanup {},
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            IpcListenerInner::Unix(socket) => socket.transport_name(),
            #[cfg(windows)]
            IpcListenerInner::Pipe(pipe) => pipe.transport_name(),
        }
    }
}

impl std::fmt::Debug for IpcListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcListener")
            .field("type", &self.transport_name())
            .field("path", &self.path())
            .finish()
    }
}

/// Deferred removal of a bound endpoint file.
///
/// Named pipes vanish with their last handle, so on Windows this does
/// nothing.
#[derive(Debug, Clone)]
pub struct EndpointCleanup {
    #[cfg(unix)]
    file: crate::uds::SocketFile,
}

impl EndpointCleanup {
    /// Remove the endpoint file if it is still ours. Returns whether a file
    /// was removed.
    pub fn run(&self) -> bool {
        #[cfg(unix)]
        {
            self.file.remove()
        }

        #[cfg(windows)]
        {
            false
        }
    }
}

/// One connection attempt to `endpoint` on the platform transport.
pub fn connect_once(endpoint: &Endpoint) -> Result<IpcStream> {
    #[cfg(unix)]
    {
        crate::uds::UnixDomainSocket::connect(endpoint.path())
    }

    #[cfg(windows)]
    {
        crate::pipe::NamedPipeListener::connect(endpoint.path())
    }
}
