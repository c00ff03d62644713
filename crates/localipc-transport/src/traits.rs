use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A connected local IPC stream implementing `Read` and `Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// On Unix, this wraps a non-blocking Unix domain socket stream.
/// On Windows, this wraps a byte-mode named pipe handle.
///
/// Readiness is queried with [`IpcStream::wait_readable`] and
/// [`IpcStream::wait_writable`]; callers read or write only after a wait
/// reports ready, which is how timeouts are enforced on both transports.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(windows)]
    Pipe(std::fs::File),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
            #[cfg(windows)]
            IpcStreamInner::Pipe(file) => file.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
            #[cfg(windows)]
            IpcStreamInner::Pipe(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
            #[cfg(windows)]
            IpcStreamInner::Pipe(file) => file.flush(),
        }
    }
}

impl IpcStream {
    /// Create an IpcStream from a Unix domain socket stream.
    ///
    /// The socket is switched to non-blocking mode; blocking is done in
    /// the readiness waits instead.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            inner: IpcStreamInner::Unix(stream),
        })
    }

    /// Create a connected, unnamed pair of streams.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left)?, Self::from_unix(right)?))
    }

    /// Create an IpcStream from a connected named pipe handle.
    #[cfg(windows)]
    pub(crate) fn from_pipe(file: std::fs::File) -> Self {
        Self {
            inner: IpcStreamInner::Pipe(file),
        }
    }

    /// Wait until at least one byte can be read, or the peer hung up.
    ///
    /// Returns `Ok(false)` when `timeout` elapses first. A zero timeout
    /// polls without blocking.
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                use std::os::fd::AsRawFd;
                crate::uds::poll_fd(stream.as_raw_fd(), libc::POLLIN, timeout).map_err(Into::into)
            }
            #[cfg(windows)]
            IpcStreamInner::Pipe(file) => crate::pipe::wait_readable(file, timeout),
        }
    }

    /// Wait until a write can make progress.
    ///
    /// Pipe writes block inside the OS call, so the pipe transport always
    /// reports ready.
    pub fn wait_writable(&self, timeout: Duration) -> Result<bool> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                use std::os::fd::AsRawFd;
                crate::uds::poll_fd(stream.as_raw_fd(), libc::POLLOUT, timeout).map_err(Into::into)
            }
            #[cfg(windows)]
            IpcStreamInner::Pipe(_) => {
                let _ = timeout;
                Ok(true)
            }
        }
    }

    /// Shut down both directions so the peer observes end-of-stream even
    /// if another clone of this handle is still alive.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => match stream.shutdown(std::net::Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(err.into()),
            },
            #[cfg(windows)]
            IpcStreamInner::Pipe(_) => Ok(()),
        }
    }

    /// Try to clone this stream (creates a new OS handle).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                let cloned = stream.try_clone()?;
                Self::from_unix(cloned)
            }
            #[cfg(windows)]
            IpcStreamInner::Pipe(file) => Ok(Self::from_pipe(file.try_clone()?)),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => "unix-domain-socket",
            #[cfg(windows)]
            IpcStreamInner::Pipe(_) => "named-pipe",
        }
    }

    /// Get the credentials of the connected peer (Linux only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            IpcStreamInner::Unix(stream) => stream.as_raw_fd(),
        };

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open Unix socket descriptor owned by this process.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
