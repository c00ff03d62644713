use std::os::fd::RawFd;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// Unix domain socket transport.
///
/// Provides bind/accept/connect over filesystem-path UDS on Linux and macOS.
/// The kernel keeps the accept backlog, so one bound socket serves every
/// client. The socket file is removed again on `Drop`.
pub struct UnixDomainSocket {
    listener: UnixListener,
    file: SocketFile,
}

/// A socket file as it was created by [`UnixDomainSocket::bind`].
///
/// Remembers the device and inode so the path is only removed while it
/// still refers to that socket, not to one another server bound since.
#[derive(Debug, Clone)]
pub struct SocketFile {
    path: PathBuf,
    dev: u64,
    ino: u64,
}

impl SocketFile {
    /// The socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the socket file if it is still the one that was bound.
    ///
    /// Returns whether the file was removed.
    pub fn remove(&self) -> bool {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return false;
        };
        if !(metadata.file_type().is_socket()
            && metadata.dev() == self.dev
            && metadata.ino() == self.ino)
        {
            debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            return false;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = ?self.path, "cleaned up socket file");
                true
            }
            Err(err) => {
                debug!(path = ?self.path, error = %err, "failed to remove socket file");
                false
            }
        }
    }
}

impl UnixDomainSocket {
    /// Default permission mode for created socket paths.
    ///
    /// Connecting needs write permission on the socket file, so every local
    /// user gets write access while only the owner may read the metadata.
    pub const DEFAULT_SOCKET_MODE: u32 = crate::listener::DEFAULT_ENDPOINT_MODE;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(target_os = "macos")]
    const MAX_PATH_LEN: usize = 104;
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// The socket file is created at `path`. If the file already exists and is
    /// a socket, it is removed first (stale socket cleanup).
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen on a filesystem-path Unix domain socket with explicit mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Validate path length
        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        // Remove stale socket if it exists, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| TransportError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(TransportError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            TransportError::Bind {
                path: path.clone(),
                source: e,
            }
        })?;
        let created_metadata =
            std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;

        debug!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            file: SocketFile {
                path,
                dev: created_metadata.dev(),
                ino: created_metadata.ino(),
            },
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.file.path, "accepted connection");
        IpcStream::from_unix(stream)
    }

    /// Connect to a listening Unix domain socket (one attempt, no retry).
    pub fn connect(path: impl AsRef<Path>) -> Result<IpcStream> {
        let path = path.as_ref();
        let stream =
            std::os::unix::net::UnixStream::connect(path).map_err(|e| TransportError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "connected to unix domain socket");
        IpcStream::from_unix(stream)
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Identity of the bound socket file, for removing it from elsewhere
    /// (for example a signal handler) without racing a later bind.
    pub fn socket_file(&self) -> SocketFile {
        self.file.clone()
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

/// Wait for `events` on `fd` for at most `timeout`.
///
/// Hang-up and error conditions count as ready so the following I/O call
/// reports them.
pub(crate) fn poll_fd(fd: RawFd, events: libc::c_short, timeout: Duration) -> std::io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let deadline = Instant::now() + timeout;

    loop {
        // Round up so a sub-millisecond remainder still waits instead of
        // reporting a premature timeout.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let millis = remaining
            .as_nanos()
            .div_ceil(1_000_000)
            .min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `pfd` is a valid, initialised pollfd and the count is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(rc > 0);
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        self.file.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_bind_accept_connect() {
        let dir = std::env::temp_dir().join(format!("localipc-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("test.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        // Connect from another thread
        let path_clone = sock_path.clone();
        let handle = std::thread::spawn(move || {
            let mut client = UnixDomainSocket::connect(&path_clone).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        handle.join().unwrap();

        assert!(server.wait_readable(Duration::from_secs(1)).unwrap());
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        // Cleanup
        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bind_replaces_stale_socket() {
        let dir = std::env::temp_dir().join(format!("localipc-stale-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("stale.sock");

        // A bound-then-leaked listener leaves a socket file nobody serves.
        let stale = std::os::unix::net::UnixListener::bind(&sock_path).unwrap();
        drop(stale);
        assert!(sock_path.exists());

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        let path_clone = sock_path.clone();
        let handle = std::thread::spawn(move || UnixDomainSocket::connect(&path_clone).unwrap());
        let _server = listener.accept().unwrap();
        let _client = handle.join().unwrap();

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_connect_without_listener_is_not_ready() {
        let dir = std::env::temp_dir().join(format!("localipc-absent-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let err = UnixDomainSocket::connect(dir.join("absent.sock")).unwrap_err();
        match err {
            TransportError::Connect { source, .. } => assert!(crate::is_not_ready(&source)),
            other => panic!("unexpected error: {other}"),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_poll_fd_times_out_on_idle_socket() {
        use std::os::fd::AsRawFd;

        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let start = std::time::Instant::now();
        let ready = poll_fd(left.as_raw_fd(), libc::POLLIN, Duration::from_millis(50)).unwrap();
        assert!(!ready);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_socket_file_removes_only_its_own_socket() {
        let dir = std::env::temp_dir().join(format!("localipc-file-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("own.sock");

        let first = UnixDomainSocket::bind(&sock_path).unwrap();
        let stale = first.socket_file();
        assert_eq!(stale.path(), sock_path.as_path());

        // A second server takes over the path while the first is still alive.
        let second = UnixDomainSocket::bind(&sock_path).unwrap();
        assert!(!stale.remove(), "must not remove a socket bound by someone else");
        drop(first);
        assert!(sock_path.exists());

        assert!(second.socket_file().remove());
        assert!(!sock_path.exists());

        drop(second);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_poll_fd_deadline_holds_under_signals() {
        use std::os::fd::AsRawFd;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        extern "C" fn ignore(_: libc::c_int) {}

        // SAFETY: installs a handler that does nothing, so SIGUSR1 only
        // interrupts blocking calls instead of terminating the process.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = ignore as usize;
            libc::sigemptyset(&mut action.sa_mask);
            assert_eq!(
                libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut()),
                0
            );
        }

        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        // SAFETY: pthread_self has no preconditions.
        let target = unsafe { libc::pthread_self() };
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let signaller = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                // SAFETY: the target thread outlives this loop; it joins us.
                unsafe { libc::pthread_kill(target, libc::SIGUSR1) };
                std::thread::sleep(Duration::from_millis(20));
            }
        });

        let timeout = Duration::from_millis(200);
        let start = Instant::now();
        let ready = poll_fd(left.as_raw_fd(), libc::POLLIN, timeout).unwrap();
        let elapsed = start.elapsed();
        stop.store(true, Ordering::Relaxed);
        signaller.join().unwrap();

        assert!(!ready);
        assert!(elapsed >= timeout, "woke early after {elapsed:?}");
        assert!(
            elapsed < timeout + Duration::from_millis(150),
            "signals stretched the wait to {elapsed:?}"
        );
    }

    #[test]
    fn test_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UnixDomainSocket::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn test_bind_default_permissions_allow_local_writers() {
        let dir = std::env::temp_dir().join(format!("localipc-perms-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("perm.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o622);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bind_rejects_existing_non_socket_file() {
        let dir = std::env::temp_dir().join(format!("localipc-bind-file-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = UnixDomainSocket::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));

        let _ = std::fs::remove_file(&sock_path);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_drop_does_not_remove_replaced_path() {
        let dir = std::env::temp_dir().join(format!("localipc-drop-race-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("drop.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        // Replace path while listener is alive.
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_file(&sock_path);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
