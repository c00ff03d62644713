use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;
use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_BROKEN_PIPE, ERROR_PIPE_CONNECTED, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{FILE_FLAG_FIRST_PIPE_INSTANCE, PIPE_ACCESS_DUPLEX};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, PeekNamedPipe, WaitNamedPipeW, PIPE_READMODE_BYTE,
    PIPE_TYPE_BYTE, PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
};

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// In/out buffer size requested for each pipe instance.
const BUFFER_SIZE: u32 = 4096;
/// Default `WaitNamedPipe` budget advertised by the server, in milliseconds.
const DEFAULT_WAIT_MS: u32 = 30_000;
/// Sleep between `PeekNamedPipe` polls while waiting for data.
const PEEK_INTERVAL: Duration = Duration::from_millis(10);

/// Duplex named pipe transport.
///
/// A pipe instance serves exactly one client, so the listener always holds
/// one unconnected instance and creates the next one right after each
/// successful accept.
pub struct NamedPipeListener {
    path: PathBuf,
    wide: Vec<u16>,
    next: OwnedHandle,
}

impl NamedPipeListener {
    /// Create the first instance of the pipe at `path` (`\\.\pipe\<name>`).
    ///
    /// Fails if another server already owns an instance of this name.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let wide = to_wide(path.as_os_str());
        let next = create_instance(&wide, true).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;

        debug!(?path, "listening on named pipe");

        Ok(Self { path, wide, next })
    }

    /// Wait for a client on the current instance (blocking).
    pub fn accept(&mut self) -> Result<IpcStream> {
        let handle = self.next.as_raw_handle() as HANDLE;
        // SAFETY: `handle` is an owned, open pipe instance; no OVERLAPPED
        // structure is used because the instance was created in blocking mode.
        let ok = unsafe { ConnectNamedPipe(handle, std::ptr::null_mut()) };
        if ok == 0 {
            // SAFETY: reads the calling thread's last-error value.
            let code = unsafe { GetLastError() };
            if code != ERROR_PIPE_CONNECTED {
                let err = std::io::Error::from_raw_os_error(code as i32);
                // The instance is unusable now (typically the client already
                // hung up), so retire it before the next accept.
                self.replace_instance();
                return Err(TransportError::Accept(err));
            }
        }

        let fresh = create_instance(&self.wide, false).map_err(TransportError::Accept)?;
        let connected = std::mem::replace(&mut self.next, fresh);
        debug!(path = ?self.path, "accepted connection");

        Ok(IpcStream::from_pipe(File::from(connected)))
    }

    fn replace_instance(&mut self) {
        match create_instance(&self.wide, false) {
            Ok(fresh) => {
                drop(std::mem::replace(&mut self.next, fresh));
                debug!(path = ?self.path, "replaced failed pipe instance");
            }
            Err(err) => {
                debug!(path = ?self.path, error = %err, "failed to replace pipe instance");
            }
        }
    }

    /// Open the pipe from the client side (one attempt, no retry).
    pub fn connect(path: impl AsRef<Path>) -> Result<IpcStream> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| TransportError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "connected to named pipe");
        Ok(IpcStream::from_pipe(file))
    }

    /// The pipe path this listener serves.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "named-pipe"
    }
}

/// Block in `WaitNamedPipeW` until an instance of `path` is free.
///
/// Returns `Ok(false)` when the wait expired without a free instance.
pub fn wait_for_instance(path: &Path, timeout: Duration) -> Result<bool> {
    let wide = to_wide(path.as_os_str());
    let millis = timeout.as_millis().clamp(1, u128::from(u32::MAX - 1)) as u32;
    // SAFETY: `wide` is a NUL-terminated UTF-16 string that outlives the call.
    let ok = unsafe { WaitNamedPipeW(wide.as_ptr(), millis) };
    Ok(ok != 0)
}

/// Poll `PeekNamedPipe` until data is available, the pipe broke, or the
/// timeout elapsed.
pub(crate) fn wait_readable(file: &File, timeout: Duration) -> Result<bool> {
    let handle = file.as_raw_handle() as HANDLE;
    let deadline = Instant::now() + timeout;

    loop {
        let mut available: u32 = 0;
        // SAFETY: `handle` is an open pipe handle; only the byte count is
        // requested, so no data buffer is passed.
        let ok = unsafe {
            PeekNamedPipe(
                handle,
                std::ptr::null_mut(),
                0,
                std::ptr::null_mut(),
                &mut available,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            // SAFETY: reads the calling thread's last-error value.
            let code = unsafe { GetLastError() };
            if code == ERROR_BROKEN_PIPE {
                // Let the read observe the hang-up as end-of-stream.
                return Ok(true);
            }
            return Err(std::io::Error::from_raw_os_error(code as i32).into());
        }
        if available > 0 {
            return Ok(true);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        std::thread::sleep(PEEK_INTERVAL.min(deadline - now));
    }
}

fn create_instance(wide: &[u16], first: bool) -> std::io::Result<OwnedHandle> {
    let mut open_mode = PIPE_ACCESS_DUPLEX;
    if first {
        open_mode |= FILE_FLAG_FIRST_PIPE_INSTANCE;
    }

    // SAFETY: `wide` is NUL-terminated; a null security descriptor selects
    // the default DACL.
    let handle = unsafe {
        CreateNamedPipeW(
            wide.as_ptr(),
            open_mode,
            PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
            PIPE_UNLIMITED_INSTANCES,
            BUFFER_SIZE,
            BUFFER_SIZE,
            DEFAULT_WAIT_MS,
            std::ptr::null(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `handle` is a freshly created, valid handle owned by nobody else.
    Ok(unsafe { OwnedHandle::from_raw_handle(handle as RawHandle) })
}

fn to_wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(std::iter::once(0)).collect()
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    fn pipe_path(tag: &str) -> PathBuf {
        PathBuf::from(format!(
            r"\\.\pipe\localipc-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[test]
    fn bind_accept_connect() {
        let path = pipe_path("basic");
        let mut listener = NamedPipeListener::bind(&path).unwrap();

        let path_clone = path.clone();
        let handle = std::thread::spawn(move || {
            let mut client = NamedPipeListener::connect(&path_clone).unwrap();
            client.write_all(b"hello").unwrap();
            client
        });

        let mut server = listener.accept().unwrap();
        let _client = handle.join().unwrap();

        assert!(server.wait_readable(Duration::from_secs(1)).unwrap());
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn accepts_clients_one_after_another() {
        let path = pipe_path("chain");
        let mut listener = NamedPipeListener::bind(&path).unwrap();

        for expected in [b'a', b'b'] {
            let path_clone = path.clone();
            let handle = std::thread::spawn(move || {
                let mut client = NamedPipeListener::connect(&path_clone).unwrap();
                client.write_all(&[expected]).unwrap();
                client
            });

            let mut server = listener.accept().unwrap();
            let _client = handle.join().unwrap();

            assert!(server.wait_readable(Duration::from_secs(1)).unwrap());
            let mut buf = [0u8; 1];
            server.read_exact(&mut buf).unwrap();
            assert_eq!(buf[0], expected);
        }
    }

    #[test]
    fn accept_recovers_after_client_hung_up_early() {
        let path = pipe_path("hangup");
        let mut listener = NamedPipeListener::bind(&path).unwrap();

        // The client connects and leaves before the server calls accept.
        drop(NamedPipeListener::connect(&path).unwrap());
        let _ = listener.accept();

        let path_clone = path.clone();
        let handle = std::thread::spawn(move || {
            let mut client = NamedPipeListener::connect(&path_clone).unwrap();
            client.write_all(b"ok").unwrap();
            client
        });

        let mut server = listener.accept().expect("next client should be served");
        let _client = handle.join().unwrap();

        assert!(server.wait_readable(Duration::from_secs(1)).unwrap());
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ok");
    }

    #[test]
    fn second_server_on_same_name_fails() {
        let path = pipe_path("first");
        let _listener = NamedPipeListener::bind(&path).unwrap();
        assert!(matches!(
            NamedPipeListener::bind(&path),
            Err(TransportError::Bind { .. })
        ));
    }
}
