//! Classification of raw OS errors into the conditions the upper layers
//! act on.

use std::io::{self, ErrorKind};

/// True when the peer closed or broke the channel.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    ) || is_pipe_disconnect_code(err)
}

/// True when the endpoint exists in name only: nobody is listening yet.
pub fn is_not_ready(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::NotFound
    )
}

/// True when every pipe instance is currently taken by other clients.
#[cfg(windows)]
pub fn is_pipe_busy(err: &io::Error) -> bool {
    use windows_sys::Win32::Foundation::ERROR_PIPE_BUSY;

    err.raw_os_error() == Some(ERROR_PIPE_BUSY as i32)
}

/// True when every pipe instance is currently taken by other clients.
#[cfg(unix)]
pub fn is_pipe_busy(_err: &io::Error) -> bool {
    false
}

#[cfg(windows)]
fn is_pipe_disconnect_code(err: &io::Error) -> bool {
    use windows_sys::Win32::Foundation::{
        ERROR_BROKEN_PIPE, ERROR_NO_DATA, ERROR_PIPE_NOT_CONNECTED,
    };

    match err.raw_os_error() {
        Some(code) => {
            code == ERROR_BROKEN_PIPE as i32
                || code == ERROR_NO_DATA as i32
                || code == ERROR_PIPE_NOT_CONNECTED as i32
        }
        None => false,
    }
}

#[cfg(unix)]
fn is_pipe_disconnect_code(_err: &io::Error) -> bool {
    false
}
