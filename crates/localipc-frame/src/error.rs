/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length field before the `-` delimiter is malformed.
    #[error("invalid frame length field: {0}")]
    InvalidLength(&'static str),

    /// A byte other than an ASCII digit appeared before the delimiter.
    #[error("unexpected byte 0x{0:02x} in frame length field")]
    UnexpectedByte(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
