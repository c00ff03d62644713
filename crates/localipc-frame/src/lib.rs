//! Decimal length-prefixed message framing for local IPC.
//!
//! Every message travels as:
//! - the payload length in ASCII decimal digits
//! - a single `-` delimiter byte
//! - exactly that many payload bytes
//!
//! The reader and writer keep their own buffers, so callers always see
//! whole frames no matter how the OS splits reads and writes.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, encoded_len, FrameConfig, DEFAULT_MAX_PAYLOAD, DELIMITER,
    MAX_LENGTH_DIGITS,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
