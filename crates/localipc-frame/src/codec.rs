use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Separates the decimal length field from the payload.
pub const DELIMITER: u8 = b'-';

/// Longest accepted length field; `usize::MAX` has 20 decimal digits.
pub const MAX_LENGTH_DIGITS: usize = 20;

/// Default maximum payload size: 64 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Total wire size of a frame carrying `payload_len` bytes.
pub fn encoded_len(payload_len: usize) -> usize {
    decimal_digits(payload_len) + 1 + payload_len
}

/// Encode a payload into the wire format, appending to `dst`.
///
/// Wire format:
/// ```text
/// ┌────────────────────┬─────┬──────────────────┐
/// │ Length             │ '-' │ Payload          │
/// │ (ASCII decimal)    │     │ (Length bytes)   │
/// └────────────────────┴─────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    let header = payload.len().to_string();
    dst.reserve(header.len() + 1 + payload.len());
    dst.put_slice(header.as_bytes());
    dst.put_u8(DELIMITER);
    dst.put_slice(payload);
}

/// Decode one frame from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet;
/// the buffer is left untouched in that case. On success, consumes exactly
/// one frame and leaves any pipelined bytes behind it in place.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    let Some((header_len, payload_len)) = parse_header(src)? else {
        return Ok(None); // Need more data
    };

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = header_len + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None); // Need more data
    }

    src.advance(header_len);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Parse `<digits>-` at the start of `src`.
///
/// Returns the header length (digits plus delimiter) and the declared
/// payload length, or `None` while the delimiter has not arrived.
fn parse_header(src: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut len: usize = 0;

    for (idx, &byte) in src.iter().enumerate() {
        match byte {
            DELIMITER if idx == 0 => {
                return Err(FrameError::InvalidLength("missing length digits"));
            }
            DELIMITER => return Ok(Some((idx + 1, len))),
            b'0'..=b'9' => {
                if idx >= MAX_LENGTH_DIGITS {
                    return Err(FrameError::InvalidLength("length field too long"));
                }
                len = len
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(usize::from(byte - b'0')))
                    .ok_or(FrameError::InvalidLength("length overflows usize"))?;
            }
            other => return Err(FrameError::UnexpectedByte(other)),
        }
    }

    Ok(None)
}

fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 64 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
