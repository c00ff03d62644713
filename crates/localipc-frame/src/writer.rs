use std::io::{ErrorKind, Write};

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Encoded frames are queued in an internal buffer and pushed out with as
/// many OS writes as it takes. If a caller gives up midway (for example on
/// a timeout), the unsent tail stays queued and goes out ahead of the next
/// frame, so the peer never sees a torn frame followed by a fresh one.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send a payload (blocking until fully written).
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.queue(payload)?;

        while self.pending() > 0 {
            match self.write_some() {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Encode a payload behind any bytes still waiting to be written.
    pub fn queue(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        encode_frame(payload, &mut self.buf);
        trace!(len = payload.len(), pending = self.buf.len(), "queued frame");
        Ok(())
    }

    /// Perform one write of queued bytes; returns how many were accepted.
    ///
    /// Errors, including `WouldBlock`, are returned as-is and leave the
    /// queue intact.
    pub fn write_some(&mut self) -> std::io::Result<usize> {
        if self.buf.is_empty() {
            return Ok(0);
        }
        let written = self.inner.write(&self.buf)?;
        self.buf.advance(written);
        Ok(written)
    }

    /// Number of queued bytes not yet accepted by the stream.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame encoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
