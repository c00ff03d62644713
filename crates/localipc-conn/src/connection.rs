use std::fmt;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use bytes::Bytes;
use localipc_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use localipc_transport::{IpcStream, TransportError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{IpcError, Result};

/// One open duplex channel carrying discrete serialized messages.
///
/// A connection has exactly one owner at a time; it performs no internal
/// locking. Once closed (explicitly, on drop, or after the peer went away)
/// every further read or write fails with [`IpcError::Disconnected`].
pub struct Connection {
    id: String,
    io: Option<ConnectionIo>,
    config: ConnectionConfig,
}

struct ConnectionIo {
    reader: FrameReader<IpcStream>,
    writer: FrameWriter<IpcStream>,
}

impl Connection {
    /// Wrap a connected transport stream.
    pub fn from_stream(
        id: impl Into<String>,
        stream: IpcStream,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let frame_config = FrameConfig {
            max_payload_size: config.max_payload_size,
        };

        let io = ConnectionIo {
            reader: FrameReader::with_config(reader_stream, frame_config.clone()),
            writer: FrameWriter::with_config(stream, frame_config),
        };

        Ok(Self {
            id: id.into(),
            io: Some(io),
            config,
        })
    }

    /// Identifier used in logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// False once the connection has been closed for any reason.
    pub fn is_open(&self) -> bool {
        self.io.is_some()
    }

    /// Current connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Receive one value, waiting up to the configured read timeout.
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.read_with_timeout(self.config.read_timeout)
    }

    /// Receive one value, waiting up to `timeout` for the whole frame.
    ///
    /// Bytes that arrived before a timeout stay buffered, so retrying
    /// resumes the same frame.
    pub fn read_with_timeout<T: DeserializeOwned>(&mut self, timeout: Duration) -> Result<T> {
        let payload = self.read_bytes_with_timeout(timeout)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Receive one raw frame payload, waiting up to the configured read timeout.
    pub fn read_bytes(&mut self) -> Result<Bytes> {
        self.read_bytes_with_timeout(self.config.read_timeout)
    }

    /// Receive one raw frame payload, waiting up to `timeout`.
    pub fn read_bytes_with_timeout(&mut self, timeout: Duration) -> Result<Bytes> {
        let result = match self.io.as_mut() {
            Some(io) => io.read_frame(timeout),
            None => Err(closed()),
        };
        if let Err(err) = &result {
            if is_desync(err) && self.io.is_some() {
                warn!(connection = %self.id, error = %err, "malformed frame header; closing");
                self.close();
            }
        }
        self.settle(result)
    }

    /// Send one value, waiting up to the configured write timeout.
    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.write_with_timeout(value, self.config.write_timeout)
    }

    /// Send one value, waiting up to `timeout` for the stream to accept it.
    pub fn write_with_timeout<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
        timeout: Duration,
    ) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.write_bytes_with_timeout(&payload, timeout)
    }

    /// Send one raw payload, waiting up to the configured write timeout.
    pub fn write_bytes(&mut self, payload: &[u8]) -> Result<()> {
        self.write_bytes_with_timeout(payload, self.config.write_timeout)
    }

    /// Send one raw payload, waiting up to `timeout`.
    ///
    /// On timeout the unsent tail of the frame stays queued and is written
    /// ahead of the next frame.
    pub fn write_bytes_with_timeout(&mut self, payload: &[u8], timeout: Duration) -> Result<()> {
        let result = match self.io.as_mut() {
            Some(io) => io.write_frame(payload, timeout),
            None => Err(closed()),
        };
        self.settle(result)
    }

    /// Non-blocking check for at least one received byte.
    ///
    /// A hang-up by the peer also counts, since the next read will report it.
    pub fn is_readable(&self) -> bool {
        let Some(io) = self.io.as_ref() else {
            return false;
        };
        if !io.reader.buffered().is_empty() {
            return true;
        }
        match io.reader.get_ref().wait_readable(Duration::ZERO) {
            Ok(ready) => ready,
            Err(err) => {
                debug!(connection = %self.id, error = %err, "readiness poll failed");
                false
            }
        }
    }

    /// Credentials of the connected peer as `(uid, gid, pid)`, where the
    /// platform exposes them.
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        self.io
            .as_ref()
            .and_then(|io| io.reader.get_ref().peer_credentials())
    }

    /// Release the underlying handle. Calling it again does nothing.
    pub fn close(&mut self) {
        if let Some(io) = self.io.take() {
            if let Err(err) = io.reader.get_ref().shutdown() {
                trace!(connection = %self.id, error = %err, "shutdown on close failed");
            }
            drop(io);
            debug!(connection = %self.id, "connection closed");
        }
    }

    /// Drop the handle after the peer went away.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_disconnect() && self.io.is_some() {
                debug!(connection = %self.id, error = %err, "peer disconnected");
                self.close();
            }
        }
        result
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

impl ConnectionIo {
    fn read_frame(&mut self, timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(payload) = self.reader.try_decode()? {
                return Ok(payload);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.reader.get_ref().wait_readable(remaining)? {
                return Err(IpcError::Timeout(timeout));
            }

            match self.reader.fill() {
                Ok(0) => {
                    return Err(IpcError::Disconnected(
                        "peer closed the connection".to_string(),
                    ))
                }
                Ok(_) => {}
                Err(err) if is_retryable(&err) => continue,
                Err(err) if localipc_transport::is_disconnect(&err) => {
                    return Err(IpcError::Disconnected(err.to_string()))
                }
                Err(err) => return Err(TransportError::Io(err).into()),
            }
        }
    }

    fn write_frame(&mut self, payload: &[u8], timeout: Duration) -> Result<()> {
        self.writer.queue(payload)?;
        let deadline = Instant::now() + timeout;

        while self.writer.pending() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.writer.get_ref().wait_writable(remaining)? {
                return Err(IpcError::Timeout(timeout));
            }

            match self.writer.write_some() {
                Ok(0) => {
                    return Err(IpcError::Disconnected(
                        "peer stopped accepting data".to_string(),
                    ))
                }
                Ok(_) => {}
                Err(err) if is_retryable(&err) => continue,
                Err(err) if localipc_transport::is_disconnect(&err) => {
                    return Err(IpcError::Disconnected(err.to_string()))
                }
                Err(err) => return Err(TransportError::Io(err).into()),
            }
        }

        self.writer.flush()?;
        Ok(())
    }
}

fn is_retryable(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// A bad length header leaves the receive stream at an unknown offset.
fn is_desync(err: &IpcError) -> bool {
    matches!(
        err,
        IpcError::Frame(
            FrameError::InvalidLength(_)
                | FrameError::UnexpectedByte(_)
                | FrameError::PayloadTooLarge { .. }
        )
    )
}

fn closed() -> IpcError {
    IpcError::Disconnected("connection is closed".to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::thread;

    use serde::Deserialize;

    use super::*;

    fn pair() -> (Connection, Connection) {
        let (left, right) = IpcStream::pair().expect("stream pair should open");
        (
            Connection::from_stream("left", left, ConnectionConfig::default())
                .expect("left connection"),
            Connection::from_stream("right", right, ConnectionConfig::default())
                .expect("right connection"),
        )
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Job {
        name: String,
        attempts: u32,
    }

    #[test]
    fn write_then_read_value() {
        let (mut left, mut right) = pair();
        let job = Job {
            name: "compile".to_string(),
            attempts: 3,
        };

        left.write(&job).expect("write should succeed");
        let received: Job = right.read().expect("read should succeed");
        assert_eq!(received, job);
    }

    #[test]
    fn empty_payload_round_trips() {
        let (mut left, mut right) = pair();
        left.write_bytes(b"").expect("write should succeed");
        let payload = right.read_bytes().expect("read should succeed");
        assert!(payload.is_empty());
    }

    #[test]
    fn messages_arrive_in_send_order() {
        let (mut left, mut right) = pair();
        for i in 0..50u32 {
            left.write(&i).expect("write should succeed");
        }
        for i in 0..50u32 {
            let got: u32 = right.read().expect("read should succeed");
            assert_eq!(got, i);
        }
    }

    #[test]
    fn large_message_crosses_partial_reads_and_writes() {
        let (mut left, mut right) = pair();
        let payload = vec![0x42u8; 4 * 1024 * 1024];
        let expected = payload.clone();

        let writer = thread::spawn(move || {
            left.write_bytes(&payload).expect("large write should succeed");
            left
        });

        let received = right.read_bytes().expect("large read should succeed");
        assert_eq!(received.len(), expected.len());
        assert_eq!(received.as_ref(), expected.as_slice());
        let _left = writer.join().expect("writer thread should finish");
    }

    #[test]
    fn read_times_out_without_data() {
        let (_left, mut right) = pair();
        let timeout = Duration::from_millis(200);

        let start = Instant::now();
        let err = right
            .read_bytes_with_timeout(timeout)
            .expect_err("read should time out");
        let elapsed = start.elapsed();

        assert!(err.is_timeout(), "unexpected error: {err}");
        assert!(elapsed >= timeout, "timed out early after {elapsed:?}");
        assert!(elapsed < timeout + Duration::from_secs(1), "timed out late");
        assert!(right.is_open(), "timeout must not close the connection");
    }

    #[test]
    fn read_resumes_after_timeout_mid_frame() {
        let (left, mut right) = pair();
        let mut raw = left.io.as_ref().unwrap().writer.get_ref().try_clone().unwrap();

        raw.write_all(b"11-hello").unwrap();
        let err = right
            .read_bytes_with_timeout(Duration::from_millis(50))
            .expect_err("partial frame should time out");
        assert!(err.is_timeout());

        raw.write_all(b" world").unwrap();
        let payload = right
            .read_bytes_with_timeout(Duration::from_secs(1))
            .expect("rest of frame should complete the read");
        assert_eq!(payload.as_ref(), b"hello world");
    }

    #[test]
    fn read_after_peer_close_is_disconnect() {
        let (mut left, mut right) = pair();
        left.close();

        let err = right.read_bytes().expect_err("read should fail");
        assert!(err.is_disconnect(), "unexpected error: {err}");
        assert!(!right.is_open(), "disconnect should close the connection");

        let again = right.read_bytes().expect_err("closed connection stays closed");
        assert!(again.is_disconnect());
    }

    #[test]
    fn read_after_peer_drop_is_disconnect() {
        let (left, mut right) = pair();
        drop(left);

        let err = right
            .read_with_timeout::<u32>(Duration::from_secs(1))
            .expect_err("read should fail");
        assert!(err.is_disconnect(), "unexpected error: {err}");
    }

    #[test]
    fn pending_frames_are_delivered_before_disconnect() {
        let (mut left, mut right) = pair();
        left.write(&"last words").expect("write should succeed");
        left.close();

        let got: String = right.read().expect("buffered frame should be read");
        assert_eq!(got, "last words");
        assert!(right.read_bytes().expect_err("then EOF").is_disconnect());
    }

    #[test]
    fn write_after_peer_close_is_disconnect() {
        let (mut left, right) = pair();
        drop(right);

        // The first write may still land in the kernel buffer; keep writing
        // until the broken pipe surfaces.
        let mut last = Ok(());
        for _ in 0..64 {
            last = left.write_bytes(&[0u8; 1024]);
            if last.is_err() {
                break;
            }
        }
        let err = last.expect_err("write to a closed peer should fail");
        assert!(err.is_disconnect(), "unexpected error: {err}");
        assert!(!left.is_open());
    }

    #[test]
    fn write_times_out_when_peer_never_reads() {
        let (mut left, _right) = pair();
        let chunk = vec![0u8; 1024 * 1024];

        let mut outcome = Ok(());
        for _ in 0..64 {
            outcome = left.write_bytes_with_timeout(&chunk, Duration::from_millis(100));
            if outcome.is_err() {
                break;
            }
        }
        let err = outcome.expect_err("writes into a full socket should time out");
        assert!(err.is_timeout(), "unexpected error: {err}");
        assert!(left.is_open());
    }

    #[test]
    fn close_is_idempotent() {
        let (mut left, _right) = pair();
        left.close();
        left.close();
        assert!(!left.is_open());

        let err = left.write(&1u8).expect_err("write after close must fail");
        assert!(err.is_disconnect());
        let err = left.read_bytes().expect_err("read after close must fail");
        assert!(err.is_disconnect());
    }

    #[test]
    fn is_readable_tracks_pending_data() {
        let (mut left, mut right) = pair();
        assert!(!right.is_readable());

        left.write(&"a").expect("write should succeed");
        left.write(&"b").expect("write should succeed");
        let deadline = Instant::now() + Duration::from_secs(1);
        while !right.is_readable() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(right.is_readable());

        let _: String = right.read().expect("first read");
        assert!(right.is_readable(), "second frame is still pending");
        let _: String = right.read().expect("second read");
        assert!(!right.is_readable());

        right.close();
        assert!(!right.is_readable());
    }

    #[test]
    fn malformed_value_surfaces_codec_error() {
        let (mut left, mut right) = pair();
        left.write(&"not a number").expect("write should succeed");

        let err = right.read::<u64>().expect_err("decode should fail");
        assert!(matches!(err, IpcError::Codec(_)));
        assert!(right.is_open(), "codec errors keep the connection open");
    }

    #[test]
    fn malformed_header_closes_the_connection() {
        let (left, mut right) = pair();
        let mut raw = left.io.as_ref().unwrap().writer.get_ref().try_clone().unwrap();
        raw.write_all(b"x").unwrap();
        raw.write_all(b"5-hello").unwrap();

        let err = right
            .read_bytes_with_timeout(Duration::from_secs(1))
            .expect_err("garbage header should fail");
        assert!(matches!(
            err,
            IpcError::Frame(localipc_frame::FrameError::UnexpectedByte(b'x'))
        ));
        assert!(!right.is_open(), "a desynced stream must be closed");
        assert!(!right.is_readable());

        let again = right
            .read_bytes_with_timeout(Duration::from_millis(50))
            .expect_err("closed connection stays closed");
        assert!(again.is_disconnect(), "unexpected error: {again}");
    }

    #[test]
    fn oversized_incoming_frame_closes_the_connection() {
        let (left, right) = IpcStream::pair().unwrap();
        let config = ConnectionConfig {
            max_payload_size: 8,
            ..ConnectionConfig::default()
        };
        let mut small = Connection::from_stream("small", right, config).unwrap();
        let mut sender = Connection::from_stream("big", left, ConnectionConfig::default()).unwrap();

        sender.write_bytes(b"way more than eight bytes").unwrap();
        let err = small.read_bytes().expect_err("oversized frame should fail");
        assert!(matches!(
            err,
            IpcError::Frame(localipc_frame::FrameError::PayloadTooLarge { .. })
        ));
        assert!(!small.is_open());
    }

    #[test]
    fn oversized_payload_is_rejected_before_sending() {
        let (left, _right) = IpcStream::pair().unwrap();
        let config = ConnectionConfig {
            max_payload_size: 8,
            ..ConnectionConfig::default()
        };
        let mut conn = Connection::from_stream("small", left, config).unwrap();

        let err = conn
            .write_bytes(b"way more than eight bytes")
            .expect_err("oversized write should fail");
        assert!(matches!(
            err,
            IpcError::Frame(localipc_frame::FrameError::PayloadTooLarge { .. })
        ));
        assert!(conn.is_open(), "a rejected local write leaves the stream intact");
    }

    #[test]
    fn debug_shows_id_and_state() {
        let (mut left, _right) = pair();
        assert!(format!("{left:?}").contains("open: true"));
        left.close();
        assert!(format!("{left:?}").contains("open: false"));
    }
}
