use crate::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

const READ_CHUNK: usize = 64 * 1024;

/// Byte-exact reads and writes over a connected stream.
///
/// Every individual read or write call is bounded by the timeout the socket
/// was opened with; a zero timeout waits indefinitely. No framing is applied:
/// callers put their own length or command framing on top of
/// [`read_exact`](SocketIo::read_exact) and [`write_all`](SocketIo::write_all).
pub struct SocketIo<S = TcpStream> {
    stream: Option<S>,
    timeout: Duration,
}

impl SocketIo<TcpStream> {
    /// Open a TCP connection with low-latency delivery (`TCP_NODELAY`).
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = format!("{}:{}", host, port);

        let connecting = TcpStream::connect(addr.as_str());
        let connected = if timeout.is_zero() {
            connecting.await
        } else {
            match tokio::time::timeout(timeout, connecting).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection timed out",
                )),
            }
        };

        let stream = connected.map_err(|e| TransportError::connect(&addr, &e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::connect(&addr, &e))?;

        debug!("Connected to {}", addr);
        Ok(SocketIo::from_stream(stream, timeout))
    }

    /// Wait up to `sec` seconds plus `usec` microseconds for the socket to
    /// become readable. Returns `false` when the wait elapsed first.
    pub async fn select_readable(&self, sec: u64, usec: u32) -> Result<bool> {
        let stream = self.stream.as_ref().ok_or(TransportError::Closed)?;
        select(poll_interval(sec, usec), stream.readable()).await
    }

    /// Wait up to `sec` seconds plus `usec` microseconds for the socket to
    /// accept writes. Returns `false` when the wait elapsed first.
    pub async fn select_writable(&self, sec: u64, usec: u32) -> Result<bool> {
        let stream = self.stream.as_ref().ok_or(TransportError::Closed)?;
        select(poll_interval(sec, usec), stream.writable()).await
    }
}

impl<S> SocketIo<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream.
    pub fn from_stream(stream: S, timeout: Duration) -> Self {
        SocketIo {
            stream: Some(stream),
            timeout,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read exactly `n` bytes, accumulating partial reads until the peer
    /// closes or the count is reached.
    ///
    /// The buffer grows as data arrives, so `n` may come straight from a
    /// peer-supplied length prefix.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        let mut buf = BytesMut::with_capacity(n.min(READ_CHUNK));

        while buf.len() < n {
            let received = buf.len();
            let remaining = n - received;
            if buf.capacity() == received {
                buf.reserve(remaining.min(READ_CHUNK));
            }

            let mut limited = (&mut *stream).take(remaining as u64);
            let read = match within(timeout, limited.read_buf(&mut buf)).await {
                Some(Ok(read)) => read,
                Some(Err(source)) => {
                    discard_partial(received);
                    return Err(TransportError::Read {
                        received,
                        expected: n,
                        source,
                    });
                }
                None => {
                    discard_partial(received);
                    return Err(TransportError::TimedOut {
                        operation: "read",
                        transferred: received,
                        expected: n,
                        after: timeout,
                    });
                }
            };

            if read == 0 {
                break;
            }
            trace!("Read {} bytes ({}/{})", read, buf.len(), n);
        }

        if buf.len() != n {
            discard_partial(buf.len());
            return Err(TransportError::ShortRead {
                received: buf.len(),
                expected: n,
            });
        }

        Ok(buf.freeze())
    }

    /// Write all of `data`, resuming after partial writes.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        let total = data.len();
        let mut sent = 0;

        while sent < total {
            let written = match within(timeout, stream.write(&data[sent..])).await {
                Some(Ok(0)) => {
                    return Err(TransportError::Write {
                        sent,
                        total,
                        source: io::ErrorKind::WriteZero.into(),
                    })
                }
                Some(Ok(written)) => written,
                Some(Err(source)) => return Err(TransportError::Write { sent, total, source }),
                None => {
                    return Err(TransportError::TimedOut {
                        operation: "write",
                        transferred: sent,
                        expected: total,
                        after: timeout,
                    })
                }
            };
            sent += written;
            trace!("Wrote {} bytes ({}/{})", written, sent, total);
        }

        match within(timeout, stream.flush()).await {
            Some(Ok(())) => Ok(()),
            Some(Err(source)) => Err(TransportError::Write { sent, total, source }),
            None => Err(TransportError::TimedOut {
                operation: "flush",
                transferred: sent,
                expected: total,
                after: timeout,
            }),
        }
    }

    /// Shut the stream down. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error shutting down socket: {}", e);
            }
        }
    }
}

fn poll_interval(sec: u64, usec: u32) -> Duration {
    Duration::from_secs(sec) + Duration::from_micros(u64::from(usec))
}

/// Run `fut` under `timeout`; `None` when it elapsed first. A zero timeout
/// waits indefinitely.
async fn within<T, F>(timeout: Duration, fut: F) -> Option<io::Result<T>>
where
    F: Future<Output = io::Result<T>>,
{
    if timeout.is_zero() {
        return Some(fut.await);
    }

    tokio::time::timeout(timeout, fut).await.ok()
}

fn discard_partial(received: usize) {
    if received > 0 {
        debug!("Discarding {} partially read bytes", received);
    }
}

async fn select<F>(wait: Duration, ready: F) -> Result<bool>
where
    F: Future<Output = io::Result<()>>,
{
    match tokio::time::timeout(wait, ready).await {
        Ok(result) => {
            result?;
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    const NO_TIMEOUT: Duration = Duration::ZERO;

    async fn pipe_through(payload: Vec<u8>, fragment: usize) -> Bytes {
        let (near, far) = duplex(fragment);
        let mut writer = SocketIo::from_stream(near, NO_TIMEOUT);
        let mut reader = SocketIo::from_stream(far, NO_TIMEOUT);

        let len = payload.len();
        let (written, read) = tokio::join!(writer.write_all(&payload), reader.read_exact(len));
        written.unwrap();
        read.unwrap()
    }

    #[tokio::test]
    async fn test_fragmented_roundtrip() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let received = pipe_through(payload.clone(), 3).await;
        assert_eq!(&received[..], &payload[..]);
    }

    proptest! {
        #[test]
        fn prop_write_then_read_is_byte_identical(
            payload in proptest::collection::vec(any::<u8>(), 1..2048),
            fragment in 1usize..64,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let received = runtime.block_on(pipe_through(payload.clone(), fragment));
            prop_assert_eq!(&received[..], &payload[..]);
        }
    }

    #[tokio::test]
    async fn test_short_read_reports_counts() {
        let (near, mut far) = duplex(64);
        far.write_all(b"abc").await.unwrap();
        drop(far);

        let mut io = SocketIo::from_stream(near, NO_TIMEOUT);
        match io.read_exact(8).await {
            Err(TransportError::ShortRead { received, expected }) => {
                assert_eq!(received, 3);
                assert_eq!(expected, 8);
            }
            other => panic!("expected short read, got {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_oversized_length_fails_as_short_read() {
        let (near, mut far) = duplex(64);
        far.write_all(b"abc").await.unwrap();
        drop(far);

        let mut io = SocketIo::from_stream(near, NO_TIMEOUT);
        match io.read_exact(usize::MAX).await {
            Err(TransportError::ShortRead { received, expected }) => {
                assert_eq!(received, 3);
                assert_eq!(expected, usize::MAX);
            }
            other => panic!("expected short read, got {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_read_larger_than_chunk() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(READ_CHUNK * 2 + 17).collect();
        let received = pipe_through(payload.clone(), 4096).await;
        assert_eq!(received.len(), payload.len());
        assert_eq!(&received[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_read_zero_bytes() {
        let (near, _far) = duplex(8);
        let mut io = SocketIo::from_stream(near, NO_TIMEOUT);
        assert!(io.read_exact(0).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (near, _far) = duplex(8);
        let mut io = SocketIo::from_stream(near, Duration::from_secs(2));

        let err = io.read_exact(4).await.unwrap_err();
        assert!(matches!(err, TransportError::TimedOut { operation: "read", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_after_partial_data_reports_counts() {
        let (near, mut far) = duplex(8);
        far.write_all(b"ab").await.unwrap();
        let mut io = SocketIo::from_stream(near, Duration::from_secs(2));

        match io.read_exact(4).await {
            Err(TransportError::TimedOut {
                operation,
                transferred,
                expected,
                after,
            }) => {
                assert_eq!(operation, "read");
                assert_eq!(transferred, 2);
                assert_eq!(expected, 4);
                assert_eq!(after, Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_timeout_reports_counts() {
        let (near, _far) = duplex(4);
        let mut io = SocketIo::from_stream(near, Duration::from_secs(2));

        match io.write_all(b"0123456789").await {
            Err(TransportError::TimedOut {
                operation,
                transferred,
                expected,
                ..
            }) => {
                assert_eq!(operation, "write");
                assert_eq!(transferred, 4);
                assert_eq!(expected, 10);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (near, _far) = duplex(8);
        let mut io = SocketIo::from_stream(near, NO_TIMEOUT);

        io.close().await;
        io.close().await;

        assert!(!io.is_open());
        assert!(matches!(io.read_exact(1).await, Err(TransportError::Closed)));
        assert!(matches!(io.write_all(b"x").await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_tcp_connect_and_select() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = SocketIo::connect("127.0.0.1", port, Duration::from_secs(5))
            .await
            .unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        assert!(client.select_writable(1, 0).await.unwrap());
        assert!(!client.select_readable(0, 50_000).await.unwrap());

        server.write_all(b"PING\r\n").await.unwrap();
        assert!(client.select_readable(5, 0).await.unwrap());
        assert_eq!(&client.read_exact(6).await.unwrap()[..], b"PING\r\n");

        client.write_all(b"PONG").await.unwrap();
        let mut reply = [0u8; 4];
        server.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"PONG");

        client.close().await;
        assert!(matches!(
            client.select_readable(0, 0).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_carries_os_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        match SocketIo::connect("127.0.0.1", port, Duration::from_secs(5)).await {
            Err(TransportError::Connect { addr, message, .. }) => {
                assert_eq!(addr, format!("127.0.0.1:{}", port));
                assert!(!message.is_empty());
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connect to a closed port succeeded"),
        }
    }
}
