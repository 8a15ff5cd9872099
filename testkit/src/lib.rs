//! Test-only transports for exercising `rpcbus-core` without a real socket.
//!
//! Mirrors the small standalone helper crate pattern from the reference
//! corpus: a tiny crate with no dependency on the core library itself,
//! used by the core crate's own tests (and usable by downstream
//! integration tests) to avoid needing a real TCP or Unix socket.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Default buffer size for [`duplex_pair`].
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Creates a pair of in-memory, full-duplex streams connected to each
/// other, suitable as a `Transport` on both ends of a client/server test.
pub fn duplex_pair() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(DEFAULT_BUFFER_SIZE)
}

/// Wraps a stream and fails one specific write with the given error,
/// then behaves normally again. Used to test the Write Serializer's
/// failure handling (queued writes discarded, pending calls failed).
pub struct FlakyWriter<T> {
    inner: T,
    fail_after_writes: Option<usize>,
}

impl<T> FlakyWriter<T> {
    /// `fail_after` is the number of successful writes to allow before the
    /// next `poll_write` call returns an error. `None` disables injection.
    pub fn new(inner: T, fail_after: Option<usize>) -> Self {
        Self {
            inner,
            fail_after_writes: fail_after,
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for FlakyWriter<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for FlakyWriter<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Some(remaining) = self.fail_after_writes {
            if remaining == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "injected write failure",
                )));
            }
            self.fail_after_writes = Some(remaining - 1);
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
