//! Serializes concurrent writers onto one transport (§4.2, §4.4).
//!
//! Both the client and server sessions let many callers enqueue an outbound
//! frame at once — a request, several notifications, a response to an
//! inbound call — from different tasks. The transport itself only tolerates
//! one write in flight. This is the single dedicated writer task that every
//! enqueue funnels through, serializing them into the order they were
//! submitted (the reference implementation's write strand, §4.2). The task
//! owns the write half outright, so there's no lock to contend with the
//! session's read loop over the other half of a split stream.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// `io::Error` isn't `Clone`; this preserves the kind and message across
/// the fan-out to every job discarded after a write failure.
fn clone_io_error(err: &io::Error) -> io::Error {
    io::Error::new(err.kind(), err.to_string())
}

struct WriteJob {
    bytes: Vec<u8>,
    ack: oneshot::Sender<io::Result<()>>,
}

/// A handle to the background writer task. Cloning shares the same queue;
/// dropping every handle lets the task exit once its channel is empty.
#[derive(Clone)]
pub struct WriteSerializer {
    tx: mpsc::UnboundedSender<WriteJob>,
}

impl WriteSerializer {
    /// Spawns the writer task, taking ownership of `writer` (typically the
    /// write half of a split transport).
    pub fn spawn<W>(mut writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match writer.write_all(&job.bytes).await {
                    Ok(()) => {
                        let _ = job.ack.send(Ok(()));
                    }
                    Err(err) => {
                        // §4.3: a write failure closes the connection. Every
                        // job already queued behind this one is discarded
                        // rather than attempted against a transport that's
                        // already failed, and fails with the same error
                        // rather than being silently dropped.
                        let _ = job.ack.send(Err(clone_io_error(&err)));
                        while let Ok(queued) = rx.try_recv() {
                            let _ = queued.ack.send(Err(clone_io_error(&err)));
                        }
                        return;
                    }
                }
            }
        });
        Self { tx }
    }

    /// Enqueues `bytes` and waits for its turn to be written, returning the
    /// transport's own success or failure. Resolves in submission order
    /// relative to every other call to `write`.
    pub async fn write(&self, bytes: Vec<u8>) -> io::Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriteJob { bytes, ack: ack_tx })
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer task has shut down"))?;
        ack_rx
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer task has shut down"))?
    }
}
