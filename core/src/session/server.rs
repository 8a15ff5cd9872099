//! The server session state machine (§4.5): one connection, serviced
//! against a shared [`Dispatcher`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::codec::Dialect;
use crate::completion::CompletionSink;
use crate::dispatcher::{Dispatcher, Executor};
use crate::frame::{Frame, Id, ResponsePayload};
use crate::options::SessionOptions;
use crate::value::Value;
use crate::write_serializer::WriteSerializer;

/// One accepted connection, dispatched against a shared [`Dispatcher`].
///
/// Every inbound request spawns its own short-lived task that awaits the
/// handler's completion and writes the response; the read loop itself never
/// blocks on a handler, so one slow call can't stall every other call
/// multiplexed over the same connection.
pub struct ServerSession {
    closed: Arc<AtomicBool>,
    close_signal: Arc<Notify>,
}

impl ServerSession {
    /// Spawns with [`SessionOptions::default`].
    pub fn spawn<T: crate::transport::Transport>(
        transport: T,
        dialect: Arc<dyn Dialect>,
        dispatcher: Arc<Dispatcher>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self::spawn_with_options(transport, dialect, dispatcher, executor, SessionOptions::default())
    }

    /// Same as [`ServerSession::spawn`], with an explicit [`SessionOptions`].
    pub fn spawn_with_options<T: crate::transport::Transport>(
        transport: T,
        dialect: Arc<dyn Dialect>,
        dispatcher: Arc<Dispatcher>,
        executor: Arc<dyn Executor>,
        options: SessionOptions,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let writer = WriteSerializer::spawn(write_half);
        let closed = Arc::new(AtomicBool::new(false));
        let close_signal = Arc::new(Notify::new());

        tokio::spawn(read_loop(
            read_half,
            dialect,
            dispatcher,
            executor,
            writer,
            closed.clone(),
            close_signal.clone(),
            options.read_buffer_size(),
        ));

        Self { closed, close_signal }
    }

    /// Proactively tears down the session: wakes the read loop (even while
    /// it's blocked waiting on the transport) and marks the session closed,
    /// mirroring [`crate::session::ClientSession::close`]. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_signal.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn read_loop<R>(
    mut read_half: R,
    dialect: Arc<dyn Dialect>,
    dispatcher: Arc<Dispatcher>,
    executor: Arc<dyn Executor>,
    writer: WriteSerializer,
    closed: Arc<AtomicBool>,
    close_signal: Arc<Notify>,
    read_buffer_size: usize,
) where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let mut decoder = dialect.new_decoder();
    let mut buf = vec![0u8; read_buffer_size];
    let supports_named = dialect.supports_named_arguments();

    loop {
        let read = tokio::select! {
            biased;
            _ = close_signal.notified() => {
                debug!("server session closed by caller");
                break;
            }
            read = read_half.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!("server transport reached EOF");
                break;
            }
            Ok(n) => decoder.feed(&buf[..n]),
            Err(err) => {
                warn!(error = %err, "server transport read failed");
                break;
            }
        }

        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    handle_frame(frame, &dialect, &dispatcher, &executor, &writer, supports_named);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "malformed frame on server session, closing");
                    closed.store(true, Ordering::Release);
                    return;
                }
            }
        }
    }

    closed.store(true, Ordering::Release);
}

/// Dispatches one frame against the shared [`Dispatcher`].
///
/// §4.5 "Concurrency on dispatch": the dispatch itself (binding plus handler
/// invocation) is re-posted onto the executor rather than run inline here,
/// so the reader can keep draining the socket while a synchronous handler
/// runs — without this, one slow `Sync` handler would stall every other
/// call multiplexed over the same connection.
fn handle_frame(
    frame: Frame,
    dialect: &Arc<dyn Dialect>,
    dispatcher: &Arc<Dispatcher>,
    executor: &Arc<dyn Executor>,
    writer: &WriteSerializer,
    supports_named: bool,
) {
    match frame {
        Frame::Request { id, method, args } => {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let sink = CompletionSink::new(tx);
            spawn_response_writer(id, rx, dialect.clone(), writer.clone());

            let dispatcher = dispatcher.clone();
            let inner_executor = executor.clone();
            executor.spawn(Box::pin(async move {
                if let Err(err) = dispatcher.dispatch(&method, &args, supports_named, sink, inner_executor.as_ref()) {
                    debug!(%method, error = %err, "dispatch did not reach a handler");
                }
            }));
        }
        Frame::Notification { method, args } => {
            let sink = CompletionSink::discard();
            let dispatcher = dispatcher.clone();
            let inner_executor = executor.clone();
            executor.spawn(Box::pin(async move {
                if let Err(err) = dispatcher.dispatch(&method, &args, supports_named, sink, inner_executor.as_ref()) {
                    debug!(%method, error = %err, "dispatch did not reach a handler for a notification");
                }
            }));
        }
        Frame::Response { .. } => {
            // A server session only ever receives requests and
            // notifications from its peer; a stray response frame means
            // the peer thinks this connection is serving it a call it
            // never made. Not a framing violation, just ignored.
            debug!("server session received an unexpected response frame, ignoring");
        }
    }
}

fn spawn_response_writer(
    id: Id,
    rx: tokio::sync::oneshot::Receiver<crate::completion::CompletionResult>,
    dialect: Arc<dyn Dialect>,
    writer: WriteSerializer,
) {
    tokio::spawn(async move {
        let payload = match rx.await {
            Ok(Ok(value)) => ResponsePayload::Success(value),
            Ok(Err(error)) => ResponsePayload::Error(error),
            Err(_) => ResponsePayload::Error(Value::Str("handler dropped without responding".to_string())),
        };
        let bytes = dialect.encode_response(&id, &payload);
        if let Err(err) = writer.write(bytes).await {
            warn!(error = %err, "failed to write response");
        }
    });
}
