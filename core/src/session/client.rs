//! The client session state machine (§4.4).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::codec::Dialect;
use crate::error::{CallOutcome, CallOutcomeTyped, ErrorCode};
use crate::frame::{Args, Frame, Id, ResponsePayload};
use crate::options::SessionOptions;
use crate::pending::{PendingTable, Resolution};
use crate::transport::Transport;
use crate::value::Value;
use crate::write_serializer::WriteSerializer;

/// A connection used purely to call and notify a remote dispatcher.
///
/// Owns a dedicated reader task (spawned at construction) that feeds the
/// dialect's incremental decoder and resolves pending calls as responses
/// arrive, and a [`WriteSerializer`] that funnels every outbound frame
/// through one writer task. `ClientSession` itself is just a thin, cloneable
/// handle onto that state (Design Notes §9).
pub struct ClientSession {
    dialect: Arc<dyn Dialect>,
    writer: WriteSerializer,
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
}

impl ClientSession {
    /// Splits `transport` and spawns the reader task with
    /// [`SessionOptions::default`]. The session is ready to issue calls as
    /// soon as this returns.
    pub fn spawn<T: Transport>(transport: T, dialect: Arc<dyn Dialect>) -> Self {
        Self::spawn_with_options(transport, dialect, SessionOptions::default())
    }

    /// Same as [`ClientSession::spawn`], with an explicit [`SessionOptions`]
    /// (currently: the read buffer size).
    pub fn spawn_with_options<T: Transport>(transport: T, dialect: Arc<dyn Dialect>, options: SessionOptions) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let writer = WriteSerializer::spawn(write_half);
        let pending = Arc::new(PendingTable::new());
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(read_loop(
            read_half,
            dialect.clone(),
            pending.clone(),
            closed.clone(),
            options.read_buffer_size(),
        ));

        Self {
            dialect,
            writer,
            pending,
            next_id: AtomicU64::new(1),
            closed,
        }
    }

    fn allocate_id(&self) -> Id {
        Id::Num(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Issues a request and awaits its response, a local cancellation, or
    /// session close — whichever comes first.
    pub async fn call(&self, method: &str, args: Args) -> CallOutcome {
        if self.closed.load(Ordering::Acquire) {
            return CallOutcome::Error {
                code: ErrorCode::Cancelled,
                payload: None,
            };
        }

        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        let bytes = self.dialect.encode_request(&id, method, &args);
        if let Err(err) = self.writer.write(bytes).await {
            self.pending.take(&id);
            return CallOutcome::Error {
                code: ErrorCode::CallError,
                payload: Some(Value::Str(err.to_string())),
            };
        }

        match rx.await {
            Ok(Resolution::Response(Ok(value))) => CallOutcome::Success(value),
            Ok(Resolution::Response(Err(payload))) => CallOutcome::Error {
                code: ErrorCode::ErrorDuringCall,
                payload: Some(payload),
            },
            Ok(Resolution::Cancelled) => CallOutcome::Error {
                code: ErrorCode::Cancelled,
                payload: None,
            },
            Ok(Resolution::Closed) | Err(_) => CallOutcome::Error {
                code: ErrorCode::Cancelled,
                payload: None,
            },
        }
    }

    /// Like [`ClientSession::call`], but decodes a successful response into
    /// a caller-chosen type via [`Value::into_typed`]. A wire-level error
    /// (unknown procedure, cancellation, transport failure, ...) is passed
    /// through unchanged; a successful response that fails to decode into
    /// `T` is turned into `ErrorCode::BadResultType` instead (§6, §7
    /// "typed-result" taxonomy entry) rather than silently discarded.
    pub async fn call_typed<T>(&self, method: &str, args: Args) -> CallOutcomeTyped<T>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.call(method, args).await {
            CallOutcome::Success(value) => match value.into_typed::<T>() {
                Ok(typed) => CallOutcomeTyped::Success(typed),
                Err(err) => CallOutcomeTyped::Error {
                    code: ErrorCode::BadResultType,
                    payload: Some(Value::Str(err.to_string())),
                },
            },
            CallOutcome::Error { code, payload } => CallOutcomeTyped::Error { code, payload },
        }
    }

    /// Sends a one-way notification; there is no response to await.
    pub async fn notify(&self, method: &str, args: Args) -> std::io::Result<()> {
        let bytes = self.dialect.encode_notification(method, &args);
        self.writer.write(bytes).await
    }

    /// Cancels a single still-pending call, resolving it with
    /// `ErrorCode::Cancelled` instead of letting it wait indefinitely.
    /// Returns whether `id` was actually pending.
    pub fn cancel(&self, id: &Id) -> bool {
        match self.pending.take(id) {
            Some(tx) => {
                let _ = tx.send(Resolution::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Cancels every still-pending call.
    pub fn cancel_all(&self) {
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Resolution::Cancelled);
        }
    }

    /// Fails every pending call and marks the session closed; further
    /// `call`s return `ErrorCode::Cancelled` immediately rather than being
    /// sent. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Resolution::Closed);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn pending_call_count(&self) -> usize {
        self.pending.len()
    }
}

async fn read_loop<R>(
    mut read_half: R,
    dialect: Arc<dyn Dialect>,
    pending: Arc<PendingTable>,
    closed: Arc<AtomicBool>,
    read_buffer_size: usize,
) where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let mut decoder = dialect.new_decoder();
    let mut buf = vec![0u8; read_buffer_size];

    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                debug!("client transport reached EOF");
                break;
            }
            Ok(n) => decoder.feed(&buf[..n]),
            Err(err) => {
                warn!(error = %err, "client transport read failed");
                break;
            }
        }

        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => handle_frame(frame, &pending),
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "malformed frame on client session, closing");
                    close_all(&pending);
                    closed.store(true, Ordering::Release);
                    return;
                }
            }
        }
    }

    close_all(&pending);
    closed.store(true, Ordering::Release);
}

fn handle_frame(frame: Frame, pending: &PendingTable) {
    match frame {
        Frame::Response { id, payload } => {
            let Some(tx) = pending.take(&id) else {
                // §5 "Cancellation semantics": the peer may still reply to a
                // call the caller already cancelled locally. The entry is
                // gone, so the reply has nowhere to go; this is expected
                // under normal cancellation, not a framing problem.
                debug!(%id, "response for unknown or already-resolved id, dropping");
                return;
            };
            let resolution = match payload {
                ResponsePayload::Success(v) => Resolution::Response(Ok(v)),
                ResponsePayload::Error(v) => Resolution::Response(Err(v)),
            };
            let _ = tx.send(resolution);
        }
        Frame::Request { method, .. } | Frame::Notification { method, .. } => {
            // A pure client never serves calls; the dispatcher lives on the
            // server side of a connection. Log and drop rather than treat
            // it as a framing error — a peer that's also a server on the
            // same socket is a deployment choice outside this type's scope.
            warn!(%method, "client session received an inbound call, ignoring");
        }
    }
}

fn close_all(pending: &PendingTable) {
    for (_, tx) in pending.drain() {
        let _ = tx.send(Resolution::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::msgpack::MsgpackDialect;

    #[tokio::test]
    async fn call_resolves_on_matching_response() {
        let (client_io, mut peer) = rpcbus_testkit::duplex_pair();
        let session = Arc::new(ClientSession::spawn(client_io, Arc::new(MsgpackDialect)));

        let call = tokio::spawn({
            let session = session.clone();
            async move { session.call("add", Args::Positional(vec![Value::Int(1), Value::Int(2)])).await }
        });

        // Act as the peer: read the request, write back a response.
        let mut buf = vec![0u8; 256];
        let n = AsyncReadExt::read(&mut peer, &mut buf).await.unwrap();
        let mut decoder = MsgpackDialect.new_decoder();
        decoder.feed(&buf[..n]);
        let frame = decoder.next_frame().unwrap().unwrap();
        let id = match frame {
            Frame::Request { id, .. } => id,
            other => panic!("expected request, got {other:?}"),
        };
        let response = MsgpackDialect.encode_response(&id, &ResponsePayload::Success(Value::Int(3)));
        tokio::io::AsyncWriteExt::write_all(&mut peer, &response).await.unwrap();

        let outcome = call.await.unwrap();
        match outcome {
            CallOutcome::Success(v) => assert_eq!(v, Value::Int(3)),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_typed_decodes_a_successful_response() {
        let (client_io, mut peer) = rpcbus_testkit::duplex_pair();
        let session = Arc::new(ClientSession::spawn(client_io, Arc::new(MsgpackDialect)));

        let call = tokio::spawn({
            let session = session.clone();
            async move { session.call_typed::<i64>("answer", Args::empty()).await }
        });

        let mut buf = vec![0u8; 256];
        let n = AsyncReadExt::read(&mut peer, &mut buf).await.unwrap();
        let mut decoder = MsgpackDialect.new_decoder();
        decoder.feed(&buf[..n]);
        let id = match decoder.next_frame().unwrap().unwrap() {
            Frame::Request { id, .. } => id,
            other => panic!("expected request, got {other:?}"),
        };
        let response = MsgpackDialect.encode_response(&id, &ResponsePayload::Success(Value::Int(42)));
        tokio::io::AsyncWriteExt::write_all(&mut peer, &response).await.unwrap();

        match call.await.unwrap() {
            CallOutcomeTyped::Success(v) => assert_eq!(v, 42),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_typed_reports_bad_result_type_on_decode_mismatch() {
        let (client_io, mut peer) = rpcbus_testkit::duplex_pair();
        let session = Arc::new(ClientSession::spawn(client_io, Arc::new(MsgpackDialect)));

        let call = tokio::spawn({
            let session = session.clone();
            async move { session.call_typed::<i64>("name", Args::empty()).await }
        });

        let mut buf = vec![0u8; 256];
        let n = AsyncReadExt::read(&mut peer, &mut buf).await.unwrap();
        let mut decoder = MsgpackDialect.new_decoder();
        decoder.feed(&buf[..n]);
        let id = match decoder.next_frame().unwrap().unwrap() {
            Frame::Request { id, .. } => id,
            other => panic!("expected request, got {other:?}"),
        };
        let response =
            MsgpackDialect.encode_response(&id, &ResponsePayload::Success(Value::Str("not a number".into())));
        tokio::io::AsyncWriteExt::write_all(&mut peer, &response).await.unwrap();

        match call.await.unwrap() {
            CallOutcomeTyped::Error {
                code: ErrorCode::BadResultType,
                ..
            } => {}
            other => panic!("expected BadResultType, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_cancels_every_pending_call() {
        let (client_io, _peer) = rpcbus_testkit::duplex_pair();
        let session = Arc::new(ClientSession::spawn(client_io, Arc::new(MsgpackDialect)));

        let s1 = session.clone();
        let call = tokio::spawn(async move { s1.call("slow", Args::empty()).await });
        // Give the call a moment to register before closing.
        tokio::task::yield_now().await;
        session.close();

        let outcome = call.await.unwrap();
        assert!(matches!(
            outcome,
            CallOutcome::Error {
                code: ErrorCode::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn explicit_cancel_resolves_only_that_call() {
        let (client_io, _peer) = rpcbus_testkit::duplex_pair();
        let session = ClientSession::spawn(client_io, Arc::new(MsgpackDialect));
        let id = session.allocate_id();
        let (tx, rx) = oneshot::channel();
        session.pending.insert(id.clone(), tx);

        assert!(session.cancel(&id));
        assert!(!session.cancel(&id));
        assert_eq!(rx.await.unwrap(), Resolution::Cancelled);
    }
}
