//! The server-side completion sink handed to async and deferred handlers.
//!
//! Modeled as an affine resource (Design Notes, §9): the handler owns a
//! move-only sink, and if it is dropped without ever calling `set_value` or
//! `set_error`, the destructor fires an `empty_error` so a request never
//! hangs silently waiting for a response that will never come.
//!
//! Client-side pending calls don't need this wrapper: a `oneshot::Sender`
//! already can only be sent through once (it consumes `self`), which is
//! exactly the "fires at most once" guarantee the spec asks for — Rust's
//! ownership model gives it to us for free there.

use tokio::sync::oneshot;

use crate::value::Value;

/// Sent into the oneshot channel backing a [`CompletionSink`]; `None` on
/// drop-without-firing.
pub type CompletionResult = Result<Value, Value>;

/// A one-shot handle passed to async/deferred handler invocations.
pub struct CompletionSink {
    tx: Option<oneshot::Sender<CompletionResult>>,
}

impl CompletionSink {
    pub(crate) fn new(tx: oneshot::Sender<CompletionResult>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink for notifications: the handler may still call `set_value`/
    /// `set_error`, but nothing is listening and dropping it fires nothing.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Completes the call successfully.
    pub fn set_value(mut self, value: impl Into<Value>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Ok(value.into()));
        }
    }

    /// Completes the call with a handler-supplied error value.
    pub fn set_error(mut self, error: impl Into<Value>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(error.into()));
        }
    }
}

impl Drop for CompletionSink {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(Value::Str("empty_error".to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drop_without_firing_yields_empty_error() {
        let (tx, rx) = oneshot::channel();
        {
            let _sink = CompletionSink::new(tx);
            // dropped here without calling set_value/set_error
        }
        let result = rx.await.unwrap();
        assert_eq!(result, Err(Value::Str("empty_error".to_string())));
    }

    #[tokio::test]
    async fn set_value_fires_exactly_once() {
        let (tx, rx) = oneshot::channel();
        let sink = CompletionSink::new(tx);
        sink.set_value(Value::Int(42));
        let result = rx.await.unwrap();
        assert_eq!(result, Ok(Value::Int(42)));
    }

    #[tokio::test]
    async fn discard_sink_drop_is_silent() {
        // discard() has no receiver at all; dropping it must not panic.
        drop(CompletionSink::discard());
    }
}
