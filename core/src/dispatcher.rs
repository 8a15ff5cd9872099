//! The procedure registry and argument-bound dispatch (§4.1, §4.6, Design
//! Notes §9).

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::warn;

use crate::binding::{self, ArgSpecs};
use crate::completion::CompletionSink;
use crate::error::BindingError;
use crate::frame::Args;
use crate::value::Value;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs a coroutine-style handler's future to completion off the session's
/// own task, so a slow handler never blocks the read/write loop that
/// services every other call on the same connection.
pub trait Executor: Send + Sync {
    fn spawn(&self, future: BoxFuture);
}

/// The default executor: hands the future to the ambient tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn spawn(&self, future: BoxFuture) {
        tokio::spawn(future);
    }
}

/// A registered procedure's handler shape (Design Notes §9).
pub enum Procedure {
    /// Returns its result directly; invoked inline on the session task.
    Sync(ArgSpecs, Arc<dyn Fn(Vec<Value>) -> Result<Value, Value> + Send + Sync>),
    /// Given a [`CompletionSink`] to fire whenever it's ready; still invoked
    /// inline, but may hold onto the sink past the call that created it.
    Async(ArgSpecs, Arc<dyn Fn(Vec<Value>, CompletionSink) + Send + Sync>),
    /// Produces a future that is hopped onto an [`Executor`] rather than
    /// run inline, so a long-running handler can't starve the connection.
    Coroutine(
        ArgSpecs,
        Arc<dyn Fn(Vec<Value>, CompletionSink) -> BoxFuture + Send + Sync>,
    ),
}

impl Procedure {
    pub fn specs(&self) -> &ArgSpecs {
        match self {
            Procedure::Sync(specs, _) | Procedure::Async(specs, _) | Procedure::Coroutine(specs, _) => specs,
        }
    }

    /// Sync and Async handlers run inline here (within whatever task the
    /// caller already posted dispatch onto, per §4.5), so a panicking
    /// handler is caught at this boundary and converted to a handler error
    /// rather than unwinding into the caller (§7). Coroutine futures run
    /// under the executor instead; a panic there unwinds within that task
    /// alone, dropping the sink and firing `empty_error` through its `Drop`.
    fn invoke(&self, args: Vec<Value>, sink: CompletionSink, executor: &dyn Executor) {
        match self {
            Procedure::Sync(_, f) => match panic::catch_unwind(AssertUnwindSafe(|| f(args))) {
                Ok(Ok(v)) => sink.set_value(v),
                Ok(Err(e)) => sink.set_error(e),
                Err(payload) => sink.set_error(Value::Str(format!("handler panicked: {}", panic_message(&payload)))),
            },
            Procedure::Async(_, f) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(args, sink))) {
                    warn!(panic = %panic_message(&payload), "async handler panicked");
                }
            }
            Procedure::Coroutine(_, f) => {
                let future = f(args, sink);
                executor.spawn(future);
            }
        }
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Procedure::Sync(..) => "Sync",
            Procedure::Async(..) => "Async",
            Procedure::Coroutine(..) => "Coroutine",
        };
        f.debug_struct("Procedure").field("kind", &kind).finish()
    }
}

/// Why a dispatch attempt didn't reach a handler. The sink is always fired
/// with an appropriate error value regardless; this is purely for the
/// caller's own logging.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown procedure: {0}")]
    UnknownProcedure(String),
    #[error(transparent)]
    Binding(#[from] BindingError),
}

/// The thread-safe name-to-procedure map a server session consults on every
/// incoming request or notification.
///
/// Backed by [`DashMap`] rather than a `Mutex<HashMap<_>>`: registrations
/// typically happen once at startup and lookups happen on every call, so a
/// sharded concurrent map avoids a single global lock becoming a bottleneck
/// under many simultaneous connections.
#[derive(Default)]
pub struct Dispatcher {
    procedures: DashMap<String, Arc<Procedure>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous procedure. Returns `false` and leaves the
    /// existing registration untouched if `name` is already taken (§4.6:
    /// "fails idempotently if `name` is already registered ... does not
    /// replace").
    pub fn add_sync(
        &self,
        name: impl Into<String>,
        specs: ArgSpecs,
        handler: impl Fn(Vec<Value>) -> Result<Value, Value> + Send + Sync + 'static,
    ) -> bool {
        self.insert_new(name.into(), Procedure::Sync(specs, Arc::new(handler)))
    }

    /// Same conflict behavior as [`Dispatcher::add_sync`], for a handler
    /// that receives an explicit [`CompletionSink`] instead of returning
    /// directly.
    pub fn add_async(
        &self,
        name: impl Into<String>,
        specs: ArgSpecs,
        handler: impl Fn(Vec<Value>, CompletionSink) + Send + Sync + 'static,
    ) -> bool {
        self.insert_new(name.into(), Procedure::Async(specs, Arc::new(handler)))
    }

    /// Same conflict behavior as [`Dispatcher::add_sync`], for a handler
    /// whose future is hopped onto the dispatch-time [`Executor`].
    pub fn add_coroutine<F>(
        &self,
        name: impl Into<String>,
        specs: ArgSpecs,
        handler: impl Fn(Vec<Value>, CompletionSink) -> F + Send + Sync + 'static,
    ) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let wrapped = move |args: Vec<Value>, sink: CompletionSink| -> BoxFuture { Box::pin(handler(args, sink)) };
        self.insert_new(name.into(), Procedure::Coroutine(specs, Arc::new(wrapped)))
    }

    /// Inserts `procedure` under `name` only if nothing is registered there
    /// yet. `DashMap::entry` is used rather than `insert` so the check and
    /// the write happen under the same shard lock — two concurrent `add`s
    /// for the same name can never both "win".
    fn insert_new(&self, name: String, procedure: Procedure) -> bool {
        match self.procedures.entry(name) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(procedure));
                true
            }
        }
    }

    /// Unregisters a procedure. Returns whether one was present.
    pub fn remove(&self, name: &str) -> bool {
        self.procedures.remove(name).is_some()
    }

    pub fn has(&self, name: &str) -> bool {
        self.procedures.contains_key(name)
    }

    pub fn clear(&self) {
        self.procedures.clear();
    }

    /// The names of every currently registered procedure, in no particular
    /// order.
    pub fn known(&self) -> Vec<String> {
        self.procedures.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Procedure>> {
        self.procedures.get(name).map(|entry| entry.clone())
    }

    /// Looks up `method`, binds `args` against its spec list, and invokes
    /// it, always consuming `sink` one way or another. `supports_named`
    /// is the calling dialect's capability flag (§4.1).
    pub fn dispatch(
        &self,
        method: &str,
        args: &Args,
        supports_named: bool,
        sink: CompletionSink,
        executor: &dyn Executor,
    ) -> Result<(), DispatchError> {
        let procedure = match self.get(method) {
            Some(p) => p,
            None => {
                sink.set_error(Value::Str(format!("Unknown function: {method}")));
                return Err(DispatchError::UnknownProcedure(method.to_string()));
            }
        };

        match binding::bind(args, procedure.specs(), supports_named) {
            Ok(bound) => {
                procedure.invoke(bound, sink, executor);
                Ok(())
            }
            Err(err) => {
                sink.set_error(err.clone().into_value());
                Err(DispatchError::Binding(err))
            }
        }
    }
}
