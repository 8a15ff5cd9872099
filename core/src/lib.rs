//! An asynchronous RPC core supporting two wire dialects over one shared
//! connection and dispatch model: msgpack-RPC's compact array frames, and
//! JSON-RPC 2.0's object frames.
//!
//! A [`codec::Dialect`] turns typed frames into bytes and back; a
//! [`session::ClientSession`] issues calls and notifications against a
//! connection and tracks their responses through a [`pending::PendingTable`];
//! a [`session::ServerSession`] reads inbound calls off a connection and
//! resolves them against a shared [`dispatcher::Dispatcher`]; an
//! [`acceptor::ServerAcceptor`] turns a listener into a stream of server
//! sessions. Every dynamic value crossing these boundaries is a
//! [`value::Value`], dialect-agnostic by design.

pub mod acceptor;
pub mod binding;
pub mod codec;
pub mod completion;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod options;
pub mod pending;
pub mod session;
pub mod transport;
pub mod value;
pub mod write_serializer;

pub use acceptor::{Listener, ServerAcceptor};
pub use binding::{ArgSpec, ArgSpecs};
pub use codec::json::JsonDialect;
pub use codec::msgpack::MsgpackDialect;
pub use codec::{Dialect, FramingError, IncrementalDecoder};
pub use completion::CompletionSink;
pub use dispatcher::{Dispatcher, Executor, Procedure, TokioExecutor};
pub use error::{BindingError, CallOutcome, CallOutcomeTyped, CoreError, ErrorCode};
pub use frame::{Args, Frame, Id, ResponsePayload};
pub use options::{SessionOptions, SessionOptionsBuilder};
pub use pending::PendingTable;
pub use session::{ClientSession, ServerSession};
pub use transport::Transport;
pub use value::{ConversionError, Value};
