//! Dialect-agnostic frame model (§3 of the spec).

use std::fmt;

use crate::value::Value;

/// A call identifier. msgpack-RPC restricts this to an unsigned 32-bit
/// integer; JSON-RPC 2.0 allows any scalar JSON id. Both are represented
/// here so the Pending Table and Dispatcher never need to know which
/// dialect produced an id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Id {
    Num(u64),
    Str(String),
    Null,
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Num(n) => write!(f, "{n}"),
            Id::Str(s) => write!(f, "{s}"),
            Id::Null => write!(f, "null"),
        }
    }
}

/// The argument container carried by a request or notification.
///
/// Mixing positional and named forms is forbidden at serialization time
/// (§3); msgpack rejects the named form entirely on both ends (§4.1).
#[derive(Clone, Debug, PartialEq)]
pub enum Args {
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Args {
    pub fn empty() -> Self {
        Args::Positional(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Args::Positional(v) => v.len(),
            Args::Named(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Either half of a response: exactly one is ever populated (§3 invariant).
#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePayload {
    Success(Value),
    Error(Value),
}

/// A fully parsed, dialect-agnostic wire frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Request {
        id: Id,
        method: String,
        args: Args,
    },
    Notification {
        method: String,
        args: Args,
    },
    Response {
        id: Id,
        payload: ResponsePayload,
    },
}

impl Frame {
    pub fn method(&self) -> Option<&str> {
        match self {
            Frame::Request { method, .. } | Frame::Notification { method, .. } => Some(method),
            Frame::Response { .. } => None,
        }
    }
}
