//! Error taxonomy (§7) and the wire-level error codes surfaced to callers
//! (§6).

use crate::value::Value;

/// The error code delivered to a caller alongside a completion event.
/// Independent of the internal [`CoreError`] taxonomy below: this is the
/// small, stable enum a user of the crate matches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// Nominal completion.
    Success,
    /// The peer returned an error response.
    ErrorDuringCall,
    /// The peer reports no such method.
    UnknownProcedure,
    /// Local cancellation, or the session closed while the call was pending.
    Cancelled,
    /// Local framing / transport failure while sending.
    CallError,
    /// Typed-result decoding failed after a successful wire response.
    BadResultType,
}

impl ErrorCode {
    /// Human-readable description, matching the reference implementation's
    /// own category names so log output and tests read the same way.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::ErrorDuringCall => "Error during call",
            ErrorCode::UnknownProcedure => "Unknown function",
            ErrorCode::Cancelled => "Cancelled",
            ErrorCode::CallError => "Call error",
            ErrorCode::BadResultType => "Bad result type",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// The outcome of an outbound request: either a wire-level error code with
/// an optional dialect-native payload, or the decoded success value.
#[derive(Clone, Debug)]
pub enum CallOutcome {
    Success(Value),
    Error { code: ErrorCode, payload: Option<Value> },
}

/// The outcome of [`crate::session::ClientSession::call_typed`]: the same
/// shape as [`CallOutcome`], but with the success payload already decoded
/// into a caller-chosen type `T`. A decode failure on an otherwise-successful
/// response surfaces as `ErrorCode::BadResultType` rather than panicking or
/// being silently dropped.
#[derive(Clone, Debug)]
pub enum CallOutcomeTyped<T> {
    Success(T),
    Error { code: ErrorCode, payload: Option<Value> },
}

/// Internal fallible-operation error, independent of what gets reported to
/// a caller. Built with `thiserror`, matching the corpus's near-universal
/// choice over hand-rolled `Display` impls.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Framing(String),

    #[error("argument binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("unknown procedure: {0}")]
    UnknownProcedure(String),

    #[error("handler error: {0}")]
    Handler(Value),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("session is closed")]
    Closed,
}

/// Argument-binding failure reasons (§4.1).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindingError {
    #[error("missing argument: {0}")]
    MissingArgument(String),
    #[error("too many arguments: expected at most {expected}, got {got}")]
    TooManyArguments { expected: usize, got: usize },
    #[error("incompatible arguments: {0}")]
    IncompatibleArguments(String),
    #[error("named arguments are not supported by this dialect")]
    NamedArgumentsUnsupported,
}

impl BindingError {
    pub fn into_value(self) -> Value {
        Value::Str(self.to_string())
    }
}
