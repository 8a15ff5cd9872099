//! Wire dialects (§3): msgpack-RPC and JSON-RPC 2.0 share one frame model
//! but disagree on bytes, so each lives behind the same two small traits.

pub mod json;
pub mod msgpack;

use crate::frame::{Args, Frame, Id, ResponsePayload};

/// A malformed frame: well-formed at the byte-stream level (the incremental
/// parser agreed it was a complete message) but violating a dialect's own
/// shape rules once decoded — e.g. a msgpack array frame of the wrong
/// arity, or a JSON object missing `method`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FramingError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unsupported frame type tag: {0}")]
    UnknownType(String),
}

/// Encodes outbound frames for one wire dialect.
pub trait Dialect: Send + Sync {
    /// Whether this dialect's args container supports the named (object)
    /// form, used by [`crate::binding::bind`]'s `supports_named` flag.
    fn supports_named_arguments(&self) -> bool;

    fn encode_request(&self, id: &Id, method: &str, args: &Args) -> Vec<u8>;
    fn encode_notification(&self, method: &str, args: &Args) -> Vec<u8>;
    fn encode_response(&self, id: &Id, payload: &ResponsePayload) -> Vec<u8>;

    /// A fresh incremental decoder for a new connection of this dialect.
    fn new_decoder(&self) -> Box<dyn IncrementalDecoder>;
}

/// Consumes raw bytes off the wire and yields complete frames as they
/// become available, without ever blocking for more input than it's been
/// given (§4.2: "a dialect must be able to tell a not-yet-complete message
/// from a malformed one").
pub trait IncrementalDecoder: Send {
    /// Buffers `bytes` for later parsing.
    fn feed(&mut self, bytes: &[u8]);

    /// Attempts to extract the next complete frame from buffered bytes.
    /// Returns `Ok(None)` when the buffer holds only a partial frame —
    /// distinct from an error, which means the bytes seen so far can never
    /// form a valid frame of this dialect.
    fn next_frame(&mut self) -> Result<Option<Frame>, FramingError>;
}
