//! The msgpack-RPC dialect (§3, §4.2): fixed-arity array frames,
//! `[0,id,method,params]` / `[1,id,error,result]` / `[2,method,params]`.

use std::io::Cursor;

use super::{Dialect, FramingError, IncrementalDecoder};
use crate::frame::{Args, Frame, Id, ResponsePayload};
use crate::value::Value;

const TYPE_REQUEST: u64 = 0;
const TYPE_RESPONSE: u64 = 1;
const TYPE_NOTIFICATION: u64 = 2;

#[derive(Clone, Copy, Debug, Default)]
pub struct MsgpackDialect;

impl Dialect for MsgpackDialect {
    fn supports_named_arguments(&self) -> bool {
        false
    }

    fn encode_request(&self, id: &Id, method: &str, args: &Args) -> Vec<u8> {
        write_value(&rmpv::Value::Array(vec![
            rmpv::Value::from(TYPE_REQUEST),
            encode_id(id),
            rmpv::Value::from(method),
            encode_args(args),
        ]))
    }

    fn encode_notification(&self, method: &str, args: &Args) -> Vec<u8> {
        write_value(&rmpv::Value::Array(vec![
            rmpv::Value::from(TYPE_NOTIFICATION),
            rmpv::Value::from(method),
            encode_args(args),
        ]))
    }

    fn encode_response(&self, id: &Id, payload: &ResponsePayload) -> Vec<u8> {
        let (error, result) = match payload {
            ResponsePayload::Success(v) => (rmpv::Value::Nil, v.to_msgpack()),
            ResponsePayload::Error(v) => (v.to_msgpack(), rmpv::Value::Nil),
        };
        write_value(&rmpv::Value::Array(vec![
            rmpv::Value::from(TYPE_RESPONSE),
            encode_id(id),
            error,
            result,
        ]))
    }

    fn new_decoder(&self) -> Box<dyn IncrementalDecoder> {
        Box::new(MsgpackDecoder::default())
    }
}

fn encode_id(id: &Id) -> rmpv::Value {
    match id {
        Id::Num(n) => rmpv::Value::from(*n),
        Id::Str(_) | Id::Null => {
            debug_assert!(false, "msgpack-RPC ids must be numeric, got {id:?}");
            rmpv::Value::from(0u64)
        }
    }
}

fn encode_args(args: &Args) -> rmpv::Value {
    match args {
        Args::Positional(values) => rmpv::Value::Array(values.iter().map(Value::to_msgpack).collect()),
        Args::Named(_) => {
            debug_assert!(false, "msgpack-RPC does not support named arguments");
            rmpv::Value::Array(Vec::new())
        }
    }
}

fn write_value(value: &rmpv::Value) -> Vec<u8> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value).expect("encoding into a Vec<u8> cannot fail");
    buf
}

/// Buffers raw bytes and hands back one complete msgpack value at a time.
///
/// msgpack is self-describing and length-prefixed at every level, so unlike
/// JSON there's no need for a hand-rolled scanner: attempting to decode a
/// value off a short buffer simply fails with an EOF-shaped I/O error,
/// which is exactly the "not enough bytes yet" signal this decoder needs.
#[derive(Default)]
struct MsgpackDecoder {
    buf: Vec<u8>,
}

impl IncrementalDecoder for MsgpackDecoder {
    fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, FramingError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&self.buf[..]);
        match rmpv::decode::read_value(&mut cursor) {
            Ok(value) => {
                let consumed = cursor.position() as usize;
                self.buf.drain(..consumed);
                decode_frame(value).map(Some)
            }
            Err(err) if is_incomplete(&err) => Ok(None),
            Err(err) => Err(FramingError::Malformed(err.to_string())),
        }
    }
}

fn is_incomplete(err: &rmpv::decode::Error) -> bool {
    match err {
        rmpv::decode::Error::InvalidMarkerRead(e) | rmpv::decode::Error::InvalidDataRead(e) => {
            e.kind() == std::io::ErrorKind::UnexpectedEof
        }
    }
}

fn decode_frame(value: rmpv::Value) -> Result<Frame, FramingError> {
    let items = match value {
        rmpv::Value::Array(items) => items,
        other => return Err(FramingError::Malformed(format!("expected an array frame, got {other}"))),
    };

    let tag = items
        .first()
        .and_then(rmpv::Value::as_u64)
        .ok_or_else(|| FramingError::Malformed("frame type tag must be a non-negative integer".to_string()))?;

    match tag {
        TYPE_REQUEST => {
            require_arity(&items, 4, "request")?;
            let id = decode_id(&items[1])?;
            let method = decode_method(&items[2])?;
            let args = decode_args(items[3].clone())?;
            Ok(Frame::Request { id, method, args })
        }
        TYPE_NOTIFICATION => {
            require_arity(&items, 3, "notification")?;
            let method = decode_method(&items[1])?;
            let args = decode_args(items[2].clone())?;
            Ok(Frame::Notification { method, args })
        }
        TYPE_RESPONSE => {
            require_arity(&items, 4, "response")?;
            let id = decode_id(&items[1])?;
            let error = items[2].clone();
            let result = items[3].clone();
            let payload = match (error.is_nil(), result.is_nil()) {
                (true, false) => ResponsePayload::Success(Value::from_msgpack(result)),
                (false, true) => ResponsePayload::Error(Value::from_msgpack(error)),
                (true, true) => ResponsePayload::Success(Value::Null),
                (false, false) => {
                    return Err(FramingError::Malformed(
                        "response frame carries both an error and a result".to_string(),
                    ))
                }
            };
            Ok(Frame::Response { id, payload })
        }
        other => Err(FramingError::UnknownType(other.to_string())),
    }
}

fn require_arity(items: &[rmpv::Value], expected: usize, kind: &str) -> Result<(), FramingError> {
    if items.len() != expected {
        return Err(FramingError::Malformed(format!(
            "{kind} frame must have {expected} elements, got {}",
            items.len()
        )));
    }
    Ok(())
}

fn decode_id(value: &rmpv::Value) -> Result<Id, FramingError> {
    value
        .as_u64()
        .map(Id::Num)
        .ok_or_else(|| FramingError::Malformed("msgpack-RPC id must be a non-negative integer".to_string()))
}

fn decode_method(value: &rmpv::Value) -> Result<String, FramingError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| FramingError::Malformed("method name must be a string".to_string()))
}

fn decode_args(value: rmpv::Value) -> Result<Args, FramingError> {
    match value {
        rmpv::Value::Array(items) => Ok(Args::Positional(items.into_iter().map(Value::from_msgpack).collect())),
        // §4.1: "named arguments ... cause a conversion failure on the
        // receiving side if presented" — a map in the params slot is a
        // well-formed frame, just one this dialect can't bind. Decoding it
        // into `Args::Named` lets the ordinary binding path (§4.1's
        // `supports_named` flag is `false` for this dialect) report it as a
        // per-call "incompatible arguments" response, rather than treating
        // it as a framing violation that closes the whole session.
        rmpv::Value::Map(pairs) => Ok(Args::Named(
            pairs
                .into_iter()
                .map(|(k, v)| {
                    let key = k.as_str().map(str::to_string).unwrap_or_else(|| k.to_string());
                    (key, Value::from_msgpack(v))
                })
                .collect(),
        )),
        other => Err(FramingError::Malformed(format!(
            "msgpack-RPC params must be an array or map, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let dialect = MsgpackDialect;
        let bytes = dialect.encode_request(
            &Id::Num(7),
            "add",
            &Args::Positional(vec![Value::Int(1), Value::Int(2)]),
        );
        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes);
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Request {
                id: Id::Num(7),
                method: "add".to_string(),
                args: Args::Positional(vec![Value::Int(1), Value::Int(2)]),
            }
        );
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn notification_round_trips() {
        let dialect = MsgpackDialect;
        let bytes = dialect.encode_notification("ping", &Args::empty());
        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes);
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Notification {
                method: "ping".to_string(),
                args: Args::empty(),
            }
        );
    }

    #[test]
    fn success_and_error_responses_round_trip() {
        let dialect = MsgpackDialect;
        let ok_bytes = dialect.encode_response(&Id::Num(1), &ResponsePayload::Success(Value::Int(9)));
        let mut decoder = dialect.new_decoder();
        decoder.feed(&ok_bytes);
        assert_eq!(
            decoder.next_frame().unwrap().unwrap(),
            Frame::Response {
                id: Id::Num(1),
                payload: ResponsePayload::Success(Value::Int(9)),
            }
        );

        let err_bytes = dialect.encode_response(
            &Id::Num(2),
            &ResponsePayload::Error(Value::Str("boom".to_string())),
        );
        decoder.feed(&err_bytes);
        assert_eq!(
            decoder.next_frame().unwrap().unwrap(),
            Frame::Response {
                id: Id::Num(2),
                payload: ResponsePayload::Error(Value::Str("boom".to_string())),
            }
        );
    }

    #[test]
    fn partial_bytes_yield_none_until_complete() {
        let dialect = MsgpackDialect;
        let bytes = dialect.encode_request(&Id::Num(1), "m", &Args::empty());
        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes[..bytes.len() - 1]);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.feed(&bytes[bytes.len() - 1..]);
        assert!(decoder.next_frame().unwrap().is_some());
    }

    #[test]
    fn wrong_arity_is_malformed_not_incomplete() {
        let value = rmpv::Value::Array(vec![rmpv::Value::from(0u64), rmpv::Value::from(1u64)]);
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &value).unwrap();
        let mut decoder = MsgpackDialect.new_decoder();
        decoder.feed(&bytes);
        assert!(matches!(decoder.next_frame(), Err(FramingError::Malformed(_))));
    }

    #[test]
    fn a_map_in_the_params_slot_decodes_as_named_args_rather_than_erroring() {
        let value = rmpv::Value::Array(vec![
            rmpv::Value::from(0u64),
            rmpv::Value::from(1u64),
            rmpv::Value::from("concat"),
            rmpv::Value::Map(vec![(rmpv::Value::from("a"), rmpv::Value::from("x"))]),
        ]);
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &value).unwrap();
        let mut decoder = MsgpackDialect.new_decoder();
        decoder.feed(&bytes);
        match decoder.next_frame().unwrap().unwrap() {
            Frame::Request { args, .. } => {
                assert_eq!(args, Args::Named(vec![("a".to_string(), Value::Str("x".to_string()))]));
            }
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[test]
    fn two_frames_back_to_back_decode_in_order() {
        let dialect = MsgpackDialect;
        let mut bytes = dialect.encode_notification("first", &Args::empty());
        bytes.extend(dialect.encode_notification("second", &Args::empty()));
        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes);
        assert_eq!(decoder.next_frame().unwrap().unwrap().method(), Some("first"));
        assert_eq!(decoder.next_frame().unwrap().unwrap().method(), Some("second"));
        assert!(decoder.next_frame().unwrap().is_none());
    }
}
