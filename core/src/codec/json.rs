//! The JSON-RPC 2.0 dialect (§3, §4.2).
//!
//! Unlike msgpack, JSON carries no length prefix, so the incremental
//! decoder has to find a message boundary itself: it scans byte by byte,
//! tracking bracket depth and whether it's inside a quoted string (and
//! whether the next character in that string is escaped), and declares a
//! frame complete the moment depth returns to zero. No batch arrays (§3
//! Non-goals): a frame is always a single top-level JSON object.

use serde_json::{Map, Value as Json};

use super::{Dialect, FramingError, IncrementalDecoder};
use crate::frame::{Args, Frame, Id, ResponsePayload};
use crate::value::Value;

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonDialect;

impl Dialect for JsonDialect {
    fn supports_named_arguments(&self) -> bool {
        true
    }

    fn encode_request(&self, id: &Id, method: &str, args: &Args) -> Vec<u8> {
        let mut obj = Map::new();
        obj.insert("jsonrpc".to_string(), Json::String("2.0".to_string()));
        obj.insert("id".to_string(), encode_id(id));
        obj.insert("method".to_string(), Json::String(method.to_string()));
        obj.insert("params".to_string(), encode_args(args));
        to_bytes(Json::Object(obj))
    }

    fn encode_notification(&self, method: &str, args: &Args) -> Vec<u8> {
        let mut obj = Map::new();
        obj.insert("jsonrpc".to_string(), Json::String("2.0".to_string()));
        obj.insert("method".to_string(), Json::String(method.to_string()));
        obj.insert("params".to_string(), encode_args(args));
        to_bytes(Json::Object(obj))
    }

    fn encode_response(&self, id: &Id, payload: &ResponsePayload) -> Vec<u8> {
        let mut obj = Map::new();
        obj.insert("jsonrpc".to_string(), Json::String("2.0".to_string()));
        obj.insert("id".to_string(), encode_id(id));
        match payload {
            ResponsePayload::Success(v) => {
                obj.insert("result".to_string(), v.to_json());
            }
            ResponsePayload::Error(v) => {
                obj.insert("error".to_string(), encode_error(v));
            }
        }
        to_bytes(Json::Object(obj))
    }

    fn new_decoder(&self) -> Box<dyn IncrementalDecoder> {
        Box::new(JsonDecoder::default())
    }
}

fn to_bytes(value: Json) -> Vec<u8> {
    serde_json::to_vec(&value).expect("serde_json::Value always serializes")
}

fn encode_id(id: &Id) -> Json {
    match id {
        Id::Num(n) => Json::from(*n),
        Id::Str(s) => Json::String(s.clone()),
        Id::Null => Json::Null,
    }
}

fn decode_id(value: &Json) -> Result<Id, FramingError> {
    match value {
        Json::Number(n) => n
            .as_u64()
            .map(Id::Num)
            .ok_or_else(|| FramingError::Malformed("id number must be a non-negative integer".to_string())),
        Json::String(s) => Ok(Id::Str(s.clone())),
        Json::Null => Ok(Id::Null),
        other => Err(FramingError::Malformed(format!("unsupported id type: {other}"))),
    }
}

fn encode_args(args: &Args) -> Json {
    match args {
        Args::Positional(values) => Json::Array(values.iter().map(Value::to_json).collect()),
        Args::Named(pairs) => {
            let mut obj = Map::with_capacity(pairs.len());
            for (k, v) in pairs {
                obj.insert(k.clone(), v.to_json());
            }
            Json::Object(obj)
        }
    }
}

/// Wraps a handler-supplied error value into the `{code, message, data}`
/// envelope JSON-RPC 2.0 requires for the `error` member (§4.1, §6). Every
/// framework-generated error uses code `-32000`; `message` mirrors `data`
/// when it's already a string, else falls back to a fixed placeholder, and
/// `data` always carries the original value so a peer built against this
/// crate can recover it losslessly on decode.
fn encode_error(value: &Value) -> Json {
    let message = match value {
        Value::Str(s) => s.clone(),
        _ => "Unknown error".to_string(),
    };
    let mut obj = Map::new();
    obj.insert("code".to_string(), Json::from(-32000));
    obj.insert("message".to_string(), Json::String(message));
    obj.insert("data".to_string(), value.to_json());
    Json::Object(obj)
}

/// Recovers the original error [`Value`] from a decoded `error` member.
/// Prefers the `data` field (what [`encode_error`] puts the real payload
/// in); falls back to the whole object for peers that don't follow that
/// convention, so a bare `{"code":-32000,"message":"boom"}` from a
/// different implementation still decodes to something rather than
/// erroring.
fn decode_error(value: Json) -> Value {
    match value {
        Json::Object(mut obj) => match obj.remove("data") {
            Some(data) => Value::from_json(data),
            None => Value::from_json(Json::Object(obj)),
        },
        other => Value::from_json(other),
    }
}

fn decode_args(value: Option<&Json>) -> Result<Args, FramingError> {
    match value {
        None => Ok(Args::empty()),
        Some(Json::Array(items)) => Ok(Args::Positional(items.iter().cloned().map(Value::from_json).collect())),
        Some(Json::Object(obj)) => Ok(Args::Named(
            obj.iter().map(|(k, v)| (k.clone(), Value::from_json(v.clone()))).collect(),
        )),
        // Scalar params (a bare number, string, or bool) are rejected
        // rather than coerced into a one-element positional list: doing so
        // silently would make it ambiguous whether a handler expecting one
        // argument was called with `"params": 5` or `"params": [5]`.
        Some(other) => Err(FramingError::Malformed(format!(
            "params must be an array or object, got {other}"
        ))),
    }
}

fn decode_frame(value: Json) -> Result<Frame, FramingError> {
    let mut obj = match value {
        Json::Object(obj) => obj,
        other => return Err(FramingError::Malformed(format!("expected a JSON object frame, got {other}"))),
    };

    match obj.get("jsonrpc") {
        Some(Json::String(v)) if v == "2.0" => {}
        _ => return Err(FramingError::Malformed("missing or invalid \"jsonrpc\" version".to_string())),
    }

    if let Some(method) = obj.get("method") {
        let method = method
            .as_str()
            .ok_or_else(|| FramingError::Malformed("\"method\" must be a string".to_string()))?
            .to_string();
        let args = decode_args(obj.get("params"))?;
        // §3/§4.1: `id` absent OR null both mean notification, not just absent.
        match obj.get("id") {
            Some(Json::Null) | None => Ok(Frame::Notification { method, args }),
            Some(id_value) => Ok(Frame::Request {
                id: decode_id(id_value)?,
                method,
                args,
            }),
        }
    } else {
        let id = obj.get("id").map(decode_id).transpose()?.unwrap_or(Id::Null);
        match (obj.remove("result"), obj.remove("error")) {
            (Some(result), None) => Ok(Frame::Response {
                id,
                payload: ResponsePayload::Success(Value::from_json(result)),
            }),
            (None, Some(error)) => Ok(Frame::Response {
                id,
                payload: ResponsePayload::Error(decode_error(error)),
            }),
            _ => Err(FramingError::Malformed(
                "response must carry exactly one of \"result\"/\"error\"".to_string(),
            )),
        }
    }
}

#[derive(Default)]
struct JsonDecoder {
    buf: Vec<u8>,
}

impl IncrementalDecoder for JsonDecoder {
    fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, FramingError> {
        let start = match self.buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(i) => i,
            None => {
                self.buf.clear();
                return Ok(None);
            }
        };

        let end = match scan_balanced(&self.buf[start..]) {
            Some(len) => start + len,
            None => return Ok(None),
        };

        let slice = &self.buf[start..end];
        let value: Json = serde_json::from_slice(slice).map_err(|e| FramingError::Malformed(e.to_string()))?;
        let frame = decode_frame(value)?;
        self.buf.drain(..end);
        Ok(Some(frame))
    }
}

/// Finds the end (exclusive, relative to `buf`'s start) of the first
/// complete, brace-balanced JSON value in `buf`, or `None` if `buf` holds
/// only a prefix of one. Tracks string state so braces and brackets inside
/// quoted text are never mistaken for structural ones.
fn scan_balanced(buf: &[u8]) -> Option<usize> {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in buf.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth -= 1,
            _ => {}
        }

        if depth == 0 {
            return Some(i + 1);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let dialect = JsonDialect;
        let bytes = dialect.encode_request(
            &Id::Num(1),
            "add",
            &Args::Positional(vec![Value::Int(1), Value::Int(2)]),
        );
        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes);
        assert_eq!(
            decoder.next_frame().unwrap().unwrap(),
            Frame::Request {
                id: Id::Num(1),
                method: "add".to_string(),
                args: Args::Positional(vec![Value::Int(1), Value::Int(2)]),
            }
        );
    }

    #[test]
    fn named_params_round_trip() {
        let dialect = JsonDialect;
        let bytes = dialect.encode_request(
            &Id::Str("a".to_string()),
            "greet",
            &Args::Named(vec![("name".to_string(), Value::Str("ferris".to_string()))]),
        );
        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes);
        let frame = decoder.next_frame().unwrap().unwrap();
        match frame {
            Frame::Request { id, args, .. } => {
                assert_eq!(id, Id::Str("a".to_string()));
                assert_eq!(
                    args,
                    Args::Named(vec![("name".to_string(), Value::Str("ferris".to_string()))])
                );
            }
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[test]
    fn missing_id_is_a_notification() {
        let dialect = JsonDialect;
        let bytes = dialect.encode_notification("ping", &Args::empty());
        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes);
        assert_eq!(
            decoder.next_frame().unwrap().unwrap(),
            Frame::Notification {
                method: "ping".to_string(),
                args: Args::empty(),
            }
        );
    }

    #[test]
    fn explicit_null_id_is_a_notification_too() {
        let dialect = JsonDialect;
        let mut decoder = dialect.new_decoder();
        decoder.feed(br#"{"jsonrpc":"2.0","id":null,"method":"ping","params":[]}"#);
        assert_eq!(
            decoder.next_frame().unwrap().unwrap(),
            Frame::Notification {
                method: "ping".to_string(),
                args: Args::empty(),
            }
        );
    }

    #[test]
    fn responses_round_trip() {
        let dialect = JsonDialect;
        let ok = dialect.encode_response(&Id::Num(1), &ResponsePayload::Success(Value::Int(5)));
        let mut decoder = dialect.new_decoder();
        decoder.feed(&ok);
        assert_eq!(
            decoder.next_frame().unwrap().unwrap(),
            Frame::Response {
                id: Id::Num(1),
                payload: ResponsePayload::Success(Value::Int(5)),
            }
        );
    }

    #[test]
    fn error_responses_round_trip_through_the_code_message_data_envelope() {
        let dialect = JsonDialect;
        let bytes = dialect.encode_response(
            &Id::Num(2),
            &ResponsePayload::Error(Value::Str("boom".to_string())),
        );
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"code\":-32000"));
        assert!(text.contains("\"message\":\"boom\""));

        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes);
        assert_eq!(
            decoder.next_frame().unwrap().unwrap(),
            Frame::Response {
                id: Id::Num(2),
                payload: ResponsePayload::Error(Value::Str("boom".to_string())),
            }
        );
    }

    #[test]
    fn non_string_error_payload_gets_the_unknown_error_message() {
        let dialect = JsonDialect;
        let bytes = dialect.encode_response(
            &Id::Num(3),
            &ResponsePayload::Error(Value::Map(vec![(Value::Str("why".into()), Value::Int(1))])),
        );
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"message\":\"Unknown error\""));

        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes);
        assert_eq!(
            decoder.next_frame().unwrap().unwrap(),
            Frame::Response {
                id: Id::Num(3),
                payload: ResponsePayload::Error(Value::Map(vec![(Value::Str("why".into()), Value::Int(1))])),
            }
        );
    }

    #[test]
    fn scalar_params_are_rejected() {
        let dialect = JsonDialect;
        let mut decoder = dialect.new_decoder();
        decoder.feed(br#"{"jsonrpc":"2.0","id":1,"method":"m","params":5}"#);
        assert!(matches!(decoder.next_frame(), Err(FramingError::Malformed(_))));
    }

    #[test]
    fn a_top_level_array_waits_for_the_matching_closer_before_being_rejected() {
        // The stream-level scanner is shape-agnostic (tracks `{`/`[` depth
        // alike); a top-level array is only rejected once fully buffered,
        // by `decode_frame`, not short-circuited on its first byte.
        let dialect = JsonDialect;
        let mut decoder = dialect.new_decoder();
        decoder.feed(br#"[1, 2"#);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.feed(br#"]"#);
        assert!(matches!(decoder.next_frame(), Err(FramingError::Malformed(_))));
    }

    #[test]
    fn partial_message_is_not_yet_ready() {
        let dialect = JsonDialect;
        let full = dialect.encode_request(&Id::Num(1), "m", &Args::empty());
        let mut decoder = dialect.new_decoder();
        decoder.feed(&full[..full.len() - 3]);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.feed(&full[full.len() - 3..]);
        assert!(decoder.next_frame().unwrap().is_some());
    }

    #[test]
    fn braces_inside_string_values_do_not_confuse_the_scanner() {
        let dialect = JsonDialect;
        let bytes = dialect.encode_request(
            &Id::Num(1),
            "echo",
            &Args::Positional(vec![Value::Str(r#"{"nested": "}\""#.to_string())]),
        );
        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes);
        let frame = decoder.next_frame().unwrap().unwrap();
        match frame {
            Frame::Request { args, .. } => {
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected a request, got {other:?}"),
        }
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn two_messages_back_to_back_decode_in_order() {
        let dialect = JsonDialect;
        let mut bytes = dialect.encode_notification("first", &Args::empty());
        bytes.extend(dialect.encode_notification("second", &Args::empty()));
        let mut decoder = dialect.new_decoder();
        decoder.feed(&bytes);
        assert_eq!(decoder.next_frame().unwrap().unwrap().method(), Some("first"));
        assert_eq!(decoder.next_frame().unwrap().unwrap().method(), Some("second"));
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn response_with_both_result_and_error_is_malformed() {
        let dialect = JsonDialect;
        let mut decoder = dialect.new_decoder();
        decoder.feed(br#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":-32000,"message":"x"}}"#);
        assert!(matches!(decoder.next_frame(), Err(FramingError::Malformed(_))));
    }
}
