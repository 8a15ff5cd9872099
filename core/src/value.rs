//! A dialect-agnostic dynamic value.
//!
//! Both supported wire dialects (msgpack-RPC, JSON-RPC 2.0) are implemented
//! over this single representation rather than each carrying its own
//! dynamic-value type. The dispatcher, argument binding, and pending-table
//! completion paths are written once against `Value` and shared; only the
//! wire-level codec modules know how to convert losslessly between `Value`
//! and a dialect's native bytes.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A dynamic value capable of representing every msgpack value and every
/// JSON value. `Bin` only ever appears on the msgpack side; the JSON codec
/// never produces it. There is no dedicated extension-type variant: a
/// decoded msgpack `Ext` becomes a plain `Array(tag, bytes)`, one-way —
/// see the lossy note on `from_msgpack`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bin(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Attempts to interpret this value as a concrete Rust type.
    ///
    /// Conversion failures here are what the binding layer reports as
    /// "incompatible arguments" (§4.1 of the spec).
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, ConversionError> {
        // serde_json::Value is a convenient, total intermediate representation
        // for any `Value` we can construct; round-tripping through it lets us
        // reuse serde's deserializer machinery instead of hand-rolling one.
        let intermediate = self.to_json();
        serde_json::from_value(intermediate).map_err(|e| ConversionError(e.to_string()))
    }

    pub fn from_typed<T: Serialize>(value: &T) -> Result<Value, ConversionError> {
        let json = serde_json::to_value(value).map_err(|e| ConversionError(e.to_string()))?;
        Ok(Value::from_json(json))
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::UInt(u) => serde_json::Value::from(*u),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            // JSON has no binary type; encode as base64-free raw latin1 is
            // lossy, so we surface binary data as an array of byte values
            // instead of silently corrupting it.
            Value::Bin(b) => {
                serde_json::Value::Array(b.iter().map(|&n| serde_json::Value::from(n)).collect())
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(pairs) => {
                let mut obj = serde_json::Map::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = match k {
                        Value::Str(s) => s.clone(),
                        other => other.to_json().to_string(),
                    };
                    obj.insert(key, v.to_json());
                }
                serde_json::Value::Object(obj)
            }
        }
    }

    pub fn from_json(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(obj) => Value::Map(
                obj.into_iter()
                    .map(|(k, v)| (Value::Str(k), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_msgpack(&self) -> rmpv::Value {
        match self {
            Value::Null => rmpv::Value::Nil,
            Value::Bool(b) => rmpv::Value::Boolean(*b),
            Value::Int(i) => rmpv::Value::from(*i),
            Value::UInt(u) => rmpv::Value::from(*u),
            Value::Float(f) => rmpv::Value::from(*f),
            Value::Str(s) => rmpv::Value::from(s.as_str()),
            Value::Bin(b) => rmpv::Value::Binary(b.clone()),
            Value::Array(items) => {
                rmpv::Value::Array(items.iter().map(Value::to_msgpack).collect())
            }
            Value::Map(pairs) => rmpv::Value::Map(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_msgpack(), v.to_msgpack()))
                    .collect(),
            ),
        }
    }

    pub fn from_msgpack(value: rmpv::Value) -> Value {
        match value {
            rmpv::Value::Nil => Value::Null,
            rmpv::Value::Boolean(b) => Value::Bool(b),
            rmpv::Value::Integer(i) => {
                if let Some(i) = i.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = i.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(i.as_f64().unwrap_or_default())
                }
            }
            rmpv::Value::F32(f) => Value::Float(f as f64),
            rmpv::Value::F64(f) => Value::Float(f),
            rmpv::Value::String(s) => Value::Str(s.into_str().unwrap_or_default()),
            rmpv::Value::Binary(b) => Value::Bin(b),
            rmpv::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_msgpack).collect())
            }
            rmpv::Value::Map(pairs) => Value::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (Value::from_msgpack(k), Value::from_msgpack(v)))
                    .collect(),
            ),
            rmpv::Value::Ext(tag, data) => {
                // `Value` has no dedicated extension-type variant, so this
                // is a one-way, lossy decode: the result is an ordinary
                // two-element array and `to_msgpack` has no way to tell it
                // apart from a handler-constructed `[Int, Bin]` array, so it
                // always re-encodes as a plain msgpack array, never as Ext.
                Value::Array(vec![Value::Int(tag as i64), Value::Bin(data)])
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("incompatible argument value: {0}")]
pub struct ConversionError(pub String);
