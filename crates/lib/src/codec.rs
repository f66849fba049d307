//! Self-describing JSON codec for [`Value`].
//!
//! Every encoded value carries its own type tag, so decoding never has to
//! infer (and thus never silently widens or narrows) a type. Integers and
//! floats are always written as nested objects for this reason: a bare
//! JSON number is ambiguous between the two once it round-trips through a
//! generic `serde_json::Value`.

use std::collections::BTreeMap;

use base64ct::{Base64, Encoding};
use serde_json::{Map as JsonMap, Value as Json};

use crate::value::Value;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("malformed encoded value: {reason}")]
    Malformed { reason: String },

    #[error("invalid base64 in bytes value: {0}")]
    InvalidBase64(String),

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::Malformed { .. } | CodecError::InvalidBase64(_))
    }
}

/// Parse a request parameter payload (already-decoded JSON text) into a [`Value`].
pub fn decode(text: &str) -> Result<Value, CodecError> {
    let json: Json = serde_json::from_str(text)?;
    decode_json(&json)
}

pub fn encode(value: &Value) -> String {
    serde_json::to_string(&encode_json(value)).expect("Value encodes to valid JSON")
}

pub fn decode_json(json: &Json) -> Result<Value, CodecError> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Object(obj) => decode_tagged_object(obj),
        other => Err(CodecError::Malformed {
            reason: format!("expected null, bool, or a single-key tagged object, got {other}"),
        }),
    }
}

fn decode_tagged_object(obj: &JsonMap<String, Json>) -> Result<Value, CodecError> {
    if obj.len() != 1 {
        return Err(CodecError::Malformed {
            reason: format!("tagged value object must have exactly one key, got {}", obj.len()),
        });
    }
    let (tag, payload) = obj.iter().next().expect("checked len == 1");
    match tag.as_str() {
        "int" => payload
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| CodecError::Malformed {
                reason: "\"int\" payload is not an i64".to_string(),
            }),
        "float" => payload
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| CodecError::Malformed {
                reason: "\"float\" payload is not a number".to_string(),
            }),
        "bytes" => {
            let s = payload.as_str().ok_or_else(|| CodecError::Malformed {
                reason: "\"bytes\" payload is not a string".to_string(),
            })?;
            let decoded = Base64::decode_vec(s).map_err(|e| CodecError::InvalidBase64(e.to_string()))?;
            Ok(Value::Bytes(decoded))
        }
        "list" => {
            let arr = payload.as_array().ok_or_else(|| CodecError::Malformed {
                reason: "\"list\" payload is not an array".to_string(),
            })?;
            let items = arr.iter().map(decode_json).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(items))
        }
        "map" => {
            let map = payload.as_object().ok_or_else(|| CodecError::Malformed {
                reason: "\"map\" payload is not an object".to_string(),
            })?;
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), decode_json(v)?);
            }
            Ok(Value::Map(out))
        }
        other => Err(CodecError::Malformed {
            reason: format!("unknown type tag \"{other}\""),
        }),
    }
}

pub fn encode_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => tagged("int", Json::from(*i)),
        Value::Float(f) => tagged("float", Json::from(*f)),
        Value::Bytes(b) => tagged("bytes", Json::String(Base64::encode_string(b))),
        Value::List(items) => tagged("list", Json::Array(items.iter().map(encode_json).collect())),
        Value::Map(map) => {
            let mut obj = JsonMap::new();
            for (k, v) in map {
                obj.insert(k.clone(), encode_json(v));
            }
            tagged("map", Json::Object(obj))
        }
    }
}

fn tagged(tag: &str, payload: Json) -> Json {
    let mut obj = JsonMap::new();
    obj.insert(tag.to_string(), payload);
    Json::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_variants() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        map.insert("b".to_string(), Value::List(vec![Value::Bool(true), Value::Null]));
        let value = Value::Map(map);

        let encoded = encode(&value);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn int_and_float_stay_distinct() {
        let encoded_int = encode(&Value::Int(5));
        let encoded_float = encode(&Value::Float(5.0));
        assert_ne!(encoded_int, encoded_float);
        assert_eq!(decode(&encoded_int).unwrap(), Value::Int(5));
        assert_eq!(decode(&encoded_float).unwrap(), Value::Float(5.0));
    }

    #[test]
    fn rejects_bare_number() {
        let err = decode("5").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn bytes_round_trip_through_base64() {
        let value = Value::Bytes(vec![0, 1, 2, 255]);
        let encoded = encode(&value);
        assert_eq!(decode(&encoded).unwrap(), value);
    }
}
