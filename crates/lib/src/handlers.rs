//! Request handlers: the four RPC entry points (`read`, `write`, `delete`,
//! `subscribe`).
//!
//! This module only validates and decodes the parameter maps a transport
//! hands the engine into the typed requests below; [`crate::ConfigStore`]
//! drives the tree store and subscription registry once a request has
//! been validated. Keeping validation here means the same argument
//! checking applies no matter which transport (HTTP, a local core-bus
//! style dispatcher, direct in-process calls) decoded the wire request.

use std::collections::BTreeMap;

use crate::error::GgConfigError;
use crate::subscription::Handle;
use crate::value::{Path, Value};

/// Maximum path depth accepted from a client. The spec suggests at least
/// 16; picked generously above that so well-formed deep component
/// hierarchies are never rejected in practice.
pub const MAX_PATH_DEPTH: usize = 32;

/// Maximum length, in bytes, of a single path segment.
pub const MAX_SEGMENT_LEN: usize = 256;

/// Maximum size, in bytes, of a leaf's encoded value.
pub const MAX_ENCODED_VALUE_LEN: usize = 64 * 1024;

pub struct ReadRequest {
    pub key_path: Path,
}

pub struct WriteRequest {
    pub key_path: Path,
    pub value: Value,
    pub timestamp_ms: Option<i64>,
}

pub struct DeleteRequest {
    pub key_path: Path,
}

pub struct SubscribeRequest {
    pub key_path: Path,
    pub handle: Handle,
}

/// Parse and validate a `read` request from its decoded param map.
pub fn parse_read(params: &Value) -> Result<ReadRequest, GgConfigError> {
    let key_path = parse_key_path(params)?;
    Ok(ReadRequest { key_path })
}

/// Parse and validate a `write` request. `value` must be present;
/// `timestamp` is optional (the caller supplies wall-clock time when
/// absent). Unlike `read`/`delete`/`subscribe`, `write` additionally
/// requires `path.depth() >= 1` (§4.2): the root itself is never a
/// writable leaf, and a map write at the root is not a supported shape.
pub fn parse_write(params: &Value) -> Result<WriteRequest, GgConfigError> {
    let key_path = parse_key_path(params)?;
    if key_path.is_empty() {
        return Err(GgConfigError::invalid_argument(
            "write: key_path must have at least one segment",
        ));
    }
    let fields = as_map(params)?;

    let value = fields
        .get("value")
        .ok_or_else(|| GgConfigError::invalid_argument("write: missing required field \"value\""))?
        .clone();
    check_value_size(&value)?;

    let timestamp_ms = match fields.get("timestamp") {
        None | Some(Value::Null) => None,
        Some(Value::Int(ts)) => Some(*ts),
        Some(_) => {
            return Err(GgConfigError::invalid_argument(
                "write: \"timestamp\" must be an integer when present",
            ));
        }
    };

    Ok(WriteRequest {
        key_path,
        value,
        timestamp_ms,
    })
}

pub fn parse_delete(params: &Value) -> Result<DeleteRequest, GgConfigError> {
    let key_path = parse_key_path(params)?;
    Ok(DeleteRequest { key_path })
}

pub fn parse_subscribe(params: &Value, handle: Handle) -> Result<SubscribeRequest, GgConfigError> {
    let key_path = parse_key_path(params)?;
    Ok(SubscribeRequest { key_path, handle })
}

fn as_map(params: &Value) -> Result<&BTreeMap<String, Value>, GgConfigError> {
    params
        .as_map()
        .ok_or_else(|| GgConfigError::invalid_argument("request params must be a map"))
}

/// Every handler requires `key_path: List<Bytes>`, where each element is a
/// non-empty segment. Missing, non-list, or non-byte-string elements are
/// `InvalidArgument`; a path exceeding the depth or per-segment length
/// bound is `OutOfRange`. An empty `key_path` (the root) is accepted here
/// — §3 says "the root has the empty path", and `get`/`delete`/`subscribe`
/// have no depth-1 floor; only `write` rejects it, in `parse_write`.
fn parse_key_path(params: &Value) -> Result<Path, GgConfigError> {
    let fields = as_map(params)?;
    let raw = fields
        .get("key_path")
        .ok_or_else(|| GgConfigError::invalid_argument("missing required field \"key_path\""))?;
    let Value::List(items) = raw else {
        return Err(GgConfigError::invalid_argument("\"key_path\" must be a list"));
    };

    if items.len() > MAX_PATH_DEPTH {
        return Err(GgConfigError::out_of_range(format!(
            "key_path depth {} exceeds maximum of {MAX_PATH_DEPTH}",
            items.len()
        )));
    }

    let mut segments = Vec::with_capacity(items.len());
    for item in items {
        let Value::Bytes(bytes) = item else {
            return Err(GgConfigError::invalid_argument(
                "every key_path element must be a byte string",
            ));
        };
        if bytes.is_empty() {
            return Err(GgConfigError::invalid_argument("key_path segments must be non-empty"));
        }
        if bytes.len() > MAX_SEGMENT_LEN {
            return Err(GgConfigError::out_of_range(format!(
                "key_path segment of {} bytes exceeds maximum of {MAX_SEGMENT_LEN}",
                bytes.len()
            )));
        }
        let segment = String::from_utf8(bytes.clone())
            .map_err(|_| GgConfigError::invalid_argument("key_path segments must be valid UTF-8"))?;
        segments.push(segment);
    }

    Ok(Path::from_segments(segments))
}

fn check_value_size(value: &Value) -> Result<(), GgConfigError> {
    let encoded_len = crate::codec::encode(value).len();
    if encoded_len > MAX_ENCODED_VALUE_LEN {
        return Err(GgConfigError::out_of_range(format!(
            "encoded value of {encoded_len} bytes exceeds maximum of {MAX_ENCODED_VALUE_LEN}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(key_path: Vec<&str>, value: Option<Value>, timestamp: Option<i64>) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            "key_path".to_string(),
            Value::List(key_path.into_iter().map(|s| Value::Bytes(s.as_bytes().to_vec())).collect()),
        );
        if let Some(v) = value {
            map.insert("value".to_string(), v);
        }
        if let Some(ts) = timestamp {
            map.insert("timestamp".to_string(), Value::Int(ts));
        }
        Value::Map(map)
    }

    #[test]
    fn read_requires_key_path() {
        let err = parse_read(&Value::Map(BTreeMap::new())).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidArgument);
    }

    #[test]
    fn read_parses_valid_key_path() {
        let req = parse_read(&params(vec!["a", "b"], None, None)).unwrap();
        assert_eq!(req.key_path, Path::from_segments(["a", "b"]));
    }

    #[test]
    fn write_requires_value_field() {
        let err = parse_write(&params(vec!["a"], None, None)).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidArgument);
    }

    #[test]
    fn write_defaults_timestamp_to_none() {
        let req = parse_write(&params(vec!["a"], Some(Value::Int(1)), None)).unwrap();
        assert_eq!(req.timestamp_ms, None);
    }

    #[test]
    fn write_accepts_explicit_timestamp() {
        let req = parse_write(&params(vec!["a"], Some(Value::Int(1)), Some(42))).unwrap();
        assert_eq!(req.timestamp_ms, Some(42));
    }

    #[test]
    fn key_path_depth_over_bound_is_out_of_range() {
        let too_deep: Vec<&str> = vec!["seg"; MAX_PATH_DEPTH + 1];
        let err = parse_read(&params(too_deep, None, None)).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::OutOfRange);
    }

    #[test]
    fn empty_key_path_addresses_the_root_for_read_delete_and_subscribe() {
        assert_eq!(parse_read(&params(vec![], None, None)).unwrap().key_path, Path::root());
        assert_eq!(parse_delete(&params(vec![], None, None)).unwrap().key_path, Path::root());
        assert_eq!(
            parse_subscribe(&params(vec![], None, None), Handle(1)).unwrap().key_path,
            Path::root()
        );
    }

    #[test]
    fn empty_key_path_is_invalid_argument_for_write() {
        let err = parse_write(&params(vec![], Some(Value::Int(1)), None)).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidArgument);
    }

    #[test]
    fn non_list_key_path_is_invalid_argument() {
        let mut map = BTreeMap::new();
        map.insert("key_path".to_string(), Value::Int(5));
        let err = parse_read(&Value::Map(map)).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidArgument);
    }
}
