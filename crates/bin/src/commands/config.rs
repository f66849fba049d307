//! `config get` / `config set` / `config delete` — direct, serverless access
//! to the local store. The debug-client analogue of a standalone RPC
//! caller: talks straight to a freshly-opened [`ggconfig::ConfigStore`]
//! instead of going over the wire.

use ggconfig::value::{Path, Value};
use ggconfig::ConfigStore;

use crate::backend::create_backend;
use crate::cli::{ConfigDeleteArgs, ConfigGetArgs, ConfigSetArgs};
use crate::output::OutputFormat;

async fn open_store(backend_config: &crate::cli::BackendConfig) -> Result<ConfigStore, Box<dyn std::error::Error>> {
    let persistence = create_backend(backend_config).await?;
    Ok(ConfigStore::open(persistence).await?)
}

fn parse_path(path: &str) -> Path {
    Path::from_segments(path.split('/').filter(|seg| !seg.is_empty()))
}

pub async fn get(args: &ConfigGetArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&args.backend_config).await?;
    let value = store.read(&parse_path(&args.path)).await?;

    match format {
        OutputFormat::Human => println!("{}", describe(&value)),
        OutputFormat::Json => println!("{}", ggconfig::codec::encode_json(&value)),
    }
    Ok(())
}

pub async fn set(args: &ConfigSetArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&args.backend_config).await?;
    let value = parse_scalar(&args.value);
    store.write(&parse_path(&args.path), value, args.timestamp).await?;
    Ok(())
}

pub async fn delete(args: &ConfigDeleteArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&args.backend_config).await?;
    store.delete(&parse_path(&args.path)).await?;
    Ok(())
}

/// Accept plain JSON when it parses (so `set path 42` writes an int and
/// `set path '{"a": 1}'` writes a map), and fall back to a raw UTF-8
/// string otherwise. This is a CLI convenience, not the wire codec: there
/// is no type tag ambiguity here because there is no round trip to guard.
fn parse_scalar(raw: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => json_to_value(&json),
        Err(_) => Value::Bytes(raw.as_bytes().to_vec()),
    }
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Bytes(s.as_bytes().to_vec()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            let mut map = std::collections::BTreeMap::new();
            for (k, v) in obj {
                map.insert(k.clone(), json_to_value(v));
            }
            Value::Map(map)
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bytes(b) => String::from_utf8(b.clone()).unwrap_or_else(|_| format!("{b:?}")),
        Value::List(items) => format!("[{}]", items.iter().map(describe).collect::<Vec<_>>().join(", ")),
        Value::Map(map) => {
            let entries: Vec<String> = map.iter().map(|(k, v)| format!("{k}: {}", describe(v))).collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}
