//! `serve` — runs the gg_config RPC server over HTTP.
//!
//! The wire format here is this binary's own business: the engine only
//! consumes decoded `(method, params)` pairs and emits decoded responses,
//! per the scope note that RPC transport and wire encoding are external
//! collaborators. This module picks a plain JSON-RPC-style POST endpoint
//! for `read`/`write`/`delete`, and a WebSocket for `subscribe`'s stream
//! of mutated paths.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json_;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use ggconfig::codec;
use ggconfig::value::Value;
use ggconfig::{ConfigStore, GgConfigError, Handle};

use crate::backend::create_backend;
use crate::cli::ServeArgs;

#[derive(Clone)]
struct AppState {
    store: ConfigStore,
    next_handle: Arc<AtomicU32>,
}

impl AppState {
    fn allocate_handle(&self) -> Handle {
        Handle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Deserialize)]
struct RpcRequest {
    method: String,
    #[serde(default = "default_params")]
    params: Json_,
}

fn default_params() -> Json_ {
    Json_::Object(serde_json::Map::new())
}

#[derive(Serialize)]
#[serde(untagged)]
enum RpcResponse {
    Ok { result: Json_ },
    Err { error: ErrorBody },
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

pub async fn run(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ggconfig=info".parse().unwrap()))
        .init();

    let persistence = create_backend(&args.backend_config).await?;
    let store = ConfigStore::open(persistence).await?;
    tracing::info!("gg_config store opened");

    let state = AppState {
        store,
        next_handle: Arc::new(AtomicU32::new(1)),
    };

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .route("/ws/subscribe", get(handle_subscribe_upgrade))
        .with_state(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    println!("gg_config listening on http://{local_addr}");
    println!("  POST /rpc           - read / write / delete");
    println!("  GET  /ws/subscribe  - subscribe stream");
    println!("  GET  /health        - health check");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("gg_config shut down");
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
    }
}

async fn handle_health() -> Json<Json_> {
    Json(serde_json::json!({ "status": "healthy", "service": ggconfig::SERVICE_NAME }))
}

async fn handle_rpc(State(state): State<AppState>, Json(request): Json<RpcRequest>) -> Json<RpcResponse> {
    let outcome = dispatch(&state, &request.method, &request.params).await;
    Json(match outcome {
        Ok(value) => RpcResponse::Ok { result: value },
        Err(err) => RpcResponse::Err {
            error: ErrorBody {
                code: err.code.as_str().to_string(),
                message: err.message,
            },
        },
    })
}

async fn dispatch(state: &AppState, method: &str, params: &Json_) -> Result<Json_, GgConfigError> {
    let params = params_to_value(params)?;
    match method {
        "read" => {
            let value = state.store.handle_read(&params).await?;
            Ok(codec::encode_json(&value))
        }
        "write" => {
            state.store.handle_write(&params).await?;
            Ok(Json_::Null)
        }
        "delete" => {
            state.store.handle_delete(&params).await?;
            Ok(Json_::Null)
        }
        "subscribe" => Err(GgConfigError::invalid_argument(
            "subscribe is only available over GET /ws/subscribe",
        )),
        other => Err(GgConfigError::invalid_argument(format!("unknown method \"{other}\""))),
    }
}

/// Convert this transport's JSON request body into the decoded param map
/// the engine's request handlers expect: `key_path` as a list of
/// UTF-8 segments, `value` via the tagged-value codec, `timestamp` as a
/// plain integer.
fn params_to_value(params: &Json_) -> Result<Value, GgConfigError> {
    let obj = params
        .as_object()
        .ok_or_else(|| GgConfigError::invalid_argument("params must be a JSON object"))?;
    let mut map = std::collections::BTreeMap::new();

    if let Some(key_path) = obj.get("key_path") {
        let items = key_path
            .as_array()
            .ok_or_else(|| GgConfigError::invalid_argument("\"key_path\" must be an array"))?;
        let mut segments = Vec::with_capacity(items.len());
        for item in items {
            let s = item
                .as_str()
                .ok_or_else(|| GgConfigError::invalid_argument("key_path elements must be strings"))?;
            segments.push(Value::Bytes(s.as_bytes().to_vec()));
        }
        map.insert("key_path".to_string(), Value::List(segments));
    }

    if let Some(value) = obj.get("value") {
        map.insert("value".to_string(), codec::decode_json(value)?);
    }

    if let Some(ts) = obj.get("timestamp") {
        let ts = ts
            .as_i64()
            .ok_or_else(|| GgConfigError::invalid_argument("\"timestamp\" must be an integer"))?;
        map.insert("timestamp".to_string(), Value::Int(ts));
    }

    Ok(Value::Map(map))
}

async fn handle_subscribe_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_subscription(socket, state))
}

/// The client's first text frame is `{"key_path": [...]}`. From then on
/// the server only sends: one JSON path array per mutation.
async fn run_subscription(mut socket: WebSocket, state: AppState) {
    let Some(Ok(Message::Text(text))) = socket.recv().await else {
        let _ = socket
            .send(Message::Text(error_frame("expected a key_path text frame to open the subscription").into()))
            .await;
        return;
    };

    let requested: Json_ = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            let _ = socket.send(Message::Text(error_frame(&e.to_string()).into())).await;
            return;
        }
    };

    let params = match params_to_value(&requested) {
        Ok(p) => p,
        Err(e) => {
            let _ = socket.send(Message::Text(error_frame(&e.message).into())).await;
            return;
        }
    };

    let handle = state.allocate_handle();
    let mut receiver = match state.store.handle_subscribe(&params, handle).await {
        Ok(rx) => rx,
        Err(e) => {
            let _ = socket.send(Message::Text(error_frame(&e.message).into())).await;
            return;
        }
    };

    let _ = socket.send(Message::Text(serde_json::json!({"subscribed": true}).to_string().into())).await;

    loop {
        tokio::select! {
            notification = receiver.recv() => {
                let Some(notification) = notification else { break };
                let segments: Vec<&str> = notification.path.segments().iter().map(String::as_str).collect();
                let frame = serde_json::json!({ "path": segments }).to_string();
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                if incoming.is_none() {
                    break;
                }
            }
        }
    }

    state.store.unsubscribe(handle).await;
}

fn error_frame(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}
