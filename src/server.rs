//! MCP JSON-RPC endpoint over HTTP.
//!
//! Handles `initialize`, `tools/list`, `tools/call` and `ping` on `POST /mcp`.
//! Notifications (messages without an `id`) are acknowledged with `202`.

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::handlers::{tool_definitions, Dashboard, ToolCallError};

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("{0}")]
    InvalidParams(String),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
        }
    }
}

impl From<ToolCallError> for RpcError {
    fn from(e: ToolCallError) -> Self {
        Self::InvalidParams(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn failure(id: Value, error: &RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": error.code(), "message": error.to_string() }
    })
}

/// Handle one raw JSON-RPC message. Returns `None` for notifications.
pub async fn handle_message(dashboard: &Dashboard, body: &[u8]) -> Option<Value> {
    let raw: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => return Some(failure(Value::Null, &RpcError::Parse(e.to_string()))),
    };

    let request: RpcRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => {
            return Some(failure(
                Value::Null,
                &RpcError::InvalidRequest(e.to_string()),
            ))
        }
    };

    let Some(id) = request.id else {
        log::debug!("MCP: notification {}", request.method);
        return None;
    };

    match dispatch(dashboard, &request.method, request.params).await {
        Ok(result) => Some(success(id, result)),
        Err(e) => {
            log::warn!("MCP: {} failed: {}", request.method, e);
            Some(failure(id, &e))
        }
    }
}

async fn dispatch(dashboard: &Dashboard, method: &str, params: Value) -> Result<Value, RpcError> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tool_definitions() })),
        "tools/call" => {
            let params: CallParams = serde_json::from_value(params)
                .map_err(|e| RpcError::InvalidParams(e.to_string()))?;
            let output = dashboard.call_tool(&params.name, params.arguments).await?;
            let text = serde_json::to_string(&output.value)
                .map_err(|e| RpcError::InvalidParams(e.to_string()))?;

            Ok(json!({
                "content": [{ "type": "text", "text": text }],
                "structuredContent": output.value,
                "isError": output.is_error
            }))
        }
        other => Err(RpcError::MethodNotFound(other.to_string())),
    }
}

async fn mcp_handler(State(dashboard): State<Arc<Dashboard>>, body: Bytes) -> Response {
    match handle_message(&dashboard, &body).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(dashboard: Dashboard) -> Router {
    Router::new()
        .route("/mcp", post(mcp_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(dashboard))
}

/// Bind and serve until Ctrl+C.
pub async fn serve(config: &ServerConfig, dashboard: Dashboard) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    log::info!("Smart Life Dashboard MCP server listening on http://{}/mcp", addr);

    axum::serve(listener, router(dashboard))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await
        .context("Server error")?;

    log::info!("Server stopped");
    Ok(())
}
