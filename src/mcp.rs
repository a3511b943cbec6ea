use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::error::{Result, SumoSearchError};
use crate::model::{SearchOutcome, SearchRequest};
use crate::search::SearchEngine;

pub const SEARCH_TOOL: &str = "search_sumologic";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub async fn run_stdio(engine: Arc<SearchEngine>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve_lines(&engine, stdin, stdout).await
}

/// 逐行读取 JSON-RPC 请求并逐行写出响应；通知（无 id）不产生响应。
pub async fn serve_lines<R, W>(engine: &SearchEngine, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: RpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!("unparsable request line: {e}");
                let resp = error_response(Value::Null, -32700, format!("parse error: {e}"));
                write_response(&mut writer, &resp).await?;
                continue;
            }
        };

        if let Some(resp) = process_request(engine, req).await {
            write_response(&mut writer, &resp).await?;
        }
    }

    Ok(())
}

pub async fn process_request(engine: &SearchEngine, req: RpcRequest) -> Option<RpcResponse> {
    debug!("rpc request: method={}", req.method);
    let method = req.method.clone();
    // 通知（无 id）不回复，包括未识别的 notifications/*。
    if req.id.is_null() && method.starts_with("notifications/") {
        return None;
    }
    let resp = match method.as_str() {
        "initialize" => handle_initialize(&req),
        "notifications/initialized" => ok_response(req.id, Value::Bool(true)),
        "ping" => ok_response(req.id, json!({})),
        "tools/list" | "list_tools" => ok_response(req.id, json!({ "tools": tool_definitions() })),
        "tools/call" => handle_tool_call(engine, req).await,
        SEARCH_TOOL => handle_search(engine, req).await,
        _ => error_response(req.id, -32601, format!("method not found: {method}")),
    };
    Some(resp)
}

fn handle_initialize(req: &RpcRequest) -> RpcResponse {
    ok_response(
        req.id.clone(),
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        }),
    )
}

async fn handle_tool_call(engine: &SearchEngine, req: RpcRequest) -> RpcResponse {
    let params: ToolCallParams = match serde_json::from_value(req.params) {
        Ok(p) => p,
        Err(e) => return error_response(req.id, -32602, format!("invalid params: {e}")),
    };
    if params.name != SEARCH_TOOL {
        return error_response(req.id, -32602, format!("unknown tool: {}", params.name));
    }
    let request = match parse_search_request(params.arguments) {
        Ok(r) => r,
        Err(e) => return error_response(req.id, -32602, e.to_string()),
    };

    let outcome = engine.search(request).await;
    let (text, is_error) = match &outcome {
        SearchOutcome::Success(result) => (serde_json::to_string_pretty(result), false),
        failure => (serde_json::to_string_pretty(failure), true),
    };
    let text = text.unwrap_or_else(|e| format!("{{\"error\":\"serialize failed: {e}\"}}"));
    ok_response(
        req.id,
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error
        }),
    )
}

async fn handle_search(engine: &SearchEngine, req: RpcRequest) -> RpcResponse {
    let request = match parse_search_request(req.params) {
        Ok(r) => r,
        Err(e) => return error_response(req.id, -32602, e.to_string()),
    };
    match engine.search(request).await {
        SearchOutcome::Success(result) => {
            ok_response(req.id, serde_json::to_value(result).unwrap_or(Value::Null))
        }
        SearchOutcome::Failure { kind, message } => {
            error_response(req.id, -32002, format!("{kind}: {message}"))
        }
    }
}

fn parse_search_request(params: Value) -> Result<SearchRequest> {
    let request: SearchRequest = serde_json::from_value(params)
        .map_err(|e| SumoSearchError::InvalidRequest(format!("invalid params: {e}")))?;
    if request.query.trim().is_empty() {
        return Err(SumoSearchError::InvalidRequest("query must not be empty".into()));
    }
    Ok(request)
}

pub fn tool_definitions() -> Vec<Value> {
    vec![json!({
        "name": SEARCH_TOOL,
        "description": "Search Sumo Logic logs. Sensitive values in _raw and response fields are masked.",
        "inputSchema": {
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": { "type": "string", "description": "Sumo Logic search query" },
                "from": { "type": "string", "description": "ISO 8601 format" },
                "to": { "type": "string", "description": "ISO 8601 format" }
            }
        }
    })]
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, resp: &RpcResponse) -> Result<()> {
    let line = serde_json::to_string(resp).unwrap_or_else(|_| "{}".to_string());
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

fn ok_response(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

fn error_response(id: Value, code: i32, message: String) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError { code, message }),
    }
}
