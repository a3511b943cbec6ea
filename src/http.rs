use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, SumoSearchError};
use crate::mcp::{process_request, RpcRequest};
use crate::model::{FailureKind, SearchOutcome, SearchRequest};
use crate::search::SearchEngine;

type Sessions = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Event>>>>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub sessions: Sessions,
}

impl AppState {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self {
            engine,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// 随 SSE 流一起释放，客户端断开时移除会话。
struct SessionGuard {
    id: String,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        info!("sse session {} closed", self.id);
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<FailureKind>,
}

impl ErrorResponse {
    fn bad_request(error: String) -> axum::response::Response {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse { error, kind: None })).into_response()
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn search_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => return ErrorResponse::bad_request(format!("invalid request body: {e}")),
    };
    if req.query.trim().is_empty() {
        return ErrorResponse::bad_request("query must not be empty".into());
    }

    match state.engine.search(req).await {
        SearchOutcome::Success(result) => (StatusCode::OK, Json(result)).into_response(),
        SearchOutcome::Failure { kind, message } => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: message,
                kind: Some(kind),
            }),
        )
            .into_response(),
    }
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let session_id = format!("{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0));

    // MCP 客户端通过 endpoint 事件得知消息投递地址
    let endpoint_url = format!("/message?session_id={}", session_id);
    let _ = tx.send(Event::default().event("endpoint").data(endpoint_url));

    state
        .sessions
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(session_id.clone(), tx);
    info!(
        "sse session {} opened ({} active)",
        session_id,
        state.session_count()
    );

    let guard = SessionGuard {
        id: session_id,
        sessions: state.sessions.clone(),
    };
    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let _keep = &guard;
        Ok::<_, axum::Error>(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn message_handler(
    State(state): State<AppState>,
    Query(q): Query<MessageQuery>,
    Json(req): Json<RpcRequest>,
) -> impl IntoResponse {
    let sender = state
        .sessions
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&q.session_id)
        .cloned();

    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };

    let engine = state.engine.clone();
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let Some(resp) = process_request(&engine, req).await else {
            return;
        };
        let Ok(json_str) = serde_json::to_string(&resp) else {
            return;
        };
        if sender.send(Event::default().event("message").data(json_str)).is_err() {
            warn!("sse session {} closed, dropping it", q.session_id);
            sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&q.session_id);
        }
    });
    StatusCode::ACCEPTED
}

pub fn build_router(engine: Arc<SearchEngine>) -> Router {
    router_with_state(AppState::new(engine))
}

fn router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/search", post(search_handler))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .with_state(state)
}

pub async fn serve_http(engine: Arc<SearchEngine>, server: &ServerConfig) -> Result<()> {
    let router = build_router(engine);

    let addr = format!(
        "{}:{}",
        server.http_addr.as_deref().unwrap_or("0.0.0.0"),
        server.http_port.unwrap_or(3000)
    );
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| SumoSearchError::ConfigError(format!("bind {addr} failed: {e}")))?;
    info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, router).await.map_err(|e| e.into())
}
