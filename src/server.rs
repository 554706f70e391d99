use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::{delete, get, post}};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};

use crate::agent::rollback::RollbackOutcome;
use crate::agent::{ChatReply, ChatRequest, ConversationEngine};
use crate::error::ChatError;
use crate::session::TurnRecord;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub reply: ChatReply,
    pub sources: Vec<serde_json::Value>,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self { reply, sources: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
pub struct SpeechChatBody {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RollbackBody {
    #[serde(default = "default_steps")]
    pub steps: usize,
}

fn default_steps() -> usize { 1 }

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub history: Vec<TurnRecord>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatError> {
    let reply = state.engine.process_chat(body).await?;
    Ok(Json(reply.into()))
}

async fn speech_chat(
    State(state): State<AppState>,
    Json(body): Json<SpeechChatBody>,
) -> Result<Json<ChatResponse>, ChatError> {
    let reply = state.engine.process_speech_chat(&body.query, body.session_id.as_deref()).await?;
    Ok(Json(reply.into()))
}

async fn rollback(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Option<Json<RollbackBody>>,
) -> Result<Json<RollbackOutcome>, ChatError> {
    let steps = body.map(|Json(b)| b.steps).unwrap_or_else(default_steps);
    Ok(Json(state.engine.rollback(&session_id, steps).await?))
}

async fn session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<HistoryResponse> {
    let history = state.engine.history(&session_id).await;
    Json(HistoryResponse { session_id, history })
}

async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, ChatError> {
    if state.engine.clear(&session_id).await {
        tracing::info!(%session_id, "session cleared");
        Ok(Json(StatusResponse { status: "success".into(), message: format!("Session {session_id} cleared") }))
    } else {
        Err(ChatError::SessionNotFound(session_id))
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "model": state.engine.model_name(),
        "sessions": state.engine.store().len().await,
    }))
}

async fn render_metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.as_ref().map(|h| h.render()).ok_or(StatusCode::NOT_FOUND)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/speech", post(speech_chat))
        .route("/chat/rollback/:session_id", post(rollback))
        .route("/chat/session/:session_id/history", get(session_history))
        .route("/chat/session/:session_id", delete(clear_session))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
