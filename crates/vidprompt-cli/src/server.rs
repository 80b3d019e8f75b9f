use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};
use vidprompt_contracts::history::{HistoryEntry, DEFAULT_HISTORY_LIMIT};
use vidprompt_contracts::prompts::GenerateBody;
use vidprompt_engine::{GenerateError, PromptEngine};

/// Server-side cap on request bodies.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct GenerateResponse {
    results: String,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Every failed request leaves as `{ "error": ... }` with a classified status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: message.into(),
        }
    }
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        Self::new(err.status_code(), err.user_message())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::new(
                StatusCode::PAYLOAD_TOO_LARGE.as_u16(),
                "Request body is too large. Use fewer images or smaller files.",
            );
        }
        Self::new(
            StatusCode::BAD_REQUEST.as_u16(),
            format!("Invalid request body: {}", rejection.body_text()),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub fn router(engine: Arc<PromptEngine>) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/history", get(history))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(engine)
}

async fn generate(
    State(engine): State<Arc<PromptEngine>>,
    payload: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        warn!(status = %rejection.status(), "rejected generation body");
        ApiError::from(rejection)
    })?;
    let generation = match engine.generate(body).await {
        Ok(generation) => generation,
        Err(err) => {
            warn!(status = err.status_code(), error = %err, "generation failed");
            return Err(err.into());
        }
    };
    // Persistence is detached; the reply never waits on it.
    drop(engine.record_in_background(&generation));
    Ok(Json(GenerateResponse {
        results: generation.text,
    }))
}

async fn history(State(engine): State<Arc<PromptEngine>>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        history: engine.history(DEFAULT_HISTORY_LIMIT).await,
    })
}

pub async fn serve(engine: Arc<PromptEngine>, listen: &str) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let local = listener.local_addr().context("listener has no local address")?;
    info!(
        address = %local,
        protocol = %engine.gateway().protocol(),
        model = %engine.gateway().model(),
        history = engine.recorder().is_enabled(),
        "vidprompt server listening"
    );
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;
    info!("vidprompt server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    }
}
