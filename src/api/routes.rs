//! API route definitions.

use super::state::AppState;
use crate::approval::ApprovalCommand;
use crate::repair::FixError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/anomalies", get(list_anomalies))
        .route("/fixes", get(list_fixes))
        .route("/fixes/{id}", get(get_fix))
        .route("/commands", post(run_command))
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<FixError> for ApiError {
    fn from(e: FixError) -> Self {
        let status = match &e {
            FixError::UnknownFix(_) => StatusCode::NOT_FOUND,
            FixError::WorkingTreeBusy { .. } | FixError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            FixError::NoChanges(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FixError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "repair_enabled": state.repair_enabled,
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn list_anomalies(State(state): State<AppState>) -> Json<Value> {
    let records = state.history.recent().await;
    Json(json!({ "data": records, "meta": { "total": records.len() } }))
}

async fn list_fixes(State(state): State<AppState>) -> Json<Value> {
    let fixes = state.registry.list().await;
    Json(json!({ "data": fixes, "meta": { "total": fixes.len() } }))
}

async fn get_fix(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let fix = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| ApiError::from(FixError::UnknownFix(id)))?;
    Ok(Json(json!({ "data": fix })))
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    command: String,
}

async fn run_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<Value>, ApiError> {
    let command = req
        .command
        .parse::<ApprovalCommand>()
        .map_err(|e| ApiError {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        })?;
    let outcome = state.approval.handle(command).await.map_err(|e| {
        warn!(error = %e, "Approval command refused");
        ApiError::from(e)
    })?;
    Ok(Json(json!({ "data": outcome })))
}
