//! Kickoff, cancel and status of long-running remote operations.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use switchyard_core::completion::coordinator::CancelOutcome;
use switchyard_types::operation::{ExecutionId, PendingOperation};

use crate::http::error::AppError;
use crate::http::handlers::integration_handle;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct KickoffRequest {
    /// Caller-chosen execution id; generated when absent.
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    /// Vendor-specific start request, passed through unchanged.
    #[serde(default)]
    pub request: serde_json::Value,
}

fn parse_execution_id(raw: &str) -> Result<ExecutionId, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("invalid execution id '{raw}'")))
}

/// POST /api/v1/operations/{integration}
pub async fn kickoff(
    State(state): State<AppState>,
    Path(integration): Path<String>,
    Json(body): Json<KickoffRequest>,
) -> Result<ApiResponse<PendingOperation>, AppError> {
    let start = Instant::now();
    let handle = integration_handle(&state, &integration)?;
    let execution_id = body.execution_id.unwrap_or_default();

    let operation = handle.completion.kickoff(execution_id, &body.request).await?;

    Ok(ApiResponse::accepted(operation, start).with_operation_links(&integration, execution_id))
}

/// GET /api/v1/operations/{integration}/{execution_id}
pub async fn get_operation(
    State(state): State<AppState>,
    Path((integration, execution_id)): Path<(String, String)>,
) -> Result<ApiResponse<PendingOperation>, AppError> {
    let start = Instant::now();
    let handle = integration_handle(&state, &integration)?;
    let execution_id = parse_execution_id(&execution_id)?;

    let operation = handle
        .completion
        .status(&execution_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no operation for execution {execution_id}")))?;

    Ok(ApiResponse::ok(operation, start))
}

/// POST /api/v1/operations/{integration}/{execution_id}/cancel
pub async fn cancel_operation(
    State(state): State<AppState>,
    Path((integration, execution_id)): Path<(String, String)>,
) -> Result<ApiResponse<CancelOutcome>, AppError> {
    let start = Instant::now();
    let handle = integration_handle(&state, &integration)?;
    let execution_id = parse_execution_id(&execution_id)?;

    match handle.completion.cancel(&execution_id).await? {
        CancelOutcome::Missing => Err(AppError::NotFound(format!(
            "no operation for execution {execution_id}"
        ))),
        outcome => Ok(ApiResponse::ok(outcome, start)),
    }
}
