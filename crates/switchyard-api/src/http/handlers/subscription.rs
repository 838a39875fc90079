//! Attach and detach trigger subscriptions.
//!
//! Triggers for the same account share one physical webhook registration;
//! attach widens it when needed, detach tears it down with the last user.

use std::collections::BTreeSet;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use switchyard_core::subscription::manager::{Attachment, DetachOutcome};
use switchyard_types::subscription::{ScopeFilters, WebhookSubscriptionRequest};

use crate::http::error::AppError;
use crate::http::handlers::integration_handle;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    pub trigger_id: String,
    pub account: String,
    pub events: BTreeSet<String>,
    /// Absent or empty dimensions match everything.
    #[serde(default)]
    pub filters: ScopeFilters,
}

impl AttachRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.trigger_id.trim().is_empty() || self.account.trim().is_empty() {
            return Err(AppError::Validation(
                "trigger_id and account are required".to_string(),
            ));
        }
        if self.events.is_empty() {
            return Err(AppError::Validation(
                "at least one event is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// POST /api/v1/subscriptions/{integration}
pub async fn attach(
    State(state): State<AppState>,
    Path(integration): Path<String>,
    Json(body): Json<AttachRequest>,
) -> Result<ApiResponse<Attachment>, AppError> {
    let start = Instant::now();
    let handle = integration_handle(&state, &integration)?;
    body.validate()?;

    let request = WebhookSubscriptionRequest {
        events: body.events,
        filters: body.filters,
    };
    let attachment = handle
        .subscriptions
        .attach(&body.trigger_id, &body.account, &request)
        .await?;

    tracing::info!(
        integration = %integration,
        trigger_id = %body.trigger_id,
        registration_id = %attachment.registration_id,
        outcome = ?attachment.outcome,
        "trigger attached"
    );
    Ok(ApiResponse::ok(attachment, start))
}

/// DELETE /api/v1/subscriptions/{integration}/{account}/{trigger_id}
pub async fn detach(
    State(state): State<AppState>,
    Path((integration, account, trigger_id)): Path<(String, String, String)>,
) -> Result<ApiResponse<DetachOutcome>, AppError> {
    let start = Instant::now();
    let handle = integration_handle(&state, &integration)?;

    let outcome = handle.subscriptions.detach(&trigger_id, &account).await?;
    tracing::info!(integration = %integration, %trigger_id, ?outcome, "trigger detached");
    Ok(ApiResponse::ok(outcome, start))
}
