//! Inbound vendor webhook receiver.
//!
//! The registration id in the path names the physical webhook the vendor is
//! delivering to. Its integration's completion handler verifies the signature
//! against the stored secret and resolves the event to a pending operation.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;

use switchyard_core::completion::coordinator::WebhookOutcome;
use switchyard_core::repository::registration::RegistrationStore;
use switchyard_core::repository::secret::WebhookSecretStore;
use switchyard_types::subscription::RegistrationId;
use switchyard_types::webhook::WebhookHeaders;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// POST /webhooks/{registration_id}
///
/// 200 for completed and ignored deliveries alike; 400 / 403 / 500 come from
/// the handler's error. An unknown registration is 404.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(registration_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<WebhookOutcome>, AppError> {
    let start = Instant::now();
    let not_found = || AppError::NotFound(format!("unknown webhook registration '{registration_id}'"));

    let id: RegistrationId = registration_id.parse().map_err(|_| not_found())?;
    let registration = state
        .registrations
        .get_registration(&id)
        .await?
        .ok_or_else(not_found)?;

    let handle = state.integration(&registration.integration).ok_or_else(|| {
        AppError::NotFound(format!(
            "integration '{}' is not configured",
            registration.integration
        ))
    })?;

    let secret = state.registrations.get_secret(&id).await?;
    let headers: WebhookHeaders = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect();

    let outcome = handle
        .completion
        .handle_webhook(&headers, &body, secret.as_ref())
        .await
        .inspect_err(|e| {
            tracing::warn!(
                registration_id = %id,
                integration = %registration.integration,
                error = %e,
                "webhook delivery rejected"
            );
        })?;

    tracing::info!(
        registration_id = %id,
        integration = %registration.integration,
        ?outcome,
        "webhook delivery handled"
    );
    Ok(ApiResponse::ok(outcome, start))
}
