//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use switchyard_core::completion::coordinator::{CompletionError, WebhookError};
use switchyard_core::subscription::reconciler::SubscriptionError;
use switchyard_types::error::{RepositoryError, VendorError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Completion (kickoff / poll / cancel) errors.
    Completion(CompletionError),
    /// Inbound webhook errors; status comes from the error itself.
    Webhook(WebhookError),
    /// Subscription attach / detach errors.
    Subscription(SubscriptionError),
    NotFound(String),
    Validation(String),
    Internal(String),
}

impl From<CompletionError> for AppError {
    fn from(e: CompletionError) -> Self {
        AppError::Completion(e)
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        AppError::Webhook(e)
    }
}

impl From<SubscriptionError> for AppError {
    fn from(e: SubscriptionError) -> Self {
        AppError::Subscription(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Internal(e.to_string())
    }
}

fn vendor_status(e: &VendorError) -> (StatusCode, &'static str) {
    match e {
        VendorError::NotFound(_) => (StatusCode::BAD_GATEWAY, "VENDOR_NOT_FOUND"),
        _ => (StatusCode::BAD_GATEWAY, "VENDOR_ERROR"),
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Completion(CompletionError::Kickoff(e)) => {
                let (status, code) = vendor_status(e);
                (status, code, self.to_message())
            }
            AppError::Completion(CompletionError::AlreadyStarted(_)) => {
                (StatusCode::CONFLICT, "ALREADY_STARTED", self.to_message())
            }
            AppError::Completion(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "COMPLETION_ERROR", self.to_message())
            }
            AppError::Webhook(e) => {
                let status = StatusCode::from_u16(e.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let code = match e {
                    WebhookError::Signature(_) => "SIGNATURE_REJECTED",
                    WebhookError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
                    WebhookError::Internal(_) => "INTERNAL_ERROR",
                };
                (status, code, self.to_message())
            }
            AppError::Subscription(SubscriptionError::Vendor(e)) => {
                let (status, code) = vendor_status(e);
                (status, code, self.to_message())
            }
            AppError::Subscription(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SUBSCRIPTION_ERROR", self.to_message())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }

    fn to_message(&self) -> String {
        match self {
            AppError::Completion(e) => e.to_string(),
            AppError::Webhook(e) => e.to_string(),
            AppError::Subscription(e) => e.to_string(),
            AppError::NotFound(msg) | AppError::Validation(msg) | AppError::Internal(msg) => {
                msg.clone()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        } else {
            tracing::debug!(code, %message, "request rejected");
        }

        let body = json!({
            "data": null,
            "meta": {
                "timestamp": chrono::Utc::now().to_rfc3339(),
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use switchyard_types::error::SignatureFailure;

    #[test]
    fn test_kickoff_failure_is_bad_gateway() {
        let err = AppError::from(CompletionError::Kickoff(VendorError::Api {
            status: 400,
            message: "bad release".into(),
        }));
        assert_eq!(err.parts().0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_webhook_errors_use_their_status() {
        let forbidden = AppError::from(WebhookError::Signature(SignatureFailure::Mismatch));
        assert_eq!(forbidden.parts().0, StatusCode::FORBIDDEN);

        let malformed = AppError::from(WebhookError::MalformedPayload("nope".into()));
        assert_eq!(malformed.parts().0, StatusCode::BAD_REQUEST);

        let bad_header = AppError::from(WebhookError::Signature(
            SignatureFailure::MalformedHeader("svix-signature".into()),
        ));
        assert_eq!(bad_header.parts().0, StatusCode::BAD_REQUEST);

        let internal = AppError::from(WebhookError::Internal("db".into()));
        assert_eq!(internal.parts().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_already_started_is_conflict() {
        let err = AppError::from(CompletionError::AlreadyStarted(
            switchyard_types::operation::ExecutionId::new(),
        ));
        assert_eq!(err.parts().0, StatusCode::CONFLICT);
    }
}
