//! Success envelope for the operator API.
//!
//! `{ "data": ..., "meta": { "request_id", "timestamp", "response_time_ms" }, "_links": {...} }`
//!
//! Errors use the same `meta` block; see [`crate::http::error`].

use std::collections::BTreeMap;
use std::time::Instant;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ApiMeta,
    #[serde(rename = "_links", skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<&'static str, String>,
    #[serde(skip)]
    status: StatusCode,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: String,
    pub timestamp: String,
    pub response_time_ms: u64,
}

impl ApiMeta {
    fn since(start: Instant) -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 response timed from `start`.
    pub fn ok(data: T, start: Instant) -> Self {
        Self {
            data,
            meta: ApiMeta::since(start),
            links: BTreeMap::new(),
            status: StatusCode::OK,
        }
    }

    /// 202 response: the remote operation was started and completes later.
    pub fn accepted(data: T, start: Instant) -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            ..Self::ok(data, start)
        }
    }

    pub fn with_link(mut self, rel: &'static str, href: impl Into<String>) -> Self {
        self.links.insert(rel, href.into());
        self
    }

    /// `self` and `cancel` links for a pending operation.
    pub fn with_operation_links(self, integration: &str, execution_id: impl std::fmt::Display) -> Self {
        let base = format!("/api/v1/operations/{integration}/{execution_id}");
        self.with_link("cancel", format!("{base}/cancel"))
            .with_link("self", base)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_sets_status_and_keeps_meta() {
        let response = ApiResponse::accepted("queued", Instant::now());
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert!(!response.meta.request_id.is_empty());
    }

    #[test]
    fn operation_links_point_at_status_and_cancel() {
        let response = ApiResponse::ok((), Instant::now()).with_operation_links("deploy", "abc");
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["_links"]["self"], "/api/v1/operations/deploy/abc");
        assert_eq!(json["_links"]["cancel"], "/api/v1/operations/deploy/abc/cancel");
    }

    #[test]
    fn links_are_omitted_when_empty() {
        let json = serde_json::to_value(ApiResponse::ok(1, Instant::now())).unwrap();
        assert!(json.get("_links").is_none());
        assert_eq!(json["data"], 1);
        assert!(json["meta"]["timestamp"].is_string());
    }
}
