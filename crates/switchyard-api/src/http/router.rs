//! Axum router configuration with middleware.

use axum::extract::State;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/operations/{integration}",
            post(handlers::operation::kickoff),
        )
        .route(
            "/operations/{integration}/{execution_id}",
            get(handlers::operation::get_operation),
        )
        .route(
            "/operations/{integration}/{execution_id}/cancel",
            post(handlers::operation::cancel_operation),
        )
        .route(
            "/subscriptions/{integration}",
            post(handlers::subscription::attach),
        )
        .route(
            "/subscriptions/{integration}/{account}/{trigger_id}",
            delete(handlers::subscription::detach),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route(
            "/webhooks/{registration_id}",
            post(handlers::webhook::receive_webhook),
        )
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let mut integrations: Vec<serde_json::Value> = state
        .integrations
        .iter()
        .map(|(name, handle)| {
            serde_json::json!({
                "name": name,
                "kind": handle.kind,
                "channels": handle.completion.channels().names(),
                "signature": state.verifiers.get(name).map(|v| v.scheme()),
            })
        })
        .collect();
    integrations.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "integrations": integrations,
    }))
}
