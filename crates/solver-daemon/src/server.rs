//! HTTP router: health, metrics, and discovery.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Registry, TextEncoder};
use serde_json::json;

/// Shared read-only state for the HTTP handlers.
pub struct AppState {
    /// Process-wide metrics registry, constructed once at startup.
    pub registry: Registry,
    /// Pre-rendered agent card.
    pub agent_card: String,
}

/// Builds the router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/.well-known/agent-card.json", get(agent_card))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&state.registry.gather()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {e}"),
        )
            .into_response(),
    }
}

async fn agent_card(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        state.agent_card.clone(),
    )
}

#[cfg(test)]
mod tests {
    use solver_core::metrics::SolverMetrics;
    use solver_core::SolverConfig;

    use super::*;
    use crate::agent_card;

    fn state() -> Arc<AppState> {
        let registry = Registry::new();
        SolverMetrics::register(&registry).unwrap();
        Arc::new(AppState {
            registry,
            agent_card: agent_card::render(&SolverConfig::default()),
        })
    }

    #[tokio::test]
    async fn test_routes_respond() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt as _;

        let app = router(state());

        for path in ["/healthz", "/metrics", "/.well-known/agent-card.json"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path}");
        }
    }
}
