use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, warn};

use crate::auth::{self, AuthDecision};
use crate::session::{self, SessionContext};

/// Shared server state: auth settings plus the per-connection dependencies.
#[derive(Clone)]
pub struct AppState {
    pub auth_mode: String,
    pub api_keys: Vec<String>,
    pub session: Arc<SessionContext>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    match auth::authorize(&state.auth_mode, &state.api_keys, &headers, &query) {
        AuthDecision::Accept { subprotocol } => {
            let ws = match subprotocol {
                Some(protocol) => ws.protocols([protocol]),
                None => ws,
            };
            let ctx = Arc::clone(&state.session);
            ws.on_upgrade(move |socket| session::run(socket, ctx))
                .into_response()
        }
        AuthDecision::Unauthorized => {
            warn!("websocket upgrade rejected: unauthorized");
            StatusCode::UNAUTHORIZED.into_response()
        }
        AuthDecision::Misconfigured => {
            error!("client auth is enabled but no API keys are configured");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health_live() -> impl IntoResponse {
    Json(json!({ "status": "live" }))
}

async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.session.readiness.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready" })),
        )
    }
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain")],
        state.session.metrics.render_prometheus(),
    )
}
