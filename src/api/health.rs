//! Liveness of the service and its row store for the /health endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use crate::api::routes::ApiState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub period_mode: &'static str,
    pub top_k: usize,
}

pub async fn get_health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!("health check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        code,
        Json(HealthResponse {
            status,
            period_mode: state.config.period.mode_name(),
            top_k: state.config.top_k,
        }),
    )
}
