use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

pub const ROOT_MESSAGE: &str = "RINVO backend is running";

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub api_key_configured: bool,
    pub version: String,
}

/// Liveness check. Reports whether the upstream credential is configured,
/// without contacting the upstream.
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "OK".to_string(),
        api_key_configured: state.config.api_key_configured(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Plain-text liveness string", body = String)
    ),
    tag = "system"
)]
pub async fn root() -> &'static str {
    ROOT_MESSAGE
}
