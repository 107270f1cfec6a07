use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::db::queries;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" when healthy, "degraded" when the store is unreachable)
    pub status: String,
    /// API version
    pub version: String,
    /// Whether the key-value store is reachable
    pub store: bool,
}

/// Health check endpoint.
///
/// Returns the API status and version. Probes the key-value store with a
/// trivial query; an unreachable store reports "degraded" (still 200).
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(pool): State<SqlitePool>) -> Json<HealthResponse> {
    Json(health_response(queries::ping(&pool).await))
}

fn health_response(store_ok: bool) -> HealthResponse {
    HealthResponse {
        status: if store_ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_ok,
    }
}
