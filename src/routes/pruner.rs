//! Pruner status HTTP endpoint.
//!
//! GET /api/v1/pruner/status returns the current state of the background
//! cache pruner as JSON.

use axum::extract::State;
use axum::Json;

use crate::services::pruner::{PrunerState, SharedPrunerState};

/// Get the current pruner status.
///
/// Returns the sweep interval, when the last sweep ran and how many cached
/// entries it removed, and when the next sweep is due.
#[utoipa::path(
    get,
    path = "/api/v1/pruner/status",
    tag = "Pruner",
    responses(
        (status = 200, description = "Current pruner status", body = PrunerState),
    )
)]
pub async fn get_pruner_status(State(state): State<SharedPrunerState>) -> Json<PrunerState> {
    let s = state.read().await;
    Json(s.clone())
}
