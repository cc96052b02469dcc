//! API handlers.

pub mod admin;
pub mod register;

use axum::Json;
use std::sync::Arc;

use crate::registration::Workflow;
use crate::web::dto::HealthResponse;

pub use admin::*;
pub use register::*;

/// Shared state of all handlers.
pub struct AppState {
    /// Registration workflow.
    pub workflow: Arc<Workflow>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(workflow: Arc<Workflow>) -> Self {
        Self { workflow }
    }
}

/// GET /health - Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
