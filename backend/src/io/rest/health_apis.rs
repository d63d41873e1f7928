use axum::{extract::State, response::Json};
use shared::HealthResponse;

use crate::AppState;

/// GET /health - reports which storage backend was selected at startup
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        storage: state.storage_mode.to_string(),
    })
}
