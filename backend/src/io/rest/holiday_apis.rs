//! # REST API for the Holiday Calendar

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use shared::{HolidayRequest, HolidayResponse, MessageResponse};
use tracing::info;

use super::error::{ApiContext, ApiError};
use crate::AppState;

/// Create a router for holiday related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/holidays", get(list_holidays).post(create_holiday))
        .route(
            "/holidays/:id",
            get(get_holiday).put(update_holiday).delete(delete_holiday),
        )
}

/// POST /holidays
pub async fn create_holiday(
    State(state): State<AppState>,
    payload: Result<Json<HolidayRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    info!("POST /holidays - request: {:?}", request);

    let holiday = state
        .holidays
        .create_holiday(request)
        .await
        .api_context("Error creating holiday")?;

    let response = HolidayResponse {
        message: "Holiday created successfully".to_string(),
        holiday,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /holidays
pub async fn list_holidays(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    info!("GET /holidays");

    let holidays = state
        .holidays
        .list_holidays()
        .await
        .api_context("Error fetching holidays")?;
    Ok(Json(holidays))
}

/// GET /holidays/:id
pub async fn get_holiday(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!("GET /holidays/{}", id);

    let holiday = state
        .holidays
        .get_holiday(&id)
        .await
        .api_context("Error fetching holiday")?;
    Ok(Json(holiday))
}

/// PUT /holidays/:id
pub async fn update_holiday(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<HolidayRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    info!("PUT /holidays/{} - request: {:?}", id, request);

    let holiday = state
        .holidays
        .update_holiday(&id, request)
        .await
        .api_context("Error updating holiday")?;

    Ok(Json(HolidayResponse {
        message: "Holiday updated successfully".to_string(),
        holiday,
    }))
}

/// DELETE /holidays/:id
pub async fn delete_holiday(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!("DELETE /holidays/{}", id);

    state
        .holidays
        .delete_holiday(&id)
        .await
        .api_context("Error deleting holiday")?;
    Ok(Json(MessageResponse {
        message: "Holiday deleted successfully".to_string(),
    }))
}
