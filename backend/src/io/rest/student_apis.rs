//! # REST API for Student Registrations
//!
//! Create, read, update and delete student records, the class roster and
//! the approval status. Create and update take the multipart registration
//! form so a photo can travel with the fields.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, patch},
    Router,
};
use shared::{MessageResponse, StatusUpdateRequest, StudentResponse};
use tracing::info;

use super::error::{ApiContext, ApiError};
use super::forms::StudentForm;
use super::qr_page;
use crate::AppState;

/// Create a router for student related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/students",
            get(list_students).post(create_student).delete(delete_all_students),
        )
        .route("/students/class/:classno", get(list_students_in_class))
        .route(
            "/students/:regno",
            get(get_student).put(update_student).delete(delete_student),
        )
        .route("/students/:regno/status", patch(update_status))
        .route("/students/:regno/qr", get(qr_page::student_info_page))
}

/// POST /students
pub async fn create_student(
    State(state): State<AppState>,
    form: StudentForm,
) -> Result<impl IntoResponse, ApiError> {
    let (request, photo) = form.into_create_request();
    info!(
        "POST /students - regno: {:?}, photo: {}",
        request.regno,
        photo.is_some()
    );

    let student = state
        .students
        .create_student(request, photo)
        .await
        .api_context("Error creating student")?;

    let response = StudentResponse {
        message: "Student created successfully".to_string(),
        student,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /students
pub async fn list_students(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    info!("GET /students");

    let students = state
        .students
        .list_students()
        .await
        .api_context("Error fetching students")?;
    Ok(Json(students))
}

/// GET /students/class/:classno
pub async fn list_students_in_class(
    State(state): State<AppState>,
    Path(classno): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!("GET /students/class/{}", classno);

    let roster = state
        .students
        .list_students_in_class(&classno)
        .await
        .api_context("Error fetching students by class")?;
    Ok(Json(roster))
}

/// GET /students/:regno
pub async fn get_student(
    State(state): State<AppState>,
    Path(regno): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!("GET /students/{}", regno);

    let student = state
        .students
        .get_student(&regno)
        .await
        .api_context("Error fetching student")?;
    Ok(Json(student))
}

/// PUT /students/:regno
pub async fn update_student(
    State(state): State<AppState>,
    Path(regno): Path<String>,
    form: StudentForm,
) -> Result<impl IntoResponse, ApiError> {
    let (request, photo) = form.into_update_request();
    info!("PUT /students/{} - request: {:?}", regno, request);

    let student = state
        .students
        .update_student(&regno, request, photo)
        .await
        .api_context("Error updating student")?;

    Ok(Json(StudentResponse {
        message: "Student updated successfully".to_string(),
        student,
    }))
}

/// PATCH /students/:regno/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(regno): Path<String>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    info!("PATCH /students/{}/status", regno);

    let status = match payload {
        Ok(Json(request)) => request.status,
        Err(_) => None,
    };
    let student = state
        .students
        .update_status(&regno, status)
        .await
        .api_context("Error updating student status")?;
    Ok(Json(student))
}

/// DELETE /students/:regno
pub async fn delete_student(
    State(state): State<AppState>,
    Path(regno): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!("DELETE /students/{}", regno);

    state
        .students
        .delete_student(&regno)
        .await
        .api_context("Error deleting student")?;
    Ok(Json(MessageResponse {
        message: "Student deleted successfully".to_string(),
    }))
}

/// DELETE /students
pub async fn delete_all_students(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    info!("DELETE /students");

    state
        .students
        .delete_all_students()
        .await
        .api_context("Error deleting all students")?;
    Ok(Json(MessageResponse {
        message: "All students deleted successfully".to_string(),
    }))
}
