//! # Student QR Page
//!
//! Scanning a student's QR code opens `GET /students/:regno/qr` on a phone.
//! The answer is always a small self-contained HTML page, including for
//! unknown registration numbers and storage failures.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};
use maud::{html, Markup, DOCTYPE};
use shared::{Student, StudentStatus};
use tracing::{error, info};

use crate::domain::RecordError;
use crate::AppState;

const CACHE_CONTROL: &str = "public, max-age=300";

const PAGE_STYLE: &str = r#"
* { box-sizing: border-box; }
body { font-family: system-ui, -apple-system, sans-serif; margin: 0; padding: 16px; background-color: #f8f9fa; line-height: 1.5; color: #333; }
.container { max-width: 600px; margin: 0 auto; background: white; padding: 24px; border-radius: 16px; box-shadow: 0 2px 12px rgba(0,0,0,0.1); }
.photo-container { text-align: center; margin-bottom: 24px; background: #f8f9fa; padding: 16px; border-radius: 12px; }
.student-photo { width: 180px; height: 180px; border-radius: 12px; object-fit: cover; }
.info-row { padding: 16px; border-bottom: 1px solid #eee; display: flex; align-items: center; }
.label { font-weight: 600; color: #495057; width: 140px; }
.value { flex: 1; color: #212529; }
h1 { text-align: center; margin: 0 0 24px; font-size: 24px; font-weight: 600; }
.status { display: inline-block; padding: 6px 12px; border-radius: 20px; font-size: 14px; text-transform: capitalize; }
.status.approved { background-color: #d4edda; color: #155724; }
.status.pending { background-color: #fff3cd; color: #856404; }
.error { color: #dc3545; text-align: center; }
@media (max-width: 480px) { .container { padding: 16px; } .student-photo { width: 150px; height: 150px; } .label { width: 100px; } }
"#;

/// GET /students/:regno/qr
pub async fn student_info_page(
    State(state): State<AppState>,
    Path(regno): Path<String>,
) -> Response {
    info!("GET /students/{}/qr", regno);

    let (status, page) = match state.students.get_student(&regno).await {
        Ok(student) => (StatusCode::OK, student_page(&student, &state.public_url)),
        Err(RecordError::NotFound(_)) => {
            info!("No student for QR lookup {}", regno);
            (StatusCode::NOT_FOUND, not_found_page(&regno))
        }
        Err(e) => {
            error!("Error in QR lookup for {}: {}", regno, e);
            (StatusCode::INTERNAL_SERVER_ERROR, error_page())
        }
    };

    let mut response = (status, Html(page.into_string())).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    response
}

/// Absolute photo URL; stored references are relative to this server
pub fn photo_url(photo: &str, public_url: &str) -> String {
    if photo.starts_with("http") {
        photo.to_string()
    } else {
        format!("{}{}", public_url, photo)
    }
}

fn layout(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                style { (maud::PreEscaped(PAGE_STYLE)) }
            }
            body {
                div.container { (body) }
            }
        }
    }
}

fn info_row(label: &str, value: Option<&str>) -> Markup {
    html! {
        div.info-row {
            span.label { (label) }
            span.value { (value.filter(|v| !v.is_empty()).unwrap_or("N/A")) }
        }
    }
}

fn student_page(student: &Student, public_url: &str) -> Markup {
    let status_class = match student.status {
        StudentStatus::Approved => "approved",
        StudentStatus::Pending => "pending",
    };

    layout(
        &format!("{} - Student Information", student.name),
        html! {
            h1 { "Student Information" }
            @if let Some(photo) = &student.photo {
                div.photo-container {
                    img.student-photo
                        src=(photo_url(photo, public_url))
                        alt=(format!("{}'s Photo", student.name))
                        loading="lazy";
                }
            }
            (info_row("Name:", Some(&student.name)))
            (info_row("Reg No:", Some(&student.regno)))
            (info_row("Class:", Some(&student.classno)))
            (info_row("Contact:", student.number.as_deref()))
            div.info-row {
                span.label { "Status:" }
                span.value {
                    span class={ "status " (status_class) } { (student.status) }
                }
            }
        },
    )
}

fn not_found_page(regno: &str) -> Markup {
    layout(
        "Student Not Found",
        html! {
            h2.error { "Student Not Found" }
            p { "No student found with registration number: " (regno) }
        },
    )
}

fn error_page() -> Markup {
    layout(
        "Error",
        html! {
            h2.error { "Error" }
            p { "Unable to fetch student information. Please try again later." }
        },
    )
}
