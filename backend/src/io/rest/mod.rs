//! # REST API Interface Layer
//!
//! - `student_apis`: registration CRUD, class roster and status changes
//! - `holiday_apis`: the holiday calendar
//! - `health_apis`: liveness plus the selected storage mode
//! - `qr_page`: the HTML page opened by scanning a student's QR code
//! - `forms`: multipart parsing for the registration form
//! - `error`: mapping from `RecordError` to HTTP responses

pub mod error;
pub mod forms;
pub mod health_apis;
pub mod holiday_apis;
pub mod qr_page;
pub mod student_apis;

pub use error::{ApiContext, ApiError};
