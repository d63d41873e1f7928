//! # Domain Module
//!
//! Business rules shared by both storage backends: field validation, age
//! derivation, registration-number uniqueness and photo asset lifecycle.

pub mod assets;
pub mod error;
pub mod holiday_service;
pub mod models;
pub mod student_service;

pub use assets::{AssetManager, PhotoUpload};
pub use error::{RecordError, RecordResult};
pub use holiday_service::HolidayService;
pub use student_service::StudentService;
