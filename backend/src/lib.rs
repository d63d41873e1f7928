//! # Student Records Backend
//!
//! REST service for student registrations, photos and the holiday calendar.
//!
//! ## Architecture
//!
//! ```text
//! IO Layer (REST handlers, multipart forms, QR page)
//!     ↓
//! Domain Layer (validation, age rules, photo assets)
//!     ↓
//! Storage Layer (SQLite database, or JSON files when it is unreachable)
//! ```
//!
//! The storage backend is chosen once in [`initialize_backend`] and handed to
//! the services as a trait object; nothing above the storage layer knows
//! which one is in use.

pub mod config;
pub mod domain;
pub mod io;
pub mod storage;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::config::AppConfig;
use crate::domain::assets::{MAX_PHOTO_BYTES, UPLOAD_URL_PREFIX};
use crate::domain::{AssetManager, HolidayService, StudentService};
use crate::io::rest::{health_apis, holiday_apis, student_apis};
use crate::storage::{select_store, RecordStore, StorageMode};

/// Room for the text fields of the registration form on top of the photo
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Main application state that holds all services
#[derive(Clone)]
pub struct AppState {
    pub students: StudentService,
    pub holidays: HolidayService,
    pub storage_mode: StorageMode,
    /// Base URL for absolute links, without a trailing slash
    pub public_url: String,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, assets: AssetManager, public_url: String) -> Self {
        Self {
            storage_mode: store.mode(),
            students: StudentService::new(store.clone(), assets),
            holidays: HolidayService::new(store),
            public_url,
        }
    }
}

/// Select storage and build the services
pub async fn initialize_backend(config: &AppConfig) -> Result<AppState> {
    info!("Setting up storage");
    let store = select_store(&config.storage)
        .await
        .context("failed to prepare record storage")?;
    info!("Using {} storage", store.mode());

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;

    info!("Setting up application state");
    Ok(AppState::new(
        store,
        AssetManager::new(&config.upload_dir),
        config.public_url.clone(),
    ))
}

/// Create the Axum router with all routes configured
pub fn create_router(app_state: AppState, config: &AppConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any);

    let student_routes = student_apis::router()
        .layer(DefaultBodyLimit::max(MAX_PHOTO_BYTES + FORM_OVERHEAD_BYTES));

    let mut router = Router::new()
        .merge(student_routes)
        .merge(holiday_apis::router())
        .route("/health", get(health_apis::health))
        .nest_service(UPLOAD_URL_PREFIX, ServeDir::new(&config.upload_dir));

    if let Some(frontend_dir) = &config.frontend_dir {
        info!("Serving frontend from {}", frontend_dir.display());
        router = router.fallback_service(ServeDir::new(frontend_dir));
    }

    router.layer(cors).with_state(app_state)
}

#[cfg(test)]
impl AppState {
    pub(crate) async fn for_tests(upload_dir: &std::path::Path) -> Self {
        let db = storage::DbConnection::init_test()
            .await
            .expect("Failed to create test database");
        Self::new(
            Arc::new(db),
            AssetManager::new(upload_dir),
            "http://localhost:3000".to_string(),
        )
    }
}
