//! # Storage Module
//!
//! Record persistence behind the [`RecordStore`] trait:
//! - `db`: SQLite through sqlx, the primary backend
//! - `json_file`: in-memory collections mirrored to JSON files, used when the
//!   database cannot be reached at startup
//! - `mode`: the one place that decides between them

pub mod db;
pub mod json_file;
pub mod mode;
pub mod traits;

pub use db::DbConnection;
pub use json_file::JsonFileStore;
pub use mode::{migrate_leftovers, select_store, MigrationReport};
pub use traits::{HolidayStorage, RecordStore, StorageMode, StudentStorage};
