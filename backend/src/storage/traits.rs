//! # Storage Traits
//!
//! Storage abstraction shared by the database backend and the JSON-file
//! fallback. Both backends must give identical answers for the same calls:
//! the ordering helpers below are the single definition of list order, and
//! the SQL in the database backend mirrors them.

use async_trait::async_trait;
use shared::{Holiday, Student};
use std::cmp::Ordering;
use std::fmt;

use crate::domain::error::RecordResult;

/// Which backend was selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Database,
    FileBacked,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Database => "database",
            StorageMode::FileBacked => "file",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait defining the interface for student storage operations
#[async_trait]
pub trait StudentStorage: Send + Sync {
    /// Store a new student.
    /// Fails with `DuplicateKey` if the registration number is taken (any case).
    async fn insert_student(&self, student: &Student) -> RecordResult<()>;

    /// Find a student by registration number, ignoring case
    async fn find_student(&self, regno: &str) -> RecordResult<Option<Student>>;

    /// All students, newest first
    async fn list_students(&self) -> RecordResult<Vec<Student>>;

    /// Students whose class matches exactly, in roster order
    async fn list_students_in_class(&self, classno: &str) -> RecordResult<Vec<Student>>;

    /// Overwrite the mutable fields of an existing student, matched by id.
    /// Returns false if the student no longer exists.
    async fn replace_student(&self, student: &Student) -> RecordResult<bool>;

    /// Remove a student by registration number and return the removed record
    async fn delete_student(&self, regno: &str) -> RecordResult<Option<Student>>;

    /// Remove every student, returning how many were removed
    async fn delete_all_students(&self) -> RecordResult<u64>;
}

/// Trait defining the interface for holiday storage operations
#[async_trait]
pub trait HolidayStorage: Send + Sync {
    async fn insert_holiday(&self, holiday: &Holiday) -> RecordResult<()>;

    async fn get_holiday(&self, id: &str) -> RecordResult<Option<Holiday>>;

    /// All holidays in calendar order
    async fn list_holidays(&self) -> RecordResult<Vec<Holiday>>;

    /// Returns false if the holiday no longer exists
    async fn replace_holiday(&self, holiday: &Holiday) -> RecordResult<bool>;

    /// Returns false if there was nothing to delete
    async fn delete_holiday(&self, id: &str) -> RecordResult<bool>;
}

/// A complete record store. The rest of the application only ever sees this
/// trait object; which implementation sits behind it is decided once in
/// [`crate::storage::select_store`].
pub trait RecordStore: StudentStorage + HolidayStorage {
    fn mode(&self) -> StorageMode;
}

/// Newest first, ties broken by id so both backends agree
pub fn newest_first(a: &Student, b: &Student) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Alphabetical by name ignoring ASCII case, then exact name, then creation time.
/// Matches `ORDER BY name COLLATE NOCASE, name, created_at` in SQLite.
pub fn roster_order(a: &Student, b: &Student) -> Ordering {
    a.name
        .to_ascii_lowercase()
        .cmp(&b.name.to_ascii_lowercase())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Ascending date, ties by creation time then id
pub fn calendar_order(a: &Holiday, b: &Holiday) -> Ordering {
    a.date
        .cmp(&b.date)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
