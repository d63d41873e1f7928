//! # Mode Selection
//!
//! Chooses the storage backend once, at startup. A database that connects
//! within the timeout is used for the life of the process; otherwise the
//! JSON-file fallback is loaded and used instead. The choice is never
//! revisited while the process runs.

use shared::{Holiday, Student};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::db::DbConnection;
use super::json_file::{read_collection, JsonFileStore, HOLIDAYS_FILE, STUDENTS_FILE};
use super::traits::{HolidayStorage, RecordStore, StudentStorage};
use crate::config::StorageConfig;
use crate::domain::error::{RecordError, RecordResult};

/// Outcome of importing fallback files into the database
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub imported: usize,
    /// Records already present in the database
    pub skipped: usize,
    pub failed: usize,
}

/// Connect to the database or fall back to local files.
///
/// Errors only if the fallback store itself cannot be prepared.
pub async fn select_store(config: &StorageConfig) -> RecordResult<Arc<dyn RecordStore>> {
    let attempt = tokio::time::timeout(
        config.connect_timeout,
        DbConnection::connect(&config.database_url, config.connect_timeout),
    )
    .await;

    match attempt {
        Ok(Ok(db)) => {
            info!("Connected to database");
            let report = migrate_leftovers(&db, &config.data_dir).await;
            if report != MigrationReport::default() {
                info!(
                    "Imported {} local records into the database ({} already present, {} failed)",
                    report.imported, report.skipped, report.failed
                );
            }
            Ok(Arc::new(db))
        }
        Ok(Err(e)) => {
            warn!("Database connection error: {}. Using local storage mode", e);
            load_fallback(&config.data_dir).await
        }
        Err(_) => {
            warn!(
                "Database connection timed out after {:?}. Using local storage mode",
                config.connect_timeout
            );
            load_fallback(&config.data_dir).await
        }
    }
}

async fn load_fallback(data_dir: &Path) -> RecordResult<Arc<dyn RecordStore>> {
    let store = JsonFileStore::load(data_dir).await?;
    Ok(Arc::new(store))
}

/// Import records left behind by an earlier fallback run.
///
/// Best-effort: failures are logged and counted, never retried. A file whose
/// records were all imported (or already present) is renamed to
/// `<name>.migrated` so the next start does not read it again.
pub async fn migrate_leftovers(db: &DbConnection, data_dir: &Path) -> MigrationReport {
    let mut report = MigrationReport::default();

    let students_path = data_dir.join(STUDENTS_FILE);
    if students_path.exists() {
        match read_collection::<Student>(&students_path).await {
            Ok(students) => {
                let mut file_report = MigrationReport {
                    failed: students.rejected,
                    ..Default::default()
                };
                for student in &students.records {
                    match db.insert_student(student).await {
                        Ok(()) => file_report.imported += 1,
                        Err(RecordError::DuplicateKey(_)) => file_report.skipped += 1,
                        Err(e) => {
                            warn!("Error importing student {}: {}", student.regno, e);
                            file_report.failed += 1;
                        }
                    }
                }
                finish_file(&students_path, &file_report).await;
                report.absorb(file_report);
            }
            Err(e) => warn!("Error reading local students for import: {}", e),
        }
    }

    let holidays_path = data_dir.join(HOLIDAYS_FILE);
    if holidays_path.exists() {
        match read_collection::<Holiday>(&holidays_path).await {
            Ok(holidays) => {
                let mut file_report = MigrationReport {
                    failed: holidays.rejected,
                    ..Default::default()
                };
                for holiday in &holidays.records {
                    match import_holiday(db, holiday).await {
                        Ok(true) => file_report.imported += 1,
                        Ok(false) => file_report.skipped += 1,
                        Err(e) => {
                            warn!("Error importing holiday {}: {}", holiday.id, e);
                            file_report.failed += 1;
                        }
                    }
                }
                finish_file(&holidays_path, &file_report).await;
                report.absorb(file_report);
            }
            Err(e) => warn!("Error reading local holidays for import: {}", e),
        }
    }

    report
}

async fn import_holiday(db: &DbConnection, holiday: &Holiday) -> RecordResult<bool> {
    if db.get_holiday(&holiday.id).await?.is_some() {
        return Ok(false);
    }
    db.insert_holiday(holiday).await?;
    Ok(true)
}

async fn finish_file(path: &Path, report: &MigrationReport) {
    if report.failed > 0 {
        return;
    }
    let target = migrated_path(path);
    if let Err(e) = tokio::fs::rename(path, &target).await {
        warn!("Could not rename {} after import: {}", path.display(), e);
    }
}

fn migrated_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".migrated");
    path.with_file_name(name)
}

impl MigrationReport {
    fn absorb(&mut self, other: MigrationReport) {
        self.imported += other.imported;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageMode;
    use chrono::{NaiveDate, Utc};
    use shared::StudentStatus;
    use std::time::Duration;
    use tempfile::TempDir;

    fn storage_config(database_url: String, data_dir: PathBuf) -> StorageConfig {
        StorageConfig {
            database_url,
            connect_timeout: Duration::from_secs(2),
            data_dir,
        }
    }

    fn unreachable_database(temp_dir: &TempDir) -> String {
        // mode=rw refuses to create the file, and its directory does not exist
        format!(
            "sqlite://{}?mode=rw",
            temp_dir.path().join("missing").join("records.db").display()
        )
    }

    fn reachable_database(temp_dir: &TempDir) -> String {
        format!("sqlite://{}?mode=rwc", temp_dir.path().join("records.db").display())
    }

    fn leftover_student(regno: &str) -> Student {
        Student {
            id: format!("{}-id", regno),
            name: "Leftover".to_string(),
            email: None,
            dob: None,
            age: Some(10),
            number: None,
            regno: regno.to_string(),
            classno: "4A".to_string(),
            photo: None,
            status: StudentStatus::Approved,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_falls_back_when_database_unreachable() {
        let temp_dir = TempDir::new().unwrap();
        let config = storage_config(unreachable_database(&temp_dir), temp_dir.path().join("data"));

        let store = select_store(&config).await.expect("fallback should load");
        assert_eq!(store.mode(), StorageMode::FileBacked);
    }

    #[tokio::test]
    async fn test_fallback_loads_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        let json = serde_json::to_vec(&vec![leftover_student("OLD1")]).unwrap();
        std::fs::write(data_dir.join(STUDENTS_FILE), json).unwrap();

        let config = storage_config(unreachable_database(&temp_dir), data_dir);
        let store = select_store(&config).await.unwrap();

        let found = store.find_student("old1").await.unwrap();
        assert_eq!(found.map(|s| s.name), Some("Leftover".to_string()));
    }

    #[tokio::test]
    async fn test_uses_database_when_reachable() {
        let temp_dir = TempDir::new().unwrap();
        let config = storage_config(reachable_database(&temp_dir), temp_dir.path().join("data"));

        let store = select_store(&config).await.unwrap();
        assert_eq!(store.mode(), StorageMode::Database);
    }

    #[tokio::test]
    async fn test_leftover_files_are_imported_once() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();

        let students = vec![leftover_student("M1"), leftover_student("M2")];
        std::fs::write(data_dir.join(STUDENTS_FILE), serde_json::to_vec(&students).unwrap())
            .unwrap();
        let holidays = vec![Holiday {
            id: "h-1".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 26).unwrap(),
            description: "Republic Day".to_string(),
            created_at: Utc::now(),
        }];
        std::fs::write(data_dir.join(HOLIDAYS_FILE), serde_json::to_vec(&holidays).unwrap())
            .unwrap();

        let config = storage_config(reachable_database(&temp_dir), data_dir.clone());
        let store = select_store(&config).await.unwrap();

        assert_eq!(store.list_students().await.unwrap().len(), 2);
        assert_eq!(store.list_holidays().await.unwrap().len(), 1);
        assert!(!data_dir.join(STUDENTS_FILE).exists());
        assert!(data_dir.join("students.json.migrated").exists());
        assert!(data_dir.join("holidays.json.migrated").exists());
    }

    #[tokio::test]
    async fn test_migration_skips_existing_registrations() {
        let temp_dir = TempDir::new().unwrap();
        let db = DbConnection::init_test().await.unwrap();
        db.insert_student(&leftover_student("DUP")).await.unwrap();

        let students = vec![leftover_student("dup"), leftover_student("NEW")];
        std::fs::write(
            temp_dir.path().join(STUDENTS_FILE),
            serde_json::to_vec(&students).unwrap(),
        )
        .unwrap();

        let report = migrate_leftovers(&db, temp_dir.path()).await;
        assert_eq!(
            report,
            MigrationReport {
                imported: 1,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_unreadable_entries_keep_the_file_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let db = DbConnection::init_test().await.unwrap();

        let mut negative_age = serde_json::to_value(leftover_student("BAD")).unwrap();
        negative_age["Age"] = serde_json::json!(-4);
        let entries = vec![serde_json::to_value(leftover_student("OK1")).unwrap(), negative_age];
        std::fs::write(
            temp_dir.path().join(STUDENTS_FILE),
            serde_json::to_vec(&entries).unwrap(),
        )
        .unwrap();

        let report = migrate_leftovers(&db, temp_dir.path()).await;
        assert_eq!(
            report,
            MigrationReport {
                imported: 1,
                skipped: 0,
                failed: 1
            }
        );
        assert!(temp_dir.path().join(STUDENTS_FILE).exists());
    }

    #[tokio::test]
    async fn test_migration_without_files_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let db = DbConnection::init_test().await.unwrap();

        let report = migrate_leftovers(&db, temp_dir.path()).await;
        assert_eq!(report, MigrationReport::default());
    }
}
