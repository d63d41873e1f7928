use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{Holiday, Student};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::traits::{
    calendar_order, newest_first, roster_order, HolidayStorage, RecordStore, StorageMode,
    StudentStorage,
};
use crate::domain::error::{RecordError, RecordResult};

pub const STUDENTS_FILE: &str = "students.json";
pub const HOLIDAYS_FILE: &str = "holidays.json";

/// Fallback store: both collections live in memory and every mutation
/// rewrites the whole corresponding JSON file before returning.
///
/// Each collection's mutex is held across the file write, so the in-memory
/// state only changes once the file write has succeeded.
pub struct JsonFileStore {
    students_path: PathBuf,
    holidays_path: PathBuf,
    students: Mutex<Vec<Student>>,
    holidays: Mutex<Vec<Holiday>>,
}

impl JsonFileStore {
    /// Load both collections from `data_dir`, creating the directory if needed
    pub async fn load(data_dir: impl AsRef<Path>) -> RecordResult<Self> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir).await?;

        let students_path = data_dir.join(STUDENTS_FILE);
        let holidays_path = data_dir.join(HOLIDAYS_FILE);

        let students: Vec<Student> = load_collection(&students_path).await;
        let holidays: Vec<Holiday> = load_collection(&holidays_path).await;

        info!(
            "Loaded {} students and {} holidays from {}",
            students.len(),
            holidays.len(),
            data_dir.display()
        );

        Ok(Self {
            students_path,
            holidays_path,
            students: Mutex::new(students),
            holidays: Mutex::new(holidays),
        })
    }

    #[cfg(test)]
    pub(crate) fn students_path(&self) -> &Path {
        &self.students_path
    }
}

/// Records decoded from a collection file, plus how many entries were refused
#[derive(Debug)]
pub struct Collection<T> {
    pub records: Vec<T>,
    pub rejected: usize,
}

/// Read a JSON collection file, decoding each entry on its own.
///
/// A missing file is an empty collection. Entries that do not fit the
/// record type are logged and counted in `rejected`; the rest still load.
pub async fn read_collection<T: DeserializeOwned>(path: &Path) -> RecordResult<Collection<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(Collection {
                records: Vec::new(),
                rejected: 0,
            })
        }
        Err(e) => return Err(e.into()),
    };

    let entries: Vec<serde_json::Value> = serde_json::from_slice(&bytes)?;
    let mut records = Vec::with_capacity(entries.len());
    let mut rejected = 0;
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value(entry) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Skipping entry {} of {}: {}", index, path.display(), e);
                rejected += 1;
            }
        }
    }
    Ok(Collection { records, rejected })
}

/// Load a collection for the fallback store.
///
/// The next mutation rewrites the whole file, so a file that could not be
/// read completely is copied aside first.
async fn load_collection<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    match read_collection(path).await {
        Ok(collection) if collection.rejected == 0 => collection.records,
        Ok(collection) => {
            warn!(
                "{} unreadable entries in {}",
                collection.rejected,
                path.display()
            );
            keep_copy(path).await;
            collection.records
        }
        Err(e) => {
            error!("Error reading local data from {}: {}", path.display(), e);
            keep_copy(path).await;
            Vec::new()
        }
    }
}

/// Copy `path` to `<name>.<millis>.bak` next to it
async fn keep_copy(path: &Path) {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}.bak", chrono::Utc::now().timestamp_millis()));
    let backup = PathBuf::from(name);

    match tokio::fs::copy(path, &backup).await {
        Ok(_) => info!("Kept a copy of {} at {}", path.display(), backup.display()),
        Err(e) => error!("Could not copy {} aside: {}", path.display(), e),
    }
}

async fn write_collection<T: Serialize>(path: &Path, items: &[T]) -> RecordResult<()> {
    let json = serde_json::to_vec_pretty(items)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[async_trait]
impl StudentStorage for JsonFileStore {
    async fn insert_student(&self, student: &Student) -> RecordResult<()> {
        let mut students = self.students.lock().await;
        if students.iter().any(|s| s.matches_regno(&student.regno)) {
            return Err(RecordError::DuplicateKey(student.regno.clone()));
        }

        let mut next = students.clone();
        next.push(student.clone());
        write_collection(&self.students_path, &next).await?;
        *students = next;
        Ok(())
    }

    async fn find_student(&self, regno: &str) -> RecordResult<Option<Student>> {
        let students = self.students.lock().await;
        Ok(students.iter().find(|s| s.matches_regno(regno)).cloned())
    }

    async fn list_students(&self) -> RecordResult<Vec<Student>> {
        let mut all = self.students.lock().await.clone();
        all.sort_by(newest_first);
        Ok(all)
    }

    async fn list_students_in_class(&self, classno: &str) -> RecordResult<Vec<Student>> {
        let mut roster: Vec<Student> = self
            .students
            .lock()
            .await
            .iter()
            .filter(|s| s.classno == classno)
            .cloned()
            .collect();
        roster.sort_by(roster_order);
        Ok(roster)
    }

    async fn replace_student(&self, student: &Student) -> RecordResult<bool> {
        let mut students = self.students.lock().await;
        let Some(index) = students.iter().position(|s| s.id == student.id) else {
            return Ok(false);
        };

        let mut next = students.clone();
        let current = &mut next[index];
        // Key and creation time never change through an update
        *current = Student {
            id: current.id.clone(),
            regno: current.regno.clone(),
            created_at: current.created_at,
            ..student.clone()
        };
        write_collection(&self.students_path, &next).await?;
        *students = next;
        Ok(true)
    }

    async fn delete_student(&self, regno: &str) -> RecordResult<Option<Student>> {
        let mut students = self.students.lock().await;
        let Some(index) = students.iter().position(|s| s.matches_regno(regno)) else {
            return Ok(None);
        };

        let mut next = students.clone();
        let removed = next.remove(index);
        write_collection(&self.students_path, &next).await?;
        *students = next;
        Ok(Some(removed))
    }

    async fn delete_all_students(&self) -> RecordResult<u64> {
        let mut students = self.students.lock().await;
        write_collection::<Student>(&self.students_path, &[]).await?;
        let removed = students.len() as u64;
        students.clear();
        Ok(removed)
    }
}

#[async_trait]
impl HolidayStorage for JsonFileStore {
    async fn insert_holiday(&self, holiday: &Holiday) -> RecordResult<()> {
        let mut holidays = self.holidays.lock().await;
        let mut next = holidays.clone();
        next.push(holiday.clone());
        write_collection(&self.holidays_path, &next).await?;
        *holidays = next;
        Ok(())
    }

    async fn get_holiday(&self, id: &str) -> RecordResult<Option<Holiday>> {
        let holidays = self.holidays.lock().await;
        Ok(holidays.iter().find(|h| h.id == id).cloned())
    }

    async fn list_holidays(&self) -> RecordResult<Vec<Holiday>> {
        let mut all = self.holidays.lock().await.clone();
        all.sort_by(calendar_order);
        Ok(all)
    }

    async fn replace_holiday(&self, holiday: &Holiday) -> RecordResult<bool> {
        let mut holidays = self.holidays.lock().await;
        let Some(index) = holidays.iter().position(|h| h.id == holiday.id) else {
            return Ok(false);
        };

        let mut next = holidays.clone();
        next[index].date = holiday.date;
        next[index].description = holiday.description.clone();
        write_collection(&self.holidays_path, &next).await?;
        *holidays = next;
        Ok(true)
    }

    async fn delete_holiday(&self, id: &str) -> RecordResult<bool> {
        let mut holidays = self.holidays.lock().await;
        let Some(index) = holidays.iter().position(|h| h.id == id) else {
            return Ok(false);
        };

        let mut next = holidays.clone();
        next.remove(index);
        write_collection(&self.holidays_path, &next).await?;
        *holidays = next;
        Ok(true)
    }
}

impl RecordStore for JsonFileStore {
    fn mode(&self) -> StorageMode {
        StorageMode::FileBacked
    }
}
