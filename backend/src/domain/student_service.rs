use chrono::Utc;
use shared::{CreateStudentRequest, Student, StudentStatus, UpdateStudentRequest};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::assets::{validate_photo, AssetManager, PhotoUpload};
use super::error::{RecordError, RecordResult};
use super::models::{optional_text, parse_dob, required_text, resolve_age, today};
use crate::storage::RecordStore;

/// Service for managing student registrations.
///
/// All rules live here so the database and file backends behave the same.
/// Mutations are serialized by `write_lock`, held from the existence check
/// through the write and any photo cleanup.
#[derive(Clone)]
pub struct StudentService {
    store: Arc<dyn RecordStore>,
    assets: AssetManager,
    write_lock: Arc<Mutex<()>>,
}

impl StudentService {
    pub fn new(store: Arc<dyn RecordStore>, assets: AssetManager) -> Self {
        Self {
            store,
            assets,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Register a new student, storing the photo if one was sent
    pub async fn create_student(
        &self,
        request: CreateStudentRequest,
        photo: Option<PhotoUpload>,
    ) -> RecordResult<Student> {
        info!("Creating student: regno={:?}, class={:?}", request.regno, request.classno);

        let regno = required_text(request.regno, "Registration number is required")?;
        let name = required_text(request.name, "Name is required")?;
        let classno = required_text(request.classno, "Class is required")?;
        let status = match optional_text(request.status) {
            Some(raw) => parse_status(&raw)?,
            None => StudentStatus::Pending,
        };
        let dob = optional_text(request.dob).as_deref().map(parse_dob).transpose()?;
        let age_field = optional_text(request.age);
        let age = resolve_age(dob, age_field.as_deref(), today())?;
        if let Some(upload) = &photo {
            validate_photo(upload)?;
        }

        let _guard = self.write_lock.lock().await;

        if self.store.find_student(&regno).await?.is_some() {
            warn!("Student already exists: {}", regno);
            return Err(RecordError::DuplicateKey(regno));
        }

        let photo = match photo {
            Some(upload) => Some(self.assets.store(&upload).await?),
            None => None,
        };

        let student = Student {
            id: Uuid::new_v4().to_string(),
            name,
            email: optional_text(request.email),
            dob,
            age,
            number: optional_text(request.number),
            regno,
            classno,
            photo,
            status,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.insert_student(&student).await {
            self.discard_photo(student.photo.as_deref()).await;
            return Err(e);
        }

        info!("Created student {} with ID: {}", student.regno, student.id);
        Ok(student)
    }

    pub async fn get_student(&self, regno: &str) -> RecordResult<Student> {
        info!("Getting student: {}", regno);
        self.store
            .find_student(regno)
            .await?
            .ok_or(RecordError::NotFound("Student"))
    }

    /// All students, newest first
    pub async fn list_students(&self) -> RecordResult<Vec<Student>> {
        let students = self.store.list_students().await?;
        info!("Found {} students", students.len());
        Ok(students)
    }

    /// Class roster, alphabetical by name
    pub async fn list_students_in_class(&self, classno: &str) -> RecordResult<Vec<Student>> {
        let roster = self.store.list_students_in_class(classno).await?;
        info!("Found {} students in class {}", roster.len(), classno);
        Ok(roster)
    }

    /// Apply the fields present in `request`; absent fields keep their value.
    ///
    /// A new photo replaces the old one, which is deleted once the record
    /// has been saved.
    pub async fn update_student(
        &self,
        regno: &str,
        request: UpdateStudentRequest,
        photo: Option<PhotoUpload>,
    ) -> RecordResult<Student> {
        info!("Updating student: {}", regno);

        let new_dob = optional_text(request.dob).as_deref().map(parse_dob).transpose()?;
        let new_age = optional_text(request.age);
        if let Some(upload) = &photo {
            validate_photo(upload)?;
        }

        let _guard = self.write_lock.lock().await;

        let existing = self
            .store
            .find_student(regno)
            .await?
            .ok_or(RecordError::NotFound("Student"))?;

        let mut updated = existing.clone();
        if let Some(name) = optional_text(request.name) {
            updated.name = name;
        }
        if let Some(email) = optional_text(request.email) {
            updated.email = Some(email);
        }
        if let Some(number) = optional_text(request.number) {
            updated.number = Some(number);
        }
        if let Some(classno) = optional_text(request.classno) {
            updated.classno = classno;
        }
        if new_dob.is_some() || new_age.is_some() {
            let dob = new_dob.or(existing.dob);
            updated.age = resolve_age(dob, new_age.as_deref(), today())?;
            updated.dob = dob;
        }

        if let Some(upload) = photo {
            updated.photo = Some(self.assets.store(&upload).await?);
        }
        let photo_replaced = updated.photo != existing.photo;

        let saved = match self.store.replace_student(&updated).await {
            Ok(saved) => saved,
            Err(e) => {
                if photo_replaced {
                    self.discard_photo(updated.photo.as_deref()).await;
                }
                return Err(e);
            }
        };
        if !saved {
            if photo_replaced {
                self.discard_photo(updated.photo.as_deref()).await;
            }
            return Err(RecordError::NotFound("Student"));
        }

        if photo_replaced {
            self.discard_photo(existing.photo.as_deref()).await;
        }

        info!("Updated student {}", updated.regno);
        Ok(updated)
    }

    /// Set the approval status. The value is checked before the lookup.
    pub async fn update_status(&self, regno: &str, status: Option<String>) -> RecordResult<Student> {
        let status = optional_text(status)
            .ok_or_else(|| RecordError::validation("Valid status is required"))
            .and_then(|raw| parse_status(&raw))?;
        info!("Updating status of {} to {}", regno, status);

        let _guard = self.write_lock.lock().await;

        let mut student = self
            .store
            .find_student(regno)
            .await?
            .ok_or(RecordError::NotFound("Student"))?;
        student.status = status;

        if !self.store.replace_student(&student).await? {
            return Err(RecordError::NotFound("Student"));
        }
        Ok(student)
    }

    /// Remove a student and its photo
    pub async fn delete_student(&self, regno: &str) -> RecordResult<Student> {
        info!("Deleting student: {}", regno);

        let _guard = self.write_lock.lock().await;

        let removed = self
            .store
            .delete_student(regno)
            .await?
            .ok_or(RecordError::NotFound("Student"))?;
        self.discard_photo(removed.photo.as_deref()).await;

        info!("Deleted student {}", removed.regno);
        Ok(removed)
    }

    /// Remove every student and every uploaded file
    pub async fn delete_all_students(&self) -> RecordResult<u64> {
        let _guard = self.write_lock.lock().await;

        let removed = self.store.delete_all_students().await?;
        self.assets.clear().await?;

        info!("Deleted all {} students", removed);
        Ok(removed)
    }

    /// Best-effort photo removal; failures are logged only
    async fn discard_photo(&self, reference: Option<&str>) {
        let Some(reference) = reference else {
            return;
        };
        if let Err(e) = self.assets.remove(reference).await {
            error!("Error deleting photo {}: {}", reference, e);
        }
    }
}

fn parse_status(raw: &str) -> RecordResult<StudentStatus> {
    raw.parse::<StudentStatus>()
        .map_err(|_| RecordError::validation("Valid status is required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::age_on;
    use crate::storage::{DbConnection, JsonFileStore, StorageMode};
    use chrono::{Datelike, NaiveDate};
    use tempfile::TempDir;

    struct Fixture {
        service: StudentService,
        uploads: TempDir,
        _data: TempDir,
        mode: StorageMode,
    }

    async fn fixtures() -> Vec<Fixture> {
        let mut all = Vec::new();

        let db: Arc<dyn RecordStore> = Arc::new(DbConnection::init_test().await.unwrap());
        let uploads = TempDir::new().unwrap();
        all.push(Fixture {
            service: StudentService::new(db, AssetManager::new(uploads.path())),
            uploads,
            _data: TempDir::new().unwrap(),
            mode: StorageMode::Database,
        });

        let data = TempDir::new().unwrap();
        let files: Arc<dyn RecordStore> = Arc::new(JsonFileStore::load(data.path()).await.unwrap());
        let uploads = TempDir::new().unwrap();
        all.push(Fixture {
            service: StudentService::new(files, AssetManager::new(uploads.path())),
            uploads,
            _data: data,
            mode: StorageMode::FileBacked,
        });

        all
    }

    fn request(regno: &str, name: &str, classno: &str) -> CreateStudentRequest {
        CreateStudentRequest {
            name: Some(name.to_string()),
            regno: Some(regno.to_string()),
            classno: Some(classno.to_string()),
            age: Some("12".to_string()),
            ..Default::default()
        }
    }

    fn jpeg() -> PhotoUpload {
        PhotoUpload {
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
            content_type: Some("image/jpeg".to_string()),
            file_name: Some("face.jpg".to_string()),
        }
    }

    fn years_ago(years: i32) -> NaiveDate {
        let today = today();
        // Feb 29 has no counterpart in most years
        NaiveDate::from_ymd_opt(today.year() - years, today.month(), today.day())
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(today.year() - years, 3, 1).unwrap())
    }

    fn upload_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_regno_lookup_and_uniqueness_ignore_case() {
        for fx in fixtures().await {
            let created = fx.service.create_student(request("R001", "Asha", "7A"), None).await.unwrap();

            let found = fx.service.get_student("r001").await.unwrap();
            assert_eq!(found.id, created.id, "{}", fx.mode);

            let result = fx.service.create_student(request("r001", "Other", "7B"), None).await;
            assert!(matches!(result, Err(RecordError::DuplicateKey(_))), "{}", fx.mode);
            assert_eq!(fx.service.list_students().await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_required_fields() {
        for fx in fixtures().await {
            let mut missing_regno = request("X", "Asha", "7A");
            missing_regno.regno = Some("   ".to_string());
            let err = fx.service.create_student(missing_regno, None).await.unwrap_err();
            assert_eq!(err.to_string(), "Registration number is required");

            let mut missing_class = request("X", "Asha", "7A");
            missing_class.classno = None;
            assert!(matches!(
                fx.service.create_student(missing_class, None).await,
                Err(RecordError::Validation(_))
            ));

            let mut bad_status = request("X", "Asha", "7A");
            bad_status.status = Some("rejected".to_string());
            assert!(matches!(
                fx.service.create_student(bad_status, Some(jpeg())).await,
                Err(RecordError::Validation(_))
            ));
            assert_eq!(upload_count(&fx.uploads), 0);
        }
    }

    #[tokio::test]
    async fn test_registration_scenario() {
        for fx in fixtures().await {
            let dob = years_ago(18);
            let create = CreateStudentRequest {
                name: Some("Meera".to_string()),
                regno: Some("R001".to_string()),
                classno: Some("7A".to_string()),
                dob: Some(dob.format("%Y-%m-%d").to_string()),
                ..Default::default()
            };
            let student = fx.service.create_student(create, None).await.unwrap();
            assert_eq!(student.status, StudentStatus::Pending);
            assert_eq!(student.age, Some(age_on(dob, today()) as u8));
            assert_eq!(student.age, Some(18));

            let approved = fx
                .service
                .update_status("R001", Some("approved".to_string()))
                .await
                .unwrap();
            assert_eq!(approved.status, StudentStatus::Approved);

            let roster = fx.service.list_students_in_class("7A").await.unwrap();
            assert_eq!(roster.len(), 1);
            assert_eq!(roster[0].status, StudentStatus::Approved);
        }
    }

    #[tokio::test]
    async fn test_age_out_of_range_is_never_stored() {
        for fx in fixtures().await {
            let mut too_young = request("Y1", "Tiny", "1A");
            too_young.dob = Some(years_ago(2).format("%Y-%m-%d").to_string());
            assert!(fx.service.create_student(too_young, None).await.is_err());

            let mut too_old = request("Y2", "Elder", "1A");
            too_old.age = Some("101".to_string());
            assert!(fx.service.create_student(too_old, None).await.is_err());

            assert!(fx.service.list_students().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        for fx in fixtures().await {
            let mut create = request("P1", "Kiran", "4A");
            create.email = Some("kiran@example.com".to_string());
            let original = fx.service.create_student(create, Some(jpeg())).await.unwrap();

            let update = UpdateStudentRequest {
                classno: Some("5B".to_string()),
                ..Default::default()
            };
            let updated = fx.service.update_student("p1", update, None).await.unwrap();

            assert_eq!(updated.classno, "5B");
            assert_eq!(updated.name, original.name);
            assert_eq!(updated.email, original.email);
            assert_eq!(updated.photo, original.photo);
            assert_eq!(updated.status, original.status);
            assert_eq!(updated.created_at, original.created_at);
            assert_eq!(fx.service.get_student("P1").await.unwrap(), updated);
        }
    }

    #[tokio::test]
    async fn test_photo_replacement_removes_old_file() {
        for fx in fixtures().await {
            let original = fx
                .service
                .create_student(request("F1", "Farah", "3C"), Some(jpeg()))
                .await
                .unwrap();
            let old_photo = original.photo.clone().unwrap();

            let updated = fx
                .service
                .update_student("F1", UpdateStudentRequest::default(), Some(jpeg()))
                .await
                .unwrap();
            let new_photo = updated.photo.clone().unwrap();

            assert_ne!(old_photo, new_photo);
            let old_name = old_photo.trim_start_matches("/uploads/");
            let new_name = new_photo.trim_start_matches("/uploads/");
            assert!(!fx.uploads.path().join(old_name).exists());
            assert!(fx.uploads.path().join(new_name).exists());
        }
    }

    #[tokio::test]
    async fn test_failed_requests_leave_no_photo_behind() {
        for fx in fixtures().await {
            fx.service.create_student(request("D1", "Dev", "2B"), None).await.unwrap();

            let duplicate = fx.service.create_student(request("d1", "Dev", "2B"), Some(jpeg())).await;
            assert!(matches!(duplicate, Err(RecordError::DuplicateKey(_))));

            let missing = fx
                .service
                .update_student("nobody", UpdateStudentRequest::default(), Some(jpeg()))
                .await;
            assert!(matches!(missing, Err(RecordError::NotFound(_))));

            assert_eq!(upload_count(&fx.uploads), 0, "{}", fx.mode);
        }
    }

    #[tokio::test]
    async fn test_bad_photo_is_rejected_before_lookup() {
        for fx in fixtures().await {
            fx.service.create_student(request("R1", "Ravi", "3A"), None).await.unwrap();
            let pdf = PhotoUpload {
                bytes: b"%PDF-1.4".to_vec(),
                content_type: Some("application/pdf".to_string()),
                file_name: Some("form.pdf".to_string()),
            };

            let taken = fx.service.create_student(request("r1", "Ravi", "3A"), Some(pdf.clone())).await;
            assert!(matches!(taken, Err(RecordError::PayloadRejected(_))), "{}", fx.mode);

            let unknown = fx
                .service
                .update_student("nobody", UpdateStudentRequest::default(), Some(pdf))
                .await;
            assert!(matches!(unknown, Err(RecordError::PayloadRejected(_))), "{}", fx.mode);
            assert_eq!(upload_count(&fx.uploads), 0);
        }
    }

    /// Leaves a directory where the student's photo file should be, so
    /// removing the photo fails
    async fn student_with_stuck_photo(fx: &Fixture, regno: &str) -> Student {
        let student = fx
            .service
            .create_student(request(regno, "Stuck", "2A"), Some(jpeg()))
            .await
            .unwrap();
        let photo = student.photo.clone().unwrap();
        let path = fx.uploads.path().join(photo.trim_start_matches("/uploads/"));
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        student
    }

    #[tokio::test]
    async fn test_failed_photo_removal_does_not_block_delete() {
        for fx in fixtures().await {
            student_with_stuck_photo(&fx, "S1").await;

            fx.service.delete_student("S1").await.unwrap();
            assert!(matches!(
                fx.service.get_student("S1").await,
                Err(RecordError::NotFound(_))
            ), "{}", fx.mode);
        }
    }

    #[tokio::test]
    async fn test_failed_photo_removal_does_not_block_update() {
        for fx in fixtures().await {
            let original = student_with_stuck_photo(&fx, "S2").await;

            let updated = fx
                .service
                .update_student("S2", UpdateStudentRequest::default(), Some(jpeg()))
                .await
                .unwrap();
            assert_ne!(updated.photo, original.photo, "{}", fx.mode);
            assert_eq!(fx.service.get_student("S2").await.unwrap().photo, updated.photo);
        }
    }

    #[tokio::test]
    async fn test_status_is_validated_before_lookup() {
        for fx in fixtures().await {
            let bad = fx.service.update_status("nobody", Some("done".to_string())).await;
            assert!(matches!(bad, Err(RecordError::Validation(_))));

            let missing = fx.service.update_status("nobody", None).await;
            assert!(matches!(missing, Err(RecordError::Validation(_))));

            let not_found = fx.service.update_status("nobody", Some("approved".to_string())).await;
            assert!(matches!(not_found, Err(RecordError::NotFound(_))));
        }
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_photo() {
        for fx in fixtures().await {
            fx.service
                .create_student(request("X1", "Xavier", "8A"), Some(jpeg()))
                .await
                .unwrap();
            assert_eq!(upload_count(&fx.uploads), 1);

            fx.service.delete_student("x1").await.unwrap();
            assert_eq!(upload_count(&fx.uploads), 0);
            assert!(matches!(
                fx.service.get_student("X1").await,
                Err(RecordError::NotFound(_))
            ));
            assert!(matches!(
                fx.service.delete_student("X1").await,
                Err(RecordError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_delete_all_clears_records_and_uploads() {
        for fx in fixtures().await {
            fx.service.create_student(request("A1", "A", "1A"), Some(jpeg())).await.unwrap();
            fx.service.create_student(request("A2", "B", "1A"), Some(jpeg())).await.unwrap();

            assert_eq!(fx.service.delete_all_students().await.unwrap(), 2);
            assert!(fx.service.list_students().await.unwrap().is_empty());
            assert_eq!(upload_count(&fx.uploads), 0);
        }
    }

    #[tokio::test]
    async fn test_listing_orders() {
        for fx in fixtures().await {
            fx.service.create_student(request("L1", "zoe", "9A"), None).await.unwrap();
            fx.service.create_student(request("L2", "Adam", "9A"), None).await.unwrap();
            fx.service.create_student(request("L3", "bella", "9B"), None).await.unwrap();

            let newest: Vec<_> = fx
                .service
                .list_students()
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.regno)
                .collect();
            assert_eq!(newest, ["L3", "L2", "L1"], "{}", fx.mode);

            let roster: Vec<_> = fx
                .service
                .list_students_in_class("9A")
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.name)
                .collect();
            assert_eq!(roster, ["Adam", "zoe"]);
        }
    }

    #[tokio::test]
    async fn test_file_backed_records_survive_restart() {
        let data = TempDir::new().unwrap();
        let uploads = TempDir::new().unwrap();

        let store = Arc::new(JsonFileStore::load(data.path()).await.unwrap());
        let service = StudentService::new(store, AssetManager::new(uploads.path()));
        service.create_student(request("S1", "Sam", "6A"), None).await.unwrap();
        drop(service);

        let reloaded = Arc::new(JsonFileStore::load(data.path()).await.unwrap());
        let service = StudentService::new(reloaded, AssetManager::new(uploads.path()));
        let all = service.list_students().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].regno, "S1");
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        for fx in fixtures().await {
            fx.service.create_student(request("C1", "Chen", "5A"), None).await.unwrap();

            let name_update = UpdateStudentRequest {
                name: Some("Chen Li".to_string()),
                ..Default::default()
            };
            let class_update = UpdateStudentRequest {
                classno: Some("5B".to_string()),
                ..Default::default()
            };
            let (a, b) = tokio::join!(
                fx.service.update_student("C1", name_update, None),
                fx.service.update_student("C1", class_update, None),
            );
            a.unwrap();
            b.unwrap();

            let stored = fx.service.get_student("C1").await.unwrap();
            assert_eq!(stored.name, "Chen Li");
            assert_eq!(stored.classno, "5B");
        }
    }
}
