//! # Photo Assets
//!
//! Uploaded photos live as plain files in one directory and are referenced
//! from student records as `/uploads/<file>`. Only the student service
//! stores or removes them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::error::{RecordError, RecordResult};

pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;
pub const UPLOAD_URL_PREFIX: &str = "/uploads";

const ALLOWED_EXTENSIONS: [&str; 4] = ["jpeg", "jpg", "png", "gif"];
const ALLOWED_MEDIA_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/gif"];

/// A photo received with a create or update request, not yet stored
#[derive(Debug, Clone, Default)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Clone)]
pub struct AssetManager {
    upload_dir: PathBuf,
    last_stamp: Arc<AtomicI64>,
}

impl AssetManager {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            last_stamp: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Validate and write a photo, returning its reference path
    pub async fn store(&self, upload: &PhotoUpload) -> RecordResult<String> {
        let extension = validate_photo(upload)?;

        tokio::fs::create_dir_all(&self.upload_dir).await?;

        loop {
            let file_name = format!("{}.{}", self.next_stamp(), extension);
            let path = self.upload_dir.join(&file_name);

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                // Another process wrote the same millisecond
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };

            if let Err(e) = write_all(&mut file, &upload.bytes).await {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e.into());
            }

            info!("Stored photo {} ({} bytes)", file_name, upload.bytes.len());
            return Ok(format!("{}/{}", UPLOAD_URL_PREFIX, file_name));
        }
    }

    /// Delete a stored photo. Missing files are not an error.
    pub async fn remove(&self, reference: &str) -> RecordResult<()> {
        let Some(file_name) = Path::new(reference).file_name() else {
            return Ok(());
        };

        match tokio::fs::remove_file(self.upload_dir.join(file_name)).await {
            Ok(()) => {
                info!("Removed photo {}", reference);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Photo {} already gone", reference);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every file in the upload directory, returning how many were removed
    pub async fn clear(&self) -> RecordResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.upload_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        info!("Cleared {} files from {}", removed, self.upload_dir.display());
        Ok(removed)
    }

    /// Milliseconds since the epoch, bumped past the previous value if needed
    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }
}

async fn write_all(file: &mut tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}

/// Check type, extension and size; returns the extension to store under
pub(crate) fn validate_photo(upload: &PhotoUpload) -> RecordResult<String> {
    let media_type = upload
        .content_type
        .as_deref()
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_MEDIA_TYPES.contains(&media_type.as_str()) {
        return Err(only_images());
    }

    let declared_extension = upload
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    let extension = match declared_extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => ext,
        Some(_) => return Err(only_images()),
        None => media_type.trim_start_matches("image/").to_string(),
    };

    if upload.bytes.is_empty() {
        return Err(RecordError::PayloadRejected("Uploaded photo is empty".to_string()));
    }
    if upload.bytes.len() > MAX_PHOTO_BYTES {
        return Err(RecordError::PayloadRejected("File too large".to_string()));
    }

    Ok(extension)
}

fn only_images() -> RecordError {
    RecordError::PayloadRejected("Only image files are allowed".to_string())
}
