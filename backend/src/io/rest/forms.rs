//! Multipart parsing for the student registration form.

use axum::{
    async_trait,
    extract::{multipart::MultipartError, FromRequest, Multipart, Request},
    http::StatusCode,
};
use shared::{CreateStudentRequest, UpdateStudentRequest};
use std::collections::HashMap;

use super::error::ApiError;
use crate::domain::assets::MAX_PHOTO_BYTES;
use crate::domain::{PhotoUpload, RecordError};

pub const PHOTO_FIELD: &str = "photo";

/// Text fields and the optional photo of a submitted registration form.
/// Empty text fields are dropped, so they count as absent.
#[derive(Debug, Default)]
pub struct StudentForm {
    fields: HashMap<String, String>,
    pub photo: Option<PhotoUpload>,
}

impl StudentForm {
    fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn into_create_request(mut self) -> (CreateStudentRequest, Option<PhotoUpload>) {
        let request = CreateStudentRequest {
            name: self.take("Name"),
            email: self.take("Email"),
            dob: self.take("Dob"),
            age: self.take("Age"),
            number: self.take("Number"),
            regno: self.take("Regno"),
            classno: self.take("Classno"),
            status: self.take("status"),
        };
        (request, self.photo)
    }

    pub fn into_update_request(mut self) -> (UpdateStudentRequest, Option<PhotoUpload>) {
        let request = UpdateStudentRequest {
            name: self.take("Name"),
            email: self.take("Email"),
            dob: self.take("Dob"),
            age: self.take("Age"),
            number: self.take("Number"),
            classno: self.take("Classno"),
        };
        (request, self.photo)
    }
}

#[async_trait]
impl<S> FromRequest<S> for StudentForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state).await.map_err(|e| {
            ApiError::new(
                RecordError::PayloadRejected(e.body_text()),
                "Invalid form submission",
            )
        })?;

        let mut form = StudentForm::default();
        while let Some(mut field) = multipart.next_field().await.map_err(rejected)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == PHOTO_FIELD {
                let content_type = field.content_type().map(str::to_string);
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.is_empty());

                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(rejected)? {
                    if bytes.len() + chunk.len() > MAX_PHOTO_BYTES {
                        return Err(too_large());
                    }
                    bytes.extend_from_slice(&chunk);
                }

                // Browsers send an empty part when no file was chosen
                if bytes.is_empty() && file_name.is_none() {
                    continue;
                }
                form.photo = Some(PhotoUpload {
                    bytes,
                    content_type,
                    file_name,
                });
            } else {
                let value = field.text().await.map_err(rejected)?;
                if !value.trim().is_empty() {
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }
}

fn rejected(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large();
    }
    ApiError::new(
        RecordError::PayloadRejected(err.body_text()),
        "Invalid form submission",
    )
}

fn too_large() -> ApiError {
    ApiError::new(
        RecordError::PayloadRejected("File too large".to_string()),
        "Invalid form submission",
    )
}
