/// Failure conditions shared by every record operation, whichever storage
/// backend is active.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    PayloadRejected(String),
    #[error("Student with this registration number already exists")]
    DuplicateKey(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] anyhow::Error),
}

pub type RecordResult<T> = Result<T, RecordError>;

impl RecordError {
    pub fn validation(message: impl Into<String>) -> Self {
        RecordError::Validation(message.into())
    }
}

impl From<sqlx::Error> for RecordError {
    fn from(err: sqlx::Error) -> Self {
        RecordError::StorageUnavailable(err.into())
    }
}

impl From<std::io::Error> for RecordError {
    fn from(err: std::io::Error) -> Self {
        RecordError::StorageUnavailable(err.into())
    }
}

impl From<serde_json::Error> for RecordError {
    fn from(err: serde_json::Error) -> Self {
        RecordError::StorageUnavailable(err.into())
    }
}
