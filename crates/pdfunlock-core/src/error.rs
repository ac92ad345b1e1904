use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single document could not be unlocked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptError {
    #[error("PDF is not password protected")]
    NotEncrypted,

    #[error("Incorrect password")]
    WrongPassword,

    #[error("Error processing PDF: {0}")]
    MalformedOrUnsupported(String),
}

impl DecryptError {
    pub fn reason(&self) -> FailureReason {
        match self {
            DecryptError::NotEncrypted => FailureReason::NotEncrypted,
            DecryptError::WrongPassword => FailureReason::WrongPassword,
            DecryptError::MalformedOrUnsupported(_) => FailureReason::MalformedOrUnsupported,
        }
    }
}

/// Serializable tag of a [`DecryptError`], carried by failed outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NotEncrypted,
    WrongPassword,
    MalformedOrUnsupported,
}

#[derive(Error, Debug)]
pub enum UnlockError {
    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error("Archive operation failed: {0}")]
    Archive(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<zip::result::ZipError> for UnlockError {
    fn from(err: zip::result::ZipError) -> Self {
        UnlockError::Archive(err.to_string())
    }
}
