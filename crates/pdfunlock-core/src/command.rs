//! JSON request/response types shared by the drivers.
//!
//! Binary payloads travel as standard base64.

use std::collections::HashMap;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::batch::{unlock_batch, BatchReport, PasswordMap, ProcessingOutcome, SourceDocument};
use crate::decrypt::decrypt;
use crate::error::{DecryptError, UnlockError};

/// Single-document request: `{"fileBase64": "...", "password": "..."}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovePasswordRequest {
    #[serde(default)]
    pub file_base64: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovePasswordResponse {
    pub unlocked_base64: String,
}

/// Decode, unlock and re-encode a single document.
pub fn remove_password(req: &RemovePasswordRequest) -> Result<RemovePasswordResponse, UnlockError> {
    let file_base64 = req
        .file_base64
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| UnlockError::InvalidRequest("Missing \"fileBase64\"".into()))?;
    let password = req
        .password
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| UnlockError::InvalidRequest("Missing \"password\"".into()))?;

    let bytes = decode(file_base64, "fileBase64")?;
    let unlocked = decrypt(&bytes, password)?;

    Ok(RemovePasswordResponse {
        unlocked_base64: BASE64.encode(unlocked),
    })
}

/// One uploaded file in a batch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePayload {
    pub name: String,
    /// Base64-encoded PDF data
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    pub files: Vec<FilePayload>,
    /// Per-file passwords; these override `same_password`
    #[serde(default)]
    pub passwords: HashMap<String, String>,
    /// Password applied to every file
    #[serde(default)]
    pub same_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadPayload {
    pub file_name: String,
    pub mime_type: String,
    /// Base64-encoded PDF or ZIP data
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub document_count: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    /// True when at least one document was unlocked
    pub success: bool,
    pub outcomes: Vec<ProcessingOutcome>,
    pub download: Option<DownloadPayload>,
    pub metrics: ProcessMetrics,
}

/// A batch request with its uploads decoded.
///
/// Uploads whose data is not valid base64 never reach the decryptor; they
/// keep their slot in input order with a ready-made failure.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub documents: Vec<SourceDocument>,
    pub passwords: PasswordMap,
    /// One entry per upload: `None` for a decoded document, the failure otherwise
    slots: Vec<Option<ProcessingOutcome>>,
}

impl PreparedBatch {
    /// Number of uploads, decoded or not.
    pub fn upload_count(&self) -> usize {
        self.slots.len()
    }

    /// Unlock the decoded documents and merge the upload failures back into
    /// the outcomes, preserving input order.
    pub fn run(self) -> BatchReport {
        let mut report = unlock_batch(&self.documents, &self.passwords);
        let mut unlocked = std::mem::take(&mut report.outcomes).into_iter();
        report.outcomes = self
            .slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| unlocked.next()))
            .collect();
        report
    }
}

impl BatchRequest {
    /// Decode the uploads and build the password assignment.
    pub fn into_batch(self) -> PreparedBatch {
        let mut passwords = match self.same_password.as_deref() {
            Some(password) if !password.is_empty() => {
                PasswordMap::same_for_all(self.files.iter().map(|f| f.name.clone()), password)
            }
            _ => PasswordMap::new(),
        };
        for (name, password) in self.passwords {
            passwords.insert(name, password);
        }

        let mut documents = Vec::with_capacity(self.files.len());
        let mut slots = Vec::with_capacity(self.files.len());
        for file in self.files {
            match BASE64.decode(&file.data) {
                Ok(content) => {
                    documents.push(SourceDocument::new(file.name, content));
                    slots.push(None);
                }
                Err(e) => {
                    warn!("Upload {} is not valid base64: {}", file.name, e);
                    let err =
                        DecryptError::MalformedOrUnsupported(format!("invalid base64: {}", e));
                    slots.push(Some(ProcessingOutcome::failed(
                        &file.name,
                        err.reason(),
                        err.to_string(),
                    )));
                }
            }
        }

        PreparedBatch {
            documents,
            passwords,
            slots,
        }
    }
}

/// Run a batch request end to end.
pub fn run_batch(req: BatchRequest) -> Result<BatchResponse, UnlockError> {
    let start = Instant::now();
    let batch = req.into_batch();
    let document_count = batch.upload_count();
    let input_size_bytes = batch.documents.iter().map(|d| d.content.len()).sum();

    let report = batch.run();
    batch_response(&report, document_count, input_size_bytes, start)
}

fn batch_response(
    report: &BatchReport,
    document_count: usize,
    input_size_bytes: usize,
    start: Instant,
) -> Result<BatchResponse, UnlockError> {
    let download = report.download()?;
    let output_size_bytes = download.as_ref().map_or(0, |d| d.content().len());

    Ok(BatchResponse {
        success: report.success_count() > 0,
        outcomes: report.outcomes.clone(),
        download: download.map(|d| DownloadPayload {
            file_name: d.file_name().to_string(),
            mime_type: d.mime_type().to_string(),
            data: BASE64.encode(d.content()),
        }),
        metrics: ProcessMetrics {
            input_size_bytes,
            output_size_bytes,
            document_count,
            processing_time_ms: start.elapsed().as_millis() as u64,
        },
    })
}

fn decode(data: &str, what: &str) -> Result<Vec<u8>, UnlockError> {
    BASE64
        .decode(data)
        .map_err(|e| UnlockError::InvalidRequest(format!("Invalid base64 for {}: {}", what, e)))
}
