//! PDF password removal
//!
//! This crate decrypts password-protected PDFs in memory using lopdf and the
//! standard security handler, then packages the results for download.
//!
//! - `decrypt`: one document, one password
//! - `unlock_batch`: many documents with per-document passwords, with
//!   failures isolated per document
//! - `archive` / `extract`: ZIP packaging of unlocked files

pub mod archive;
pub mod batch;
pub mod cipher;
pub mod command;
pub mod decrypt;
pub mod error;
pub mod security;

pub use archive::{archive, extract, ARCHIVE_NAME};
pub use batch::{
    output_name, unlock_batch, unlock_batch_with_progress, BatchProgress, BatchReport, Download,
    OutcomeKind, PasswordMap, ProcessingOutcome, SourceDocument, UnlockedFile,
};
pub use command::{
    remove_password, run_batch, BatchRequest, BatchResponse, DownloadPayload, FilePayload,
    PreparedBatch, ProcessMetrics, RemovePasswordRequest, RemovePasswordResponse,
};
pub use decrypt::{decrypt, is_encrypted, page_count};
pub use error::{DecryptError, FailureReason, UnlockError};
