//! Batch driver
//!
//! Runs the decryptor over every document in input order, records one outcome
//! per document and collects the unlocked files. One document failing never
//! stops the rest of the batch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::archive::{archive, ARCHIVE_NAME};
use crate::decrypt::decrypt;
use crate::error::{FailureReason, UnlockError};

pub const OUTPUT_PREFIX: &str = "unlocked_";

pub const PDF_MIME: &str = "application/pdf";
pub const ZIP_MIME: &str = "application/zip";

/// An input document, identified by its original file name.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub content: Vec<u8>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A successfully unlocked document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockedFile {
    pub name: String,
    pub content: Vec<u8>,
}

/// Passwords keyed by source file name.
#[derive(Debug, Clone, Default)]
pub struct PasswordMap {
    passwords: HashMap<String, String>,
}

impl PasswordMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign one password to every listed document.
    pub fn same_for_all<I, S>(names: I, password: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let passwords = names
            .into_iter()
            .map(|name| (name.into(), password.to_string()))
            .collect();
        Self { passwords }
    }

    /// Assign (or replace) the password for `name`.
    pub fn insert(&mut self, name: impl Into<String>, password: impl Into<String>) {
        self.passwords.insert(name.into(), password.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.passwords.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.passwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passwords.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PasswordMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            passwords: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "success"),
            OutcomeKind::Failed => write!(f, "failed"),
            OutcomeKind::Skipped => write!(f, "skipped"),
        }
    }
}

/// What happened to one input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub source_name: String,
    pub kind: OutcomeKind,
    pub message: String,
    /// Set only for failed documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl ProcessingOutcome {
    fn success(source_name: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            kind: OutcomeKind::Success,
            message: "Password removed successfully".to_string(),
            failure: None,
        }
    }

    fn skipped(source_name: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            kind: OutcomeKind::Skipped,
            message: "No password provided".to_string(),
            failure: None,
        }
    }

    pub(crate) fn failed(source_name: &str, reason: FailureReason, message: String) -> Self {
        Self {
            source_name: source_name.to_string(),
            kind: OutcomeKind::Failed,
            message,
            failure: Some(reason),
        }
    }
}

/// Progress notification sent after each document.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress<'a> {
    /// Documents finished so far, including this one
    pub completed: usize,
    pub total: usize,
    pub source_name: &'a str,
    pub kind: OutcomeKind,
}

/// What the caller offers for download after a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Download {
    Single(UnlockedFile),
    Archive { name: String, content: Vec<u8> },
}

impl Download {
    pub fn file_name(&self) -> &str {
        match self {
            Download::Single(file) => &file.name,
            Download::Archive { name, .. } => name,
        }
    }

    pub fn content(&self) -> &[u8] {
        match self {
            Download::Single(file) => &file.content,
            Download::Archive { content, .. } => content,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Download::Single(_) => PDF_MIME,
            Download::Archive { .. } => ZIP_MIME,
        }
    }
}

/// Result of a whole batch: one outcome per input plus the unlocked files.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ProcessingOutcome>,
    pub outputs: Vec<UnlockedFile>,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.count(OutcomeKind::Success)
    }

    pub fn failed_count(&self) -> usize {
        self.count(OutcomeKind::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(OutcomeKind::Skipped)
    }

    fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }

    /// `None` without successes, the file itself for exactly one success,
    /// otherwise a ZIP of all outputs.
    pub fn download(&self) -> Result<Option<Download>, UnlockError> {
        match self.outputs.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(Download::Single(single.clone()))),
            many => Ok(Some(Download::Archive {
                name: ARCHIVE_NAME.to_string(),
                content: archive(many)?,
            })),
        }
    }
}

/// `"unlocked_" + stem + ".pdf"` for a source file name.
pub fn output_name(source_name: &str) -> String {
    format!("{}{}.pdf", OUTPUT_PREFIX, file_stem(source_name))
}

/// Strip the last extension of the base name. Leading dots of the base name
/// never start an extension, and directory components are kept.
fn file_stem(name: &str) -> &str {
    let base_start = name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    let base = &name[base_start..];
    let leading_dots = base.len() - base.trim_start_matches('.').len();

    match base[leading_dots..].rfind('.') {
        Some(dot) => &name[..base_start + leading_dots + dot],
        None => name,
    }
}

/// Unlock every document in `documents` with the password assigned to it.
pub fn unlock_batch(documents: &[SourceDocument], passwords: &PasswordMap) -> BatchReport {
    unlock_batch_with_progress(documents, passwords, |_| {})
}

/// Same as [`unlock_batch`], calling `on_progress` after each document.
pub fn unlock_batch_with_progress<F>(
    documents: &[SourceDocument],
    passwords: &PasswordMap,
    mut on_progress: F,
) -> BatchReport
where
    F: FnMut(&BatchProgress<'_>),
{
    let total = documents.len();
    let mut report = BatchReport {
        outcomes: Vec::with_capacity(total),
        outputs: Vec::new(),
    };

    for (i, document) in documents.iter().enumerate() {
        let outcome = match passwords.get(&document.name) {
            None => ProcessingOutcome::skipped(&document.name),
            Some(password) => match decrypt(&document.content, password) {
                Ok(content) => {
                    report.outputs.push(UnlockedFile {
                        name: output_name(&document.name),
                        content,
                    });
                    ProcessingOutcome::success(&document.name)
                }
                Err(err) => {
                    warn!("Failed to unlock {}: {}", document.name, err);
                    ProcessingOutcome::failed(&document.name, err.reason(), err.to_string())
                }
            },
        };

        on_progress(&BatchProgress {
            completed: i + 1,
            total,
            source_name: &document.name,
            kind: outcome.kind,
        });
        report.outcomes.push(outcome);
    }

    info!(
        "Batch complete: {} unlocked, {} failed, {} skipped",
        report.success_count(),
        report.failed_count(),
        report.skipped_count()
    );

    report
}
