//! ZIP packaging of unlocked documents
//!
//! Everything happens in memory. Entries get a fixed timestamp so the same
//! input always yields the same archive bytes.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::batch::UnlockedFile;
use crate::error::UnlockError;

/// File name offered for multi-document downloads.
pub const ARCHIVE_NAME: &str = "unlocked_pdfs.zip";

/// Pack `items` into a Deflate-compressed ZIP, one entry per item in input
/// order. When two items share a name the later one wins and takes the
/// position of its last occurrence.
pub fn archive(items: &[UnlockedFile]) -> Result<Vec<u8>, UnlockError> {
    if items.is_empty() {
        return Err(UnlockError::Archive("no files to archive".into()));
    }

    let last_index: HashMap<&str, usize> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.name.as_str(), i))
        .collect();

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (i, item) in items.iter().enumerate() {
        if last_index.get(item.name.as_str()) != Some(&i) {
            tracing::debug!("Replacing earlier archive entry {}", item.name);
            continue;
        }
        zip.start_file(item.name.as_str(), options)?;
        zip.write_all(&item.content)
            .map_err(|e| UnlockError::Archive(format!("Failed to write {}: {}", item.name, e)))?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// Read every entry of an archive back, in member order.
pub fn extract(archive: &[u8]) -> Result<Vec<UnlockedFile>, UnlockError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;

    let mut files = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        // The declared size comes from the archive; let the buffer grow
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| UnlockError::Archive(format!("Failed to read {}: {}", entry.name(), e)))?;
        files.push(UnlockedFile {
            name: entry.name().to_string(),
            content,
        });
    }

    Ok(files)
}
