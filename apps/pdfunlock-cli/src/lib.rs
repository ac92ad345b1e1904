//! pdfunlock command-line driver
//!
//! Reads PDFs from disk, unlocks them with the core batch driver and writes
//! the download (one PDF or `unlocked_pdfs.zip`) into the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use pdfunlock_core::{
    unlock_batch_with_progress, BatchReport, Download, OutcomeKind, PasswordMap, SourceDocument,
};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "pdfunlock")]
#[command(version, about = "Remove passwords from encrypted PDF files")]
pub struct Cli {
    /// PDF files to unlock
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Password used for every file
    #[arg(short, long)]
    pub password: Option<String>,

    /// Password for one file, as NAME=PASSWORD (overrides --password)
    #[arg(long = "password-for", value_name = "NAME=PASSWORD", value_parser = parse_assignment)]
    pub password_for: Vec<(String, String)>,

    /// Directory the unlocked files are written to
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Also write each unlocked PDF when several are archived
    #[arg(long)]
    pub individual: bool,

    /// Print outcomes as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parse a `NAME=PASSWORD` pair. The password may itself contain `=`.
pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, password)) if !name.is_empty() => Ok((name.to_string(), password.to_string())),
        _ => Err(format!("expected NAME=PASSWORD, got '{}'", s)),
    }
}

/// Read every input file; documents are named by their file name.
pub fn load_documents(files: &[PathBuf]) -> Result<Vec<SourceDocument>> {
    files
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("Not a file: {}", path.display()))?;
            let content =
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(SourceDocument::new(name, content))
        })
        .collect()
}

/// `--password` applies to every document; `--password-for` entries override it.
pub fn build_passwords(
    documents: &[SourceDocument],
    shared: Option<&str>,
    overrides: &[(String, String)],
) -> PasswordMap {
    let mut passwords = match shared {
        Some(password) => {
            PasswordMap::same_for_all(documents.iter().map(|d| d.name.as_str()), password)
        }
        None => PasswordMap::new(),
    };
    for (name, password) in overrides {
        passwords.insert(name.as_str(), password.as_str());
    }
    passwords
}

/// Write the batch download into `out_dir`, returning the paths written.
pub fn write_outputs(
    report: &BatchReport,
    out_dir: &Path,
    individual: bool,
) -> Result<Vec<PathBuf>> {
    let Some(download) = report.download()? else {
        return Ok(Vec::new());
    };

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut written = vec![write_file(out_dir, download.file_name(), download.content())?];
    if individual && matches!(download, Download::Archive { .. }) {
        for file in &report.outputs {
            written.push(write_file(out_dir, &file.name, &file.content)?);
        }
    }
    Ok(written)
}

fn write_file(out_dir: &Path, name: &str, content: &[u8]) -> Result<PathBuf> {
    let path = out_dir.join(name);
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(path)
}

/// Result of a CLI run.
#[derive(Debug)]
pub struct RunSummary {
    pub report: BatchReport,
    pub written: Vec<PathBuf>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.report.failed_count() > 0
    }
}

pub fn run(cli: &Cli) -> Result<RunSummary> {
    let documents = load_documents(&cli.files)?;
    let passwords = build_passwords(&documents, cli.password.as_deref(), &cli.password_for);
    if passwords.is_empty() {
        bail!("No passwords given; use --password or --password-for");
    }

    let report = unlock_batch_with_progress(&documents, &passwords, |progress| {
        info!(
            "[{}/{}] {}: {}",
            progress.completed, progress.total, progress.source_name, progress.kind
        );
    });

    let written = write_outputs(&report, &cli.out_dir, cli.individual)?;
    Ok(RunSummary { report, written })
}

/// Human-readable outcome lines plus a summary line.
pub fn render_text(summary: &RunSummary) -> String {
    let mut out = String::new();
    for outcome in &summary.report.outcomes {
        let mark = match outcome.kind {
            OutcomeKind::Success => "ok",
            OutcomeKind::Failed => "FAILED",
            OutcomeKind::Skipped => "skipped",
        };
        out.push_str(&format!(
            "{:<8} {}: {}\n",
            mark, outcome.source_name, outcome.message
        ));
    }
    for path in &summary.written {
        out.push_str(&format!("wrote    {}\n", path.display()));
    }
    out.push_str(&format!(
        "{} unlocked, {} failed, {} skipped\n",
        summary.report.success_count(),
        summary.report.failed_count(),
        summary.report.skipped_count()
    ));
    out
}

pub fn render_json(summary: &RunSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(&summary.report.outcomes)?)
}
