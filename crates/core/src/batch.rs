//! Batch extraction over a directory of RPT files.
//!
//! Completed files are recorded in a journal so an interrupted batch can
//! resume without re-exporting. The journal is only appended after a file
//! finishes; failures are retried on the next run.

use crate::error::{Result, RptError};
use crate::export::{self, Invocation};
use indexmap::IndexSet;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Journal file name inside the output folder.
pub const JOURNAL_NAME: &str = "export_progress.txt";

/// Totals for the end-of-batch report.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn report(&self) {
        println!(
            "Batch complete: {} processed, {} skipped (already completed), {} failed",
            self.processed, self.skipped, self.failed
        );
    }
}

/// Run the single-file pipeline across every `.RPT` in `dir`.
///
/// Returns the summary when at least one file succeeded (or there was
/// nothing to do); otherwise the last failure's error.
pub fn run_batch(dir: &Path, invocation: &Invocation) -> Result<BatchSummary> {
    let files = enumerate_rpt_files(dir)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "no RPT files found");
    }

    let folder = invocation
        .plan
        .output_folder
        .clone()
        .unwrap_or_else(|| dir.join("EXPORT"));
    let journal_path = folder.join(JOURNAL_NAME);
    let mut journal = Journal::load(&journal_path)?;

    let mut summary = BatchSummary::default();
    let mut last_error: Option<RptError> = None;

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if journal.contains(&name) {
            summary.skipped += 1;
            continue;
        }

        match export::export_file(&path, invocation) {
            Ok(file_summary) => {
                file_summary.report();
                journal.record(&name)?;
                summary.processed += 1;
            }
            Err(error) => {
                eprintln!("ERROR: {}: {error}", path.display());
                summary.failed += 1;
                last_error = Some(error);
            }
        }
    }

    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        "batch finished"
    );
    if summary.processed == 0
        && summary.failed > 0
        && let Some(error) = last_error
    {
        return Err(error);
    }
    Ok(summary)
}

/// `*.RPT` entries (case-insensitive), sorted lexicographically.
fn enumerate_rpt_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(RptError::Read)?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(RptError::Read)?;
        let path = entry.path();
        let is_rpt = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("rpt"));
        if path.is_file() && is_rpt {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Append-only record of completed basenames.
struct Journal {
    path: PathBuf,
    done: IndexSet<String>,
}

impl Journal {
    fn load(path: &Path) -> Result<Self> {
        let mut done = IndexSet::new();
        if path.exists() {
            let file = fs::File::open(path).map_err(RptError::Read)?;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(RptError::Read)?;
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    done.insert(trimmed.to_string());
                }
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            done,
        })
    }

    fn contains(&self, name: &str) -> bool {
        self.done.contains(name)
    }

    /// Append one completed file and flush so an interruption after this
    /// point cannot lose the record.
    fn record(&mut self, name: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| RptError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| RptError::Write {
                path: self.path.clone(),
                source,
            })?;
        writeln!(file, "{name}").map_err(|source| RptError::Write {
            path: self.path.clone(),
            source,
        })?;
        file.flush().map_err(|source| RptError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.done.insert(name.to_string());
        Ok(())
    }
}
