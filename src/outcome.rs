//! Value types produced by a run
//!
//! Results flow upward: a document yields a [`FileTestResult`], a directory
//! yields a [`DirectoryReport`] whose aggregate is returned to its parent,
//! and the whole traversal is described by a [`RunOutcome`].

use crate::counts::Counts;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::Duration;

/// Result of running a single test document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTestResult {
    /// Path of the document relative to the source directory
    pub relative_path: PathBuf,
    /// Contents of the first `<title>` element, empty if there is none
    pub title: String,
    pub counts: Counts,
    pub elapsed: Duration,
    /// Rendered document relative to the output directory.
    /// `None` when nothing could be written.
    pub output_relative_path: Option<PathBuf>,
    /// Why the document could not be run, if it could not
    pub error: Option<String>,
}

impl FileTestResult {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything a single directory contributed to the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryReport {
    /// Directory path as found during traversal
    pub path: PathBuf,
    /// Results for matching documents, in name order
    pub file_results: Vec<FileTestResult>,
    /// Aggregate of each immediate subdirectory, in name order
    pub subdirectory_totals: Vec<(String, Counts)>,
    /// Everything below this directory, files and subdirectories
    pub aggregate: Counts,
}

impl DirectoryReport {
    /// Tally of the documents directly in this directory
    pub fn file_total(&self) -> Counts {
        self.file_results.iter().map(|r| r.counts).sum()
    }

    /// Whether the aggregate equals the merge of files and subdirectories
    pub fn is_consistent(&self) -> bool {
        let subdirectories: Counts = self.subdirectory_totals.iter().map(|(_, c)| *c).sum();
        self.aggregate == self.file_total() + subdirectories
    }
}

/// Run-level figures shown in the final summary table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub start_time: DateTime<Local>,
    pub elapsed: Duration,
    pub files_processed: usize,
    pub directories_processed: usize,
    pub grand_total: Counts,
}

impl RunSummary {
    /// A summary for a run starting now; figures are filled in when it ends
    pub fn begin() -> Self {
        Self {
            start_time: Local::now(),
            elapsed: Duration::ZERO,
            files_processed: 0,
            directories_processed: 0,
            grand_total: Counts::ZERO,
        }
    }

    /// Fill in the figures from the finished traversal
    pub fn finalize(
        &mut self,
        directories: &[DirectoryReport],
        grand_total: Counts,
        elapsed: Duration,
    ) {
        self.files_processed = directories.iter().map(|d| d.file_results.len()).sum();
        self.directories_processed = directories.len();
        self.grand_total = grand_total;
        self.elapsed = elapsed;
    }
}

/// Everything a completed run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    /// Every directory visited, in traversal (pre-)order
    pub directories: Vec<DirectoryReport>,
    /// Location of the written summary report
    pub summary_path: PathBuf,
}

impl RunOutcome {
    pub fn counts(&self) -> Counts {
        self.summary.grand_total
    }

    /// Message for a failed run, or `None` if the run counts as successful
    pub fn failure_message(&self, ignore_failures: bool) -> Option<String> {
        if ignore_failures || !self.counts().has_failures() {
            return None;
        }
        Some(format!("fit tests failed: {}", self.counts()))
    }

    /// Documents that could not be executed at all
    pub fn failed_files(&self) -> impl Iterator<Item = &FileTestResult> {
        self.directories
            .iter()
            .flat_map(|d| d.file_results.iter())
            .filter(|r| r.is_failed())
    }
}
