//! Reporting seam between the scan engine and its presentation.
//!
//! The engine never prints. Every per-file result and every skipped entry is
//! handed to a [`Reporter`], which decides how to render it.

use crate::error::ScanError;
use crate::scanner::MatchResult;
use crate::walker::ScanTarget;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// Receives scan events as they are produced.
///
/// Events arrive on the thread that called
/// [`Scanner::scan_tree`](crate::Scanner::scan_tree), in no guaranteed order
/// across files.
pub trait Reporter {
    /// Called exactly once per regular file, and once per failed entry
    fn on_result(&mut self, path: &Path, result: &MatchResult);

    /// Called for entries that are neither files nor directories
    fn on_skipped(&mut self, target: &ScanTarget) {
        let _ = target;
    }
}

/// Counters for a finished scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Files whose content was fully examined or matched
    pub files_scanned: usize,
    /// Files that matched a signature
    pub matched: usize,
    /// Files with no signature
    pub clean: usize,
    /// Entries that failed (open, read, listing or path length)
    pub errors: usize,
    /// Entries skipped as neither file nor directory
    pub skipped: usize,
}

impl ScanSummary {
    /// Accounts for one result
    pub fn record(&mut self, result: &MatchResult) {
        match result {
            MatchResult::Clean => {
                self.files_scanned += 1;
                self.clean += 1;
            }
            MatchResult::Matched(_) => {
                self.files_scanned += 1;
                self.matched += 1;
            }
            MatchResult::Error(_) => self.errors += 1,
        }
    }

    /// Returns true if any file matched
    pub fn has_matches(&self) -> bool {
        self.matched > 0
    }
}

/// Reporter that keeps every event in memory
#[derive(Debug, Default)]
pub struct Collector {
    /// Results in arrival order
    pub results: Vec<(PathBuf, MatchResult)>,
    /// Skipped entries in arrival order
    pub skipped: Vec<ScanTarget>,
}

impl Collector {
    /// Creates an empty collector
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reporter for Collector {
    fn on_result(&mut self, path: &Path, result: &MatchResult) {
        let owned = match result {
            MatchResult::Clean => MatchResult::Clean,
            MatchResult::Matched(m) => MatchResult::Matched(m.clone()),
            MatchResult::Error(e) => MatchResult::Error(clone_error(e)),
        };
        self.results.push((path.to_path_buf(), owned));
    }

    fn on_skipped(&mut self, target: &ScanTarget) {
        self.skipped.push(target.clone());
    }
}

fn clone_error(error: &ScanError) -> ScanError {
    let copy = |e: &io::Error| io::Error::new(e.kind(), e.to_string());
    match error {
        ScanError::DirectoryOpen(e) => ScanError::DirectoryOpen(copy(e)),
        ScanError::FileOpen(e) => ScanError::FileOpen(copy(e)),
        ScanError::FileRead(e) => ScanError::FileRead(copy(e)),
        ScanError::PathTooLong { len, max } => ScanError::PathTooLong {
            len: *len,
            max: *max,
        },
    }
}
