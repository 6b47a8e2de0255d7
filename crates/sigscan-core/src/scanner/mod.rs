//! Scan engine: ties the [`Walker`] to the [`Matcher`].
//!
//! ## Flow
//!
//! 1. The walker enumerates the tree from the root, depth-first
//! 2. Every regular file is opened and streamed through the matcher
//! 3. Each result, failure and skip is handed to a [`Reporter`]
//!
//! With more than one job configured, traversal stays on a single thread and
//! file scans are dispatched to a fixed-size worker pool. Workers share only
//! the immutable matcher. Results are still delivered to the reporter on the
//! calling thread.
//!
//! ```no_run
//! use sigscan_core::{Collector, Scanner, SignatureSet};
//!
//! let scanner = Scanner::new(SignatureSet::builtin())?;
//! let mut collector = Collector::new();
//! let summary = scanner.scan_tree(".", &mut collector)?;
//! println!("{} matched", summary.matched);
//! # Ok::<(), sigscan_core::Error>(())
//! ```

mod matcher;

use crate::error::Result;
use crate::report::{Reporter, ScanSummary};
use crate::signature::SignatureSet;
use crate::walker::{Entries, ScanTarget, TargetKind, Walker, WalkerConfig, DEFAULT_MAX_PATH_LEN};
use crossbeam_channel as channel;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

pub use matcher::{MatchResult, Matcher, SignatureMatch, DEFAULT_CHUNK_SIZE};

/// Capacity of the worker → reporter channel
const RESULT_QUEUE_DEPTH: usize = 256;

/// Configuration for the scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Bytes read per chunk; must be at least the longest signature
    pub chunk_size: usize,
    /// Longest path, in bytes, that is opened or descended into
    pub max_path_len: usize,
    /// Visit directory entries sorted by file name
    pub sorted: bool,
    /// Number of scanning threads (1 = scan on the calling thread)
    pub jobs: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_path_len: DEFAULT_MAX_PATH_LEN,
            sorted: false,
            jobs: 1,
        }
    }
}

impl ScannerConfig {
    /// Creates a new scanner config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the read chunk size
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the maximum path length
    pub fn max_path_len(mut self, max: usize) -> Self {
        self.max_path_len = max;
        self
    }

    /// Enables or disables sorted traversal
    pub fn sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    /// Sets the number of scanning threads; zero is treated as one
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }
}

/// Scans directory trees for signatures
#[derive(Debug, Clone)]
pub struct Scanner {
    matcher: Arc<Matcher>,
    walker: Walker,
    jobs: usize,
}

/// One unit of output from the traversal side
enum Event {
    Result(PathBuf, MatchResult),
    Skipped(ScanTarget),
}

impl Scanner {
    /// Creates a scanner with default configuration
    pub fn new(signatures: SignatureSet) -> Result<Self> {
        Self::with_config(signatures, ScannerConfig::default())
    }

    /// Creates a scanner with custom configuration
    pub fn with_config(signatures: SignatureSet, config: ScannerConfig) -> Result<Self> {
        let matcher = Matcher::with_chunk_size(signatures, config.chunk_size)?;
        let walker = Walker::with_config(
            WalkerConfig::new()
                .max_path_len(config.max_path_len)
                .sorted(config.sorted),
        );
        Ok(Self {
            matcher: Arc::new(matcher),
            walker,
            jobs: config.jobs.max(1),
        })
    }

    /// The content matcher
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Lazily scans the tree at `root`, one `(path, result)` pair per regular
    /// file or failed entry. Runs on the calling thread.
    pub fn walk(&self, root: impl AsRef<Path>) -> Result<Walk<'_>> {
        Ok(Walk {
            entries: self.walker.entries(root)?,
            matcher: &self.matcher,
        })
    }

    /// Scans the tree at `root`, reporting every event to `reporter`.
    ///
    /// Fails only if the root cannot be opened.
    pub fn scan_tree(
        &self,
        root: impl AsRef<Path>,
        reporter: &mut dyn Reporter,
    ) -> Result<ScanSummary> {
        let root = root.as_ref();
        let entries = self.walker.entries(root)?;

        debug!("Starting scan of {} with {} job(s)", root.display(), self.jobs);

        let summary = if self.jobs > 1 {
            self.scan_pooled(entries, reporter)?
        } else {
            self.scan_inline(entries, reporter)
        };

        debug!(
            "Scan complete: {} scanned, {} matched, {} errors, {} skipped",
            summary.files_scanned, summary.matched, summary.errors, summary.skipped
        );
        Ok(summary)
    }

    fn scan_inline(&self, entries: Entries, reporter: &mut dyn Reporter) -> ScanSummary {
        let mut summary = ScanSummary::default();
        for item in entries {
            let event = match item {
                Ok(target) => match target.kind {
                    TargetKind::File => {
                        let result = self.matcher.scan_path(&target.path);
                        Event::Result(target.path, result)
                    }
                    TargetKind::Directory => continue,
                    TargetKind::Other => Event::Skipped(target),
                },
                Err(failure) => Event::Result(failure.path, MatchResult::Error(failure.error)),
            };
            deliver(event, &mut summary, reporter);
        }
        summary
    }

    fn scan_pooled(&self, entries: Entries, reporter: &mut dyn Reporter) -> Result<ScanSummary> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("sigscan-worker-{}", i))
            .build()?;
        let (tx, rx) = channel::bounded::<Event>(RESULT_QUEUE_DEPTH);
        let mut summary = ScanSummary::default();

        std::thread::scope(|scope| {
            let pool = &pool;
            let matcher = Arc::clone(&self.matcher);

            // Traversal thread; the channel closes once it and every job are done
            scope.spawn(move || {
                for item in entries {
                    match item {
                        Ok(target) => match target.kind {
                            TargetKind::File => {
                                let tx = tx.clone();
                                let matcher = Arc::clone(&matcher);
                                pool.spawn(move || {
                                    let result = matcher.scan_path(&target.path);
                                    let _ = tx.send(Event::Result(target.path, result));
                                });
                            }
                            TargetKind::Directory => {}
                            TargetKind::Other => {
                                let _ = tx.send(Event::Skipped(target));
                            }
                        },
                        Err(failure) => {
                            let _ = tx.send(Event::Result(
                                failure.path,
                                MatchResult::Error(failure.error),
                            ));
                        }
                    }
                }
            });

            for event in rx {
                deliver(event, &mut summary, reporter);
            }
        });

        Ok(summary)
    }
}

fn deliver(event: Event, summary: &mut ScanSummary, reporter: &mut dyn Reporter) {
    match event {
        Event::Result(path, result) => {
            match &result {
                MatchResult::Matched(m) => {
                    debug!("{}: matched '{}' at offset {}", path.display(), m.name, m.offset)
                }
                MatchResult::Error(e) => debug!("{}: {}", path.display(), e),
                MatchResult::Clean => trace!("{}: clean", path.display()),
            }
            summary.record(&result);
            reporter.on_result(&path, &result);
        }
        Event::Skipped(target) => {
            trace!("Skipping non-regular entry {}", target.path.display());
            summary.skipped += 1;
            reporter.on_skipped(&target);
        }
    }
}

/// Lazy `(path, result)` sequence, see [`Scanner::walk`]
#[derive(Debug)]
pub struct Walk<'a> {
    entries: Entries,
    matcher: &'a Matcher,
}

impl Iterator for Walk<'_> {
    type Item = (PathBuf, MatchResult);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.entries.next()? {
                Ok(ScanTarget {
                    path,
                    kind: TargetKind::File,
                }) => {
                    let result = self.matcher.scan_path(&path);
                    return Some((path, result));
                }
                Ok(_) => continue,
                Err(failure) => {
                    return Some((failure.path, MatchResult::Error(failure.error)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ScanErrorKind};
    use crate::report::Collector;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const MZ: &[u8] = &[0x4D, 0x5A, 0x90, 0x00];
    const ELF: &[u8] = &[0x7F, 0x45, 0x4C, 0x46];
    const ZIP: &[u8] = &[0x50, 0x4B, 0x03, 0x04];

    fn write(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// A tree with 3 matching and 3 clean files across nested directories
    fn sample_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("setup.exe"), &[MZ, &[0xFF; 64][..]].concat());
        write(&root.join("notes.txt"), b"nothing to see here");
        write(&root.join("bin/tool"), &[&[0u8; 2000][..], ELF].concat());
        write(&root.join("bin/empty"), b"");
        write(&root.join("deep/er/still/archive"), &[&b"junk"[..], ZIP].concat());
        write(&root.join("deep/er/zeros"), &[0u8; 4]);
        temp
    }

    /// Sorted `(file name, label)` pairs
    fn labels(results: &[(PathBuf, MatchResult)]) -> Vec<(String, &'static str)> {
        let mut out: Vec<(String, &'static str)> = results
            .iter()
            .map(|(p, r)| (p.file_name().unwrap().to_string_lossy().into_owned(), r.label()))
            .collect();
        out.sort();
        out
    }

    fn expected_labels() -> Vec<(String, &'static str)> {
        let mut out: Vec<(String, &'static str)> = vec![
            ("archive".into(), "matched"),
            ("empty".into(), "clean"),
            ("notes.txt".into(), "clean"),
            ("setup.exe".into(), "matched"),
            ("tool".into(), "matched"),
            ("zeros".into(), "clean"),
        ];
        out.sort();
        out
    }

    #[test]
    fn test_scanner_config_builder() {
        let config = ScannerConfig::new()
            .chunk_size(64)
            .max_path_len(512)
            .sorted(true)
            .jobs(0);

        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.max_path_len, 512);
        assert!(config.sorted);
        assert_eq!(config.jobs, 1);
    }

    #[test]
    fn test_scan_tree_classifies_every_file() {
        let tree = sample_tree();
        let scanner = Scanner::new(SignatureSet::builtin()).unwrap();
        let mut collector = Collector::new();

        let summary = scanner.scan_tree(tree.path(), &mut collector).unwrap();

        assert_eq!(labels(&collector.results), expected_labels());
        assert_eq!(summary.files_scanned, 6);
        assert_eq!(summary.matched, 3);
        assert_eq!(summary.clean, 3);
        assert_eq!(summary.errors, 0);
    }

    #[test]
    fn test_walk_matches_scan_tree() {
        let tree = sample_tree();
        let scanner = Scanner::new(SignatureSet::builtin()).unwrap();

        let results: Vec<(PathBuf, MatchResult)> = scanner.walk(tree.path()).unwrap().collect();
        assert_eq!(labels(&results), expected_labels());

        let tool = results
            .iter()
            .find(|(p, _)| p.ends_with("bin/tool"))
            .and_then(|(_, r)| r.signature_match())
            .unwrap();
        assert_eq!(tool.name, "elf");
        assert_eq!(tool.offset, 2000);
    }

    #[test]
    fn test_pooled_scan_matches_inline_scan() {
        let tree = sample_tree();
        for i in 0..40 {
            write(&tree.path().join(format!("bulk/{}.bin", i)), &[i as u8; 100]);
        }

        let inline = Scanner::new(SignatureSet::builtin()).unwrap();
        let pooled =
            Scanner::with_config(SignatureSet::builtin(), ScannerConfig::new().jobs(4)).unwrap();

        let mut a = Collector::new();
        let mut b = Collector::new();
        let summary_a = inline.scan_tree(tree.path(), &mut a).unwrap();
        let summary_b = pooled.scan_tree(tree.path(), &mut b).unwrap();

        assert_eq!(summary_a, summary_b);
        assert_eq!(summary_b.files_scanned, 46);
        assert_eq!(labels(&a.results), labels(&b.results));
    }

    #[test]
    fn test_missing_root_fails_scan() {
        let temp = TempDir::new().unwrap();
        let scanner = Scanner::new(SignatureSet::builtin()).unwrap();
        let err = scanner
            .scan_tree(temp.path().join("missing"), &mut Collector::new())
            .unwrap_err();
        assert!(matches!(err, Error::RootOpen { .. }));
        assert!(scanner.walk(temp.path().join("missing")).is_err());
    }

    #[test]
    fn test_path_too_long_is_reported_and_siblings_scanned() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("ok"), MZ);
        write(&root.join("this-name-is-far-too-long-for-the-limit"), MZ);

        let config = ScannerConfig::new().max_path_len(root.join("ok").as_os_str().len() + 4);
        let scanner = Scanner::with_config(SignatureSet::builtin(), config).unwrap();
        let mut collector = Collector::new();
        let summary = scanner.scan_tree(root, &mut collector).unwrap();

        assert_eq!(summary.matched, 1);
        assert_eq!(summary.errors, 1);
        let failed: Vec<ScanErrorKind> = collector
            .results
            .iter()
            .filter_map(|(_, r)| r.error().map(|e| e.kind()))
            .collect();
        assert_eq!(failed, vec![ScanErrorKind::PathTooLong]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_isolated() {
        use std::os::unix::fs::PermissionsExt;

        let tree = sample_tree();
        let locked = tree.path().join("bin/locked.exe");
        write(&locked, MZ);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users bypass permission bits
        if fs::File::open(&locked).is_ok() {
            return;
        }

        let scanner = Scanner::new(SignatureSet::builtin()).unwrap();
        let mut collector = Collector::new();
        let summary = scanner.scan_tree(tree.path(), &mut collector).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        let (errors, scanned): (Vec<_>, Vec<_>) = collector
            .results
            .into_iter()
            .partition(|(_, r)| r.error().is_some());

        assert_eq!(labels(&scanned), expected_labels());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, locked);
        assert_eq!(
            errors[0].1.error().map(|e| e.kind()),
            Some(ScanErrorKind::FileOpenFailure)
        );
        assert_eq!(summary.errors, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_is_skipped() {
        use std::os::unix::fs::symlink;

        let tree = sample_tree();
        symlink(tree.path(), tree.path().join("deep/er/back-to-root")).unwrap();

        let scanner = Scanner::new(SignatureSet::builtin()).unwrap();
        let mut collector = Collector::new();
        let summary = scanner.scan_tree(tree.path(), &mut collector).unwrap();

        assert_eq!(labels(&collector.results), expected_labels());
        assert_eq!(summary.skipped, 1);
        assert_eq!(
            collector.skipped[0].path,
            tree.path().join("deep/er/back-to-root")
        );
        assert_eq!(collector.skipped[0].kind, TargetKind::Other);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let tree = sample_tree();
        let scanner = Scanner::new(SignatureSet::builtin()).unwrap();

        let first: Vec<_> = scanner.walk(tree.path()).unwrap().collect();
        let second: Vec<_> = scanner.walk(tree.path()).unwrap().collect();
        assert_eq!(labels(&first), labels(&second));
    }
}
