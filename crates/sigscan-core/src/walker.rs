//! Directory traversal.
//!
//! [`Walker::entries`] turns a root path into a lazy stream of classified
//! [`ScanTarget`]s and per-entry failures. The traversal is depth-first over an
//! explicit stack of open directories (provided by `walkdir`), never follows
//! symbolic links, and applies a maximum path length to every entry it yields.

use crate::error::{Error, Result, ScanError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Default maximum path length in bytes (Linux `PATH_MAX`)
pub const DEFAULT_MAX_PATH_LEN: usize = 4096;

/// Classification of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Regular file: content is scanned
    File,
    /// Directory: descended into
    Directory,
    /// Symlink, device, socket or fifo: skipped
    Other,
}

/// A classified path found during traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    /// Path of the entry, rooted at the walk root
    pub path: PathBuf,
    /// What kind of entry this is
    pub kind: TargetKind,
}

/// A traversal failure tied to a specific path
#[derive(Debug)]
pub struct EntryError {
    /// Path of the entry that failed
    pub path: PathBuf,
    /// What went wrong
    pub error: ScanError,
}

/// Traversal policy
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Longest path, in bytes, that is opened or descended into
    pub max_path_len: usize,
    /// Visit directory entries sorted by file name
    pub sorted: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_path_len: DEFAULT_MAX_PATH_LEN,
            sorted: false,
        }
    }
}

impl WalkerConfig {
    /// Creates a walker config with default values
    pub fn new() -> Self {
        Self::default()
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
}

/// Enumerates a directory tree
#[derive(Debug, Clone, Default)]
pub struct Walker {
    config: WalkerConfig,
}

impl Walker {
    /// Creates a walker with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a walker with custom configuration
    pub fn with_config(config: WalkerConfig) -> Self {
        Self { config }
    }

    /// The traversal policy in use
    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Starts a traversal at `root`.
    ///
    /// Fails only if the root itself cannot be opened; everything below it is
    /// reported through the returned iterator.
    pub fn entries(&self, root: impl AsRef<Path>) -> Result<Entries> {
        let root = root.as_ref();
        let metadata = fs::metadata(root).map_err(|e| Error::root_open(root, e))?;
        if metadata.is_dir() {
            fs::read_dir(root).map_err(|e| Error::root_open(root, e))?;
        }

        debug!("Walking {}", root.display());

        let mut walk = WalkDir::new(root).follow_links(false);
        if self.config.sorted {
            walk = walk.sort_by_file_name();
        }

        Ok(Entries {
            inner: walk.into_iter(),
            max_path_len: self.config.max_path_len,
            opened: None,
        })
    }
}

/// Lazy traversal of one tree, see [`Walker::entries`]
pub struct Entries {
    inner: walkdir::IntoIter,
    max_path_len: usize,
    // Directory yielded by the previous call; walkdir lists it next
    opened: Option<PathBuf>,
}

impl std::fmt::Debug for Entries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entries")
            .field("max_path_len", &self.max_path_len)
            .finish_non_exhaustive()
    }
}

impl Iterator for Entries {
    type Item = std::result::Result<ScanTarget, EntryError>;

    fn next(&mut self) -> Option<Self::Item> {
        let opened = self.opened.take();
        match self.inner.next()? {
            Ok(entry) => {
                let file_type = entry.file_type();
                let len = entry.path().as_os_str().len();
                if len > self.max_path_len {
                    if file_type.is_dir() {
                        self.inner.skip_current_dir();
                    }
                    trace!("Path too long ({} bytes): {}", len, entry.path().display());
                    return Some(Err(EntryError {
                        path: entry.into_path(),
                        error: ScanError::PathTooLong {
                            len,
                            max: self.max_path_len,
                        },
                    }));
                }

                let kind = if file_type.is_file() {
                    TargetKind::File
                } else if file_type.is_dir() {
                    TargetKind::Directory
                } else {
                    TargetKind::Other
                };
                let path = entry.into_path();
                if kind == TargetKind::Directory {
                    self.opened = Some(path.clone());
                }
                Some(Ok(ScanTarget { path, kind }))
            }
            Err(err) => {
                // Links are never followed, so there is no loop variant here
                let path = err.path().map(Path::to_path_buf);
                let message = err.to_string();
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message));
                Some(Err(classify_failure(path, source, opened.as_deref())))
            }
        }
    }
}

/// Maps a walkdir failure onto the per-entry taxonomy.
///
/// A failure on the directory yielded just before is a listing failure. A
/// failure on any other path is a stat of a single entry, e.g. one that
/// vanished after being listed. A failure without a path happened mid-listing.
fn classify_failure(
    path: Option<PathBuf>,
    source: io::Error,
    opened: Option<&Path>,
) -> EntryError {
    match path {
        Some(path) if opened == Some(path.as_path()) => EntryError {
            path,
            error: ScanError::DirectoryOpen(source),
        },
        Some(path) => EntryError {
            path,
            error: ScanError::FileOpen(source),
        },
        None => EntryError {
            path: opened.map(Path::to_path_buf).unwrap_or_default(),
            error: ScanError::DirectoryOpen(source),
        },
    }
}
