//! # sigscan-core
//!
//! A library for scanning directory trees for files that carry known byte
//! signatures, such as executable and archive magic headers.
//!
//! This crate provides the core functionality for:
//! - Building an immutable set of byte signatures, built in or loaded from TOML
//! - Streaming file content through a matcher that finds a signature at any
//!   offset, including across read-buffer boundaries
//! - Walking a directory tree without following symlinks, under a maximum
//!   path length, while isolating per-entry failures
//!
//! ## Architecture
//!
//! - [`signature`]: Signatures and signature sets
//! - [`scanner`]: Content matcher and scan engine
//! - [`walker`]: Directory traversal
//! - [`report`]: Reporter trait and scan summary
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use sigscan_core::{MatchResult, Scanner, SignatureSet};
//!
//! let scanner = Scanner::new(SignatureSet::builtin())?;
//! for (path, result) in scanner.walk("/srv/uploads")? {
//!     if let MatchResult::Matched(m) = result {
//!         println!("{}: {}", path.display(), m.name);
//!     }
//! }
//! # Ok::<(), sigscan_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod error;
pub mod report;
pub mod scanner;
pub mod signature;
pub mod walker;

// Re-export primary types for convenience
pub use error::{Error, Result, ScanError, ScanErrorKind};
pub use report::{Collector, Reporter, ScanSummary};
pub use scanner::{
    MatchResult, Matcher, ScannerConfig, Scanner, SignatureMatch, Walk, DEFAULT_CHUNK_SIZE,
};
pub use signature::{Signature, SignatureSet};
pub use walker::{
    EntryError, Entries, ScanTarget, TargetKind, Walker, WalkerConfig, DEFAULT_MAX_PATH_LEN,
};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
