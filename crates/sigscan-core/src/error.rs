//! Error types for the sigscan-core library.
//!
//! Two layers of failure exist. [`Error`] covers everything that stops a scan
//! from starting at all: bad signature definitions, an unusable configuration,
//! or a root path that cannot be opened. [`ScanError`] covers failures local to
//! a single entry in the tree; those never abort a scan and are carried inside
//! a [`MatchResult`](crate::MatchResult) instead.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sigscan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error type for sigscan operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A signature set must contain at least one signature
    #[error("signature set is empty")]
    EmptySignatureSet,

    /// A signature has no bytes
    #[error("signature '{name}' is empty")]
    EmptySignature {
        /// Name of the offending signature
        name: String,
    },

    /// A signature does not fit into a single read chunk
    #[error("signature '{name}' is {len} bytes long, exceeding the chunk size of {max} bytes")]
    SignatureTooLong {
        /// Name of the offending signature
        name: String,
        /// Signature length in bytes
        len: usize,
        /// Configured chunk size
        max: usize,
    },

    /// A signature pattern is not valid hexadecimal
    #[error("signature '{name}' has an invalid hex pattern: {source}")]
    InvalidHex {
        /// Name of the offending signature
        name: String,
        /// Underlying decode error
        #[source]
        source: hex::FromHexError,
    },

    /// Failed to read a signature definitions file
    #[error("failed to read signature file '{path}': {source}")]
    SignatureFileRead {
        /// Path to the definitions file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Failed to parse signature definitions
    #[error("failed to parse signature definitions: {0}")]
    SignatureParse(#[from] toml::de::Error),

    /// Chunk size must be non-zero
    #[error("invalid chunk size {0}: must be greater than zero")]
    InvalidChunkSize(usize),

    /// The scan root could not be opened
    #[error("failed to open scan root '{path}': {source}")]
    RootOpen {
        /// The root path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Failed to build the multi-pattern automaton
    #[error("failed to build signature matcher: {0}")]
    MatcherBuild(#[from] aho_corasick::BuildError),

    /// Failed to build the worker pool
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Creates a new empty signature error
    pub fn empty_signature(name: impl Into<String>) -> Self {
        Self::EmptySignature { name: name.into() }
    }

    /// Creates a new signature length error
    pub fn signature_too_long(name: impl Into<String>, len: usize, max: usize) -> Self {
        Self::SignatureTooLong {
            name: name.into(),
            len,
            max,
        }
    }

    /// Creates a new hex decode error
    pub fn invalid_hex(name: impl Into<String>, source: hex::FromHexError) -> Self {
        Self::InvalidHex {
            name: name.into(),
            source,
        }
    }

    /// Creates a new signature file read error
    pub fn signature_file_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::SignatureFileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new root open error
    pub fn root_open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::RootOpen {
            path: path.into(),
            source,
        }
    }
}

/// Classification of a per-entry failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanErrorKind {
    /// A directory below the root could not be listed
    DirectoryOpenFailure,
    /// A regular file could not be opened
    FileOpenFailure,
    /// Reading an opened file failed
    FileReadFailure,
    /// The entry's path exceeds the configured maximum length
    PathTooLong,
}

impl ScanErrorKind {
    /// Short machine-friendly label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectoryOpenFailure => "directory-open-failure",
            Self::FileOpenFailure => "file-open-failure",
            Self::FileReadFailure => "file-read-failure",
            Self::PathTooLong => "path-too-long",
        }
    }
}

impl fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure local to one entry of the scanned tree.
///
/// These are reported and then traversal moves on.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Failed to list a directory
    #[error("failed to open directory: {0}")]
    DirectoryOpen(#[source] io::Error),

    /// Failed to open a file
    #[error("failed to open file: {0}")]
    FileOpen(#[source] io::Error),

    /// Failed while reading file content
    #[error("failed to read file: {0}")]
    FileRead(#[source] io::Error),

    /// Path length policy violated
    #[error("path is {len} bytes long, exceeding the maximum of {max} bytes")]
    PathTooLong {
        /// Length of the rejected path in bytes
        len: usize,
        /// Configured maximum
        max: usize,
    },
}

impl ScanError {
    /// Returns the classification of this error
    pub fn kind(&self) -> ScanErrorKind {
        match self {
            Self::DirectoryOpen(_) => ScanErrorKind::DirectoryOpenFailure,
            Self::FileOpen(_) => ScanErrorKind::FileOpenFailure,
            Self::FileRead(_) => ScanErrorKind::FileReadFailure,
            Self::PathTooLong { .. } => ScanErrorKind::PathTooLong,
        }
    }

    /// Returns the underlying I/O error, if any
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::DirectoryOpen(e) | Self::FileOpen(e) | Self::FileRead(e) => Some(e),
            Self::PathTooLong { .. } => None,
        }
    }
}
