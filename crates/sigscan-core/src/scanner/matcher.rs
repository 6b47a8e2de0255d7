//! Streaming content matcher.
//!
//! Content is read in fixed-size chunks. Each chunk is appended to a window
//! that still holds the last `longest signature - 1` bytes of the previous
//! window, so a signature split across two reads is seen whole.
//!
//! A match is only final once the longest signature starting at the same
//! offset would also fit in the window. Otherwise a longer, higher-priority
//! signature may still be completed by the next read, so the match is dropped
//! and found again in the next window, or at end of stream.

use crate::error::{Error, Result, ScanError};
use crate::signature::{Signature, SignatureSet};
use aho_corasick::{AhoCorasick, MatchKind};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::trace;

/// Default read chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Where and which signature matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    /// Index of the signature in its set
    pub index: usize,
    /// Name of the signature
    pub name: String,
    /// Byte offset of the match from the start of the stream
    pub offset: u64,
}

/// Outcome of scanning one regular file
#[derive(Debug)]
pub enum MatchResult {
    /// No signature occurs in the content
    Clean,
    /// A signature was found; scanning stopped there
    Matched(SignatureMatch),
    /// The file could not be scanned
    Error(ScanError),
}

impl MatchResult {
    /// Returns true for [`MatchResult::Clean`]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Returns true for [`MatchResult::Matched`]
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// The match, if any
    pub fn signature_match(&self) -> Option<&SignatureMatch> {
        match self {
            Self::Matched(m) => Some(m),
            _ => None,
        }
    }

    /// The error, if any
    pub fn error(&self) -> Option<&ScanError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Short label for the result kind
    pub fn label(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Matched(_) => "matched",
            Self::Error(_) => "error",
        }
    }
}

/// Finds the first signature occurring anywhere in a byte stream.
///
/// A matcher holds no per-scan state, so one instance can serve any number of
/// files, including concurrently from several threads.
#[derive(Debug, Clone)]
pub struct Matcher {
    signatures: SignatureSet,
    automaton: AhoCorasick,
    chunk_size: usize,
    max_len: usize,
}

impl Matcher {
    /// Creates a matcher with the default chunk size
    pub fn new(signatures: SignatureSet) -> Result<Self> {
        Self::with_chunk_size(signatures, DEFAULT_CHUNK_SIZE)
    }

    /// Creates a matcher reading `chunk_size` bytes at a time.
    ///
    /// Every signature must fit in one chunk.
    pub fn with_chunk_size(signatures: SignatureSet, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidChunkSize(chunk_size));
        }
        if let Some(sig) = signatures.iter().find(|s| s.len() > chunk_size) {
            return Err(Error::signature_too_long(sig.name(), sig.len(), chunk_size));
        }

        // Leftmost-first: earliest offset wins, ties go to definition order.
        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostFirst)
            .build(signatures.iter().map(Signature::as_bytes))?;
        let max_len = signatures.max_len();

        Ok(Self {
            signatures,
            automaton,
            chunk_size,
            max_len,
        })
    }

    /// The signature set this matcher searches for
    pub fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    /// Read chunk size in bytes
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Searches an in-memory buffer
    pub fn find(&self, haystack: &[u8]) -> Option<SignatureMatch> {
        self.automaton.find(haystack).map(|m| {
            let index = m.pattern().as_usize();
            SignatureMatch {
                index,
                name: self
                    .signatures
                    .get(index)
                    .map(|s| s.name().to_owned())
                    .unwrap_or_default(),
                offset: m.start() as u64,
            }
        })
    }

    /// Scans a stream until the first match or the end of input
    pub fn scan<R: Read>(&self, mut reader: R) -> MatchResult {
        let mut chunk = vec![0u8; self.chunk_size];
        let carry_len = self.max_len - 1;
        let mut window: Vec<u8> = Vec::with_capacity(carry_len + self.chunk_size);
        // Stream offset of window[0]
        let mut base: u64 = 0;

        loop {
            let read = match reader.read(&mut chunk) {
                Ok(0) => {
                    return match self.find(&window) {
                        Some(found) => self.matched(found, base),
                        None => MatchResult::Clean,
                    };
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return MatchResult::Error(ScanError::FileRead(e)),
            };
            window.extend_from_slice(&chunk[..read]);

            // Unsettled matches start inside the carried tail and are retried
            if let Some(found) = self.find(&window) {
                if found.offset as usize + self.max_len <= window.len() {
                    return self.matched(found, base);
                }
            }

            let keep = carry_len.min(window.len());
            let consumed = window.len() - keep;
            window.drain(..consumed);
            base += consumed as u64;
        }
    }

    fn matched(&self, mut found: SignatureMatch, base: u64) -> MatchResult {
        found.offset += base;
        trace!("Signature '{}' at offset {}", found.name, found.offset);
        MatchResult::Matched(found)
    }

    /// Opens and scans a file; the handle is closed before returning
    pub fn scan_path(&self, path: impl AsRef<Path>) -> MatchResult {
        match File::open(path.as_ref()) {
            Ok(file) => self.scan(file),
            Err(e) => MatchResult::Error(ScanError::FileOpen(e)),
        }
    }
}
