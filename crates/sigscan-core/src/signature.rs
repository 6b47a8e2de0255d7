//! Byte signatures and the immutable set they are scanned from.
//!
//! A [`SignatureSet`] is built once, before any scanning starts, either from
//! the built-in magic headers or from a TOML definitions file:
//!
//! ```toml
//! [[signature]]
//! name = "pe-mz"
//! hex = "4D 5A 90 00"
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A named, non-empty byte pattern
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    name: String,
    bytes: Box<[u8]>,
}

impl Signature {
    /// Creates a signature, rejecting empty patterns
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let name = name.into();
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::empty_signature(name));
        }
        Ok(Self {
            name,
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Creates a signature from a hex string such as `"4D 5A 90 00"`.
    ///
    /// Whitespace is ignored and both cases are accepted.
    pub fn from_hex(name: impl Into<String>, pattern: &str) -> Result<Self> {
        let name = name.into();
        let compact: String = pattern.chars().filter(|c| !c.is_whitespace()).collect();
        match hex::decode(&compact) {
            Ok(bytes) => Self::new(name, bytes),
            Err(e) => Err(Error::invalid_hex(name, e)),
        }
    }

    /// Display name of the signature
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw pattern bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Pattern length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("name", &self.name)
            .field("bytes", &hex::encode_upper(&self.bytes))
            .finish()
    }
}

/// Ordered, non-empty, immutable collection of signatures.
///
/// Cloning is cheap: the members are shared.
#[derive(Debug, Clone)]
pub struct SignatureSet {
    signatures: Arc<[Signature]>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    #[serde(default, rename = "signature")]
    signatures: Vec<Definition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Definition {
    name: String,
    hex: String,
}

impl SignatureSet {
    /// Creates a set from already validated signatures
    pub fn new(signatures: Vec<Signature>) -> Result<Self> {
        if signatures.is_empty() {
            return Err(Error::EmptySignatureSet);
        }
        Ok(Self {
            signatures: signatures.into(),
        })
    }

    /// The built-in magic headers: Windows PE, ELF and ZIP
    pub fn builtin() -> Self {
        let signatures: Vec<Signature> = vec![
            Signature {
                name: "pe-mz".into(),
                bytes: Box::new([0x4D, 0x5A, 0x90, 0x00]),
            },
            Signature {
                name: "elf".into(),
                bytes: Box::new([0x7F, 0x45, 0x4C, 0x46]),
            },
            Signature {
                name: "zip".into(),
                bytes: Box::new([0x50, 0x4B, 0x03, 0x04]),
            },
        ];
        Self {
            signatures: signatures.into(),
        }
    }

    /// Parses TOML signature definitions
    pub fn from_toml(source: &str) -> Result<Self> {
        let file: DefinitionFile = toml::from_str(source)?;
        let signatures = file
            .signatures
            .into_iter()
            .map(|def| Signature::from_hex(def.name, &def.hex))
            .collect::<Result<Vec<_>>>()?;
        Self::new(signatures)
    }

    /// Loads TOML signature definitions from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source =
            std::fs::read_to_string(path).map_err(|e| Error::signature_file_read(path, e))?;
        let set = Self::from_toml(&source)?;
        debug!("Loaded {} signatures from {}", set.len(), path.display());
        Ok(set)
    }

    /// Number of signatures in the set
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Always false: construction rejects empty sets
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Signature at `index`, in definition order
    pub fn get(&self, index: usize) -> Option<&Signature> {
        self.signatures.get(index)
    }

    /// Iterates the signatures in definition order
    pub fn iter(&self) -> std::slice::Iter<'_, Signature> {
        self.signatures.iter()
    }

    /// Length of the longest signature
    pub fn max_len(&self) -> usize {
        self.signatures.iter().map(Signature::len).max().unwrap_or(0)
    }
}

impl<'a> IntoIterator for &'a SignatureSet {
    type Item = &'a Signature;
    type IntoIter = std::slice::Iter<'a, Signature>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
