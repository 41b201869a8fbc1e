// src/hash.rs

//! SHA-256 digests for source integrity and staged tree comparison
//!
//! Recipes record the SHA-256 of their source archive as 64 hex characters,
//! optionally prefixed with `sha256:`. [`Sha256Digest`] is the validated form
//! of that field; the helpers below compute digests of bytes, readers and files
//! without loading whole archives into memory.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Length of a SHA-256 digest rendered as hex
pub const SHA256_HEX_LEN: usize = 64;

/// Buffer size for streaming hashes (64 KB)
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Digest parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// Prefix names an algorithm other than sha256
    UnsupportedAlgorithm(String),
    /// Digest string has wrong length
    InvalidLength { expected: usize, got: usize },
    /// Digest string contains non-hex characters
    InvalidHex(String),
}

impl fmt::Display for DigestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedAlgorithm(name) => {
                write!(f, "unsupported digest algorithm: {} (only sha256 is accepted)", name)
            }
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid digest length: expected {} hex characters, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in digest: {}", s),
        }
    }
}

impl std::error::Error for DigestError {}

/// A validated, lowercase SHA-256 digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Parse a digest, accepting an optional `sha256:` prefix
    pub fn parse(s: &str) -> Result<Self, DigestError> {
        let value = match s.split_once(':') {
            Some((algo, value)) if algo.eq_ignore_ascii_case("sha256") => value,
            Some((algo, _)) => return Err(DigestError::UnsupportedAlgorithm(algo.to_string())),
            None => s,
        };

        if value.len() != SHA256_HEX_LEN {
            return Err(DigestError::InvalidLength {
                expected: SHA256_HEX_LEN,
                got: value.len(),
            });
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DigestError::InvalidHex(value.to_string()));
        }

        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Build a digest from raw hash output
    fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// The digest as lowercase hex
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Format as `sha256:<hex>`
    pub fn to_prefixed_string(&self) -> String {
        format!("sha256:{}", self.0)
    }

    /// Abbreviated form for log lines
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Sha256Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Sha256Digest> for String {
    fn from(digest: Sha256Digest) -> Self {
        digest.0
    }
}

/// Incremental SHA-256 hasher
#[derive(Default)]
pub struct Hasher {
    state: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more data
    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Finish and return the digest
    pub fn finalize(self) -> Sha256Digest {
        Sha256Digest::from_bytes(&self.state.finalize())
    }
}

/// SHA-256 of a byte slice
pub fn sha256_bytes(data: &[u8]) -> Sha256Digest {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// SHA-256 of everything a reader yields
pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<Sha256Digest> {
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// SHA-256 of a file, streamed
pub fn hash_file(path: &Path) -> io::Result<Sha256Digest> {
    let mut file = std::fs::File::open(path)?;
    hash_reader(&mut file)
}
