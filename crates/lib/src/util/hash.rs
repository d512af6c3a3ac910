//! Checksums for downloaded source archives.
//!
//! Descriptors spell a checksum as `<algorithm>:<hex digest>`; only
//! `sha256` is understood.

use std::fs;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("unsupported checksum algorithm '{0}'")]
  UnsupportedAlgorithm(String),

  #[error("malformed checksum '{0}', expected <algorithm>:<hex>")]
  Malformed(String),

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },
}

/// A parsed `sha256:<hex>` checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
  pub digest: String,
}

impl Checksum {
  pub fn parse(spec: &str) -> Result<Self, HashError> {
    let (algorithm, digest) = spec.split_once(':').ok_or_else(|| HashError::Malformed(spec.to_string()))?;
    if algorithm != "sha256" {
      return Err(HashError::UnsupportedAlgorithm(algorithm.to_string()));
    }
    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
      return Err(HashError::Malformed(spec.to_string()));
    }
    Ok(Self {
      digest: digest.to_ascii_lowercase(),
    })
  }

  /// True when the file at `path` hashes to this checksum.
  pub fn matches_file(&self, path: &Path) -> Result<bool, HashError> {
    Ok(hash_file(path)? == self.digest)
  }
}

impl std::fmt::Display for Checksum {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "sha256:{}", self.digest)
  }
}

/// Hash a file's contents.
///
/// Returns the full 64-character SHA256 hash of the file.
pub fn hash_file(path: &Path) -> Result<String, HashError> {
  let mut file = fs::File::open(path).map_err(|e| HashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  })?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(|e| HashError::ReadFile {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(hex::encode(hasher.finalize()))
}
