//! Shared utilities.
//!
//! Filesystem helpers for manifests and durable writes, plus archive checksums.

pub mod fileutils;
pub mod hash;

#[cfg(test)]
pub mod testutil;
