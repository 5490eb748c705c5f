//! Storage backend abstraction
//!
//! The object store holding resource content is an external collaborator.
//! The pipeline only needs a narrow contract:
//! - existence checks and attribute-value-unit (AVU) flags on collections
//! - downloads to a local path, reads and writes of whole objects
//! - sizes and backend-computed checksums
//!
//! Checksums are reported as `"<algo>:<base64 digest>"`, e.g. `sha2:...`
//! for SHA-256 or `md5:...` for MD5.

mod local;
mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Path not found in storage: {0}")]
    NotFound(String),

    #[error("Storage session error: {0}")]
    Session(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Unrecognized checksum format: {0}")]
    InvalidChecksum(String),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contract of the content-addressable store keyed by resource id + path
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Read an attribute attached to a collection
    async fn get_avu(&self, path: &str, name: &str) -> StorageResult<Option<String>>;

    async fn set_avu(&self, path: &str, name: &str, value: &str) -> StorageResult<()>;

    /// Download `src` to the local file `dst`
    async fn get_file(&self, src: &str, dst: &Path) -> StorageResult<()>;

    async fn put_bytes(&self, path: &str, bytes: Vec<u8>) -> StorageResult<()>;

    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    async fn size(&self, path: &str) -> StorageResult<u64>;

    /// Backend-computed checksum in `"<algo>:<base64>"` form
    async fn checksum(&self, path: &str) -> StorageResult<String>;

    /// Copy a collection (content and AVUs) to a new location
    async fn copy_collection(&self, src: &str, dst: &str) -> StorageResult<()>;

    /// Create an empty collection; existing collections are left as they are
    async fn create_collection(&self, path: &str) -> StorageResult<()>;

    /// Delete an object or a whole collection
    async fn delete(&self, path: &str) -> StorageResult<()>;
}

/// Decoded checksum, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChecksum {
    Sha256(String),
    Md5(String),
}

impl FileChecksum {
    pub fn algorithm(&self) -> &'static str {
        match self {
            FileChecksum::Sha256(_) => "sha256",
            FileChecksum::Md5(_) => "md5",
        }
    }
}

/// Decode a backend checksum string into its hex digest
pub fn parse_checksum(raw: &str) -> StorageResult<FileChecksum> {
    let (algo, payload) = raw
        .split_once(':')
        .ok_or_else(|| StorageError::InvalidChecksum(raw.to_string()))?;

    let digest = STANDARD
        .decode(payload.trim())
        .map_err(|_| StorageError::InvalidChecksum(raw.to_string()))?;
    let hex = hex::encode(digest);

    let algo = algo.to_ascii_lowercase();
    if algo.starts_with("sha") {
        Ok(FileChecksum::Sha256(hex))
    } else if algo.starts_with("md5") {
        Ok(FileChecksum::Md5(hex))
    } else {
        Err(StorageError::InvalidChecksum(raw.to_string()))
    }
}

/// SHA-256 of `bytes` in the backend's reporting format
pub fn backend_sha256(bytes: &[u8]) -> String {
    format!("sha2:{}", STANDARD.encode(Sha256::digest(bytes)))
}

/// Hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Reject absolute escapes and parent traversal; strip leading slashes
pub(crate) fn normalize(path: &str) -> StorageResult<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.split('/').any(|seg| seg == "..") {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(trimmed.to_string())
}
