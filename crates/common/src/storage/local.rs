//! Filesystem-rooted storage backend
//!
//! Collections are directories under a root; AVUs of a collection live in a
//! `.avus.json` sidecar inside it, so copying a collection carries them along.

use super::{backend_sha256, normalize, StorageBackend, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const AVU_SIDECAR: &str = ".avus.json";

/// Storage backend over a local directory tree
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        Ok(self.root.join(normalize(path)?))
    }

    async fn read_avus(dir: &Path) -> StorageResult<BTreeMap<String, String>> {
        match tokio::fs::read(dir.join(AVU_SIDECAR)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Session(format!("corrupt AVU sidecar: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn not_found_or(path: &str, err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Io(err)
    }
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)?).await?)
    }

    async fn get_avu(&self, path: &str, name: &str) -> StorageResult<Option<String>> {
        let dir = self.resolve(path)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(Self::read_avus(&dir).await?.remove(name))
    }

    async fn set_avu(&self, path: &str, name: &str, value: &str) -> StorageResult<()> {
        let dir = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&dir)
            .await
            .map_err(|e| not_found_or(path, e))?;
        if !metadata.is_dir() {
            return Err(StorageError::Session(format!(
                "AVUs are only supported on collections: {}",
                path
            )));
        }

        let mut avus = Self::read_avus(&dir).await?;
        avus.insert(name.to_string(), value.to_string());
        let bytes = serde_json::to_vec_pretty(&avus)
            .map_err(|e| StorageError::Session(e.to_string()))?;
        tokio::fs::write(dir.join(AVU_SIDECAR), bytes).await?;

        debug!(path = %path, name = %name, value = %value, "AVU set");
        Ok(())
    }

    async fn get_file(&self, src: &str, dst: &Path) -> StorageResult<()> {
        let source = self.resolve(src)?;
        tokio::fs::copy(&source, dst)
            .await
            .map_err(|e| not_found_or(src, e))?;
        Ok(())
    }

    async fn put_bytes(&self, path: &str, bytes: Vec<u8>) -> StorageResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        tokio::fs::read(self.resolve(path)?)
            .await
            .map_err(|e| not_found_or(path, e))
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        let metadata = tokio::fs::metadata(self.resolve(path)?)
            .await
            .map_err(|e| not_found_or(path, e))?;
        Ok(metadata.len())
    }

    async fn checksum(&self, path: &str) -> StorageResult<String> {
        let bytes = self.read(path).await?;
        Ok(backend_sha256(&bytes))
    }

    async fn copy_collection(&self, src: &str, dst: &str) -> StorageResult<()> {
        let source = self.resolve(src)?;
        let target = self.resolve(dst)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(StorageError::NotFound(src.to_string()));
        }

        tokio::task::spawn_blocking(move || copy_tree(&source, &target))
            .await
            .map_err(|e| StorageError::Session(format!("copy task failed: {}", e)))??;
        Ok(())
    }

    async fn create_collection(&self, path: &str) -> StorageResult<()> {
        let target = self.resolve(path)?;
        tokio::fs::create_dir_all(&target).await?;
        debug!(path = %path, "Collection created");
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let target = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&target)
            .await
            .map_err(|e| not_found_or(path, e))?;
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&target).await?;
        } else {
            tokio::fs::remove_file(&target).await?;
        }
        Ok(())
    }
}
