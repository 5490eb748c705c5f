//! In-memory storage backend with failure injection for tests

use super::{backend_sha256, normalize, StorageBackend, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    collections: HashSet<String>,
    avus: HashMap<String, BTreeMap<String, String>>,
    failing_checksums: HashSet<String>,
    checksum_overrides: HashMap<String, String>,
    failing_deletes: HashSet<String>,
    writes: HashMap<String, usize>,
}

impl State {
    fn is_collection(&self, path: &str) -> bool {
        let prefix = format!("{}/", path);
        self.collections.contains(path) || self.files.keys().any(|k| k.starts_with(&prefix))
    }
}

/// Storage backend held in process memory
#[derive(Default)]
pub struct MemoryStorage {
    state: RwLock<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `checksum` fail for `path`
    pub async fn fail_checksum(&self, path: &str) {
        let mut state = self.state.write().await;
        state.failing_checksums.insert(path.trim_matches('/').to_string());
    }

    /// Report `checksum` for `path` instead of computing it
    pub async fn override_checksum(&self, path: &str, checksum: &str) {
        let mut state = self.state.write().await;
        state
            .checksum_overrides
            .insert(path.trim_matches('/').to_string(), checksum.to_string());
    }

    /// Make `delete` fail for `path`
    pub async fn fail_delete(&self, path: &str) {
        let mut state = self.state.write().await;
        state.failing_deletes.insert(path.trim_matches('/').to_string());
    }

    pub async fn contains(&self, path: &str) -> bool {
        let path = path.trim_matches('/');
        self.state.read().await.files.contains_key(path)
    }

    /// Number of `put_bytes` calls that targeted `path`
    pub async fn write_count(&self, path: &str) -> usize {
        let path = path.trim_matches('/');
        self.state.read().await.writes.get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let path = normalize(path)?;
        let state = self.state.read().await;
        Ok(state.files.contains_key(&path) || state.is_collection(&path))
    }

    async fn get_avu(&self, path: &str, name: &str) -> StorageResult<Option<String>> {
        let path = normalize(path)?;
        let state = self.state.read().await;
        if !state.is_collection(&path) {
            return Err(StorageError::NotFound(path));
        }
        Ok(state.avus.get(&path).and_then(|avus| avus.get(name).cloned()))
    }

    async fn set_avu(&self, path: &str, name: &str, value: &str) -> StorageResult<()> {
        let path = normalize(path)?;
        let mut state = self.state.write().await;
        if state.files.contains_key(&path) {
            return Err(StorageError::Session(format!(
                "AVUs are only supported on collections: {}",
                path
            )));
        }
        if !state.is_collection(&path) {
            return Err(StorageError::NotFound(path));
        }
        state
            .avus
            .entry(path)
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn get_file(&self, src: &str, dst: &Path) -> StorageResult<()> {
        let bytes = self.read(src).await?;
        tokio::fs::write(dst, bytes).await?;
        Ok(())
    }

    async fn put_bytes(&self, path: &str, bytes: Vec<u8>) -> StorageResult<()> {
        let path = normalize(path)?;
        let mut state = self.state.write().await;
        *state.writes.entry(path.clone()).or_insert(0) += 1;
        state.files.insert(path, bytes);
        Ok(())
    }

    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let path = normalize(path)?;
        self.state
            .read()
            .await
            .files
            .get(&path)
            .cloned()
            .ok_or(StorageError::NotFound(path))
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        let path = normalize(path)?;
        self.state
            .read()
            .await
            .files
            .get(&path)
            .map(|bytes| bytes.len() as u64)
            .ok_or(StorageError::NotFound(path))
    }

    async fn checksum(&self, path: &str) -> StorageResult<String> {
        let path = normalize(path)?;
        let state = self.state.read().await;
        if state.failing_checksums.contains(&path) {
            return Err(StorageError::Session(format!("checksum unavailable: {}", path)));
        }
        if let Some(checksum) = state.checksum_overrides.get(&path) {
            return Ok(checksum.clone());
        }
        state
            .files
            .get(&path)
            .map(|bytes| backend_sha256(bytes))
            .ok_or(StorageError::NotFound(path))
    }

    async fn copy_collection(&self, src: &str, dst: &str) -> StorageResult<()> {
        let src = normalize(src)?;
        let dst = normalize(dst)?;
        let mut state = self.state.write().await;
        if !state.is_collection(&src) {
            return Err(StorageError::NotFound(src));
        }

        let prefix = format!("{}/", src);
        let copied: Vec<(String, Vec<u8>)> = state
            .files
            .iter()
            .filter_map(|(key, bytes)| {
                key.strip_prefix(&prefix)
                    .map(|rest| (format!("{}/{}", dst, rest), bytes.clone()))
            })
            .collect();
        state.files.extend(copied);

        if let Some(avus) = state.avus.get(&src).cloned() {
            state.avus.insert(dst.clone(), avus);
        }
        state.collections.insert(dst);
        Ok(())
    }

    async fn create_collection(&self, path: &str) -> StorageResult<()> {
        let path = normalize(path)?;
        self.state.write().await.collections.insert(path);
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let path = normalize(path)?;
        let mut state = self.state.write().await;
        if state.failing_deletes.contains(&path) {
            return Err(StorageError::Session(format!("delete refused: {}", path)));
        }

        if state.files.remove(&path).is_some() {
            return Ok(());
        }
        if !state.is_collection(&path) {
            return Err(StorageError::NotFound(path));
        }

        let prefix = format!("{}/", path);
        state.files.retain(|key, _| !key.starts_with(&prefix));
        state.avus.remove(&path);
        state.collections.remove(&path);
        Ok(())
    }
}
