//! Resource file manifest
//!
//! One descriptor per resource file with its download URL, byte length and,
//! when the storage backend can provide one, its checksum. Entries follow the
//! store's file enumeration order.

use crate::errors::PublishResult;
use crate::Services;
use dataforge_common::db::models::{Resource, ResourceFile};
use dataforge_common::metrics::record_checksum_miss;
use dataforge_common::storage::{parse_checksum, FileChecksum};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

/// Manifest descriptor of one resource file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    pub length: u64,
    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

impl ManifestEntry {
    fn with_checksum(mut self, checksum: Option<FileChecksum>) -> Self {
        match checksum {
            Some(FileChecksum::Sha256(hex)) => self.sha256 = Some(hex),
            Some(FileChecksum::Md5(hex)) => self.md5 = Some(hex),
            None => {}
        }
        self
    }
}

/// Backend location whose checksum and size describe `file`
pub fn source_path(file: &ResourceFile) -> String {
    match file.reference_path.as_deref() {
        Some(reference) => reference.to_string(),
        None => file.storage_path(),
    }
}

pub struct ManifestBuilder {
    services: Services,
}

impl ManifestBuilder {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Build the manifest of `resource` from its file records
    #[instrument(skip(self, resource, files), fields(resource_id = %resource.short_id, files = files.len()))]
    pub async fn build(
        &self,
        resource: &Resource,
        files: &[ResourceFile],
    ) -> PublishResult<Vec<ManifestEntry>> {
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            entries.push(self.entry(resource, file).await?);
        }
        Ok(entries)
    }

    /// Load the files of `short_id` and build its manifest
    pub async fn build_for(&self, short_id: &str) -> PublishResult<Vec<ManifestEntry>> {
        let resource = self.services.store.get_resource(short_id).await?;
        let files = self.services.store.list_files(short_id).await?;
        self.build(&resource, &files).await
    }

    async fn entry(&self, resource: &Resource, file: &ResourceFile) -> PublishResult<ManifestEntry> {
        let site = &self.services.config.site;
        let source = source_path(file);

        let (url, length) = match file.reference_path.as_deref() {
            Some(reference) => {
                let url = site.download_url(&format!(
                    "{}/{}",
                    resource.short_id,
                    reference.trim_start_matches('/')
                ));
                (url, self.services.storage.size(reference).await?)
            }
            None => (site.download_url(&source), file.size.max(0) as u64),
        };

        let entry = ManifestEntry {
            url,
            length,
            filename: file.file_name().to_string(),
            sha256: None,
            md5: None,
        };

        Ok(entry.with_checksum(self.checksum(&source).await))
    }

    async fn checksum(&self, source: &str) -> Option<FileChecksum> {
        let parsed = match self.services.storage.checksum(source).await {
            Ok(raw) => parse_checksum(&raw),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(checksum) => Some(checksum),
            Err(e) => {
                error!(path = %source, error = %e, "Checksum lookup failed, omitting from manifest");
                record_checksum_miss();
                None
            }
        }
    }
}

/// Serialize a manifest as the published JSON document
pub fn to_json(entries: &[ManifestEntry]) -> PublishResult<String> {
    serde_json::to_string_pretty(entries).map_err(|e| dataforge_common::AppError::from(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use dataforge_common::storage::sha256_hex;
    use dataforge_common::{ResourceStore, StorageBackend};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_stored_files_in_enumeration_order() {
        let fx = Fixture::new();
        let resource = fx
            .resource_with_files(&[("b.csv", "1,2,3"), ("a/notes.txt", "hello")])
            .await;

        let manifest = ManifestBuilder::new(fx.services.clone())
            .build_for(&resource.short_id)
            .await
            .unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[0].filename, "b.csv");
        assert_eq!(manifest[1].filename, "notes.txt");
        assert_eq!(
            manifest[1].url,
            format!(
                "https://data.example.org/download/{}/data/contents/a/notes.txt",
                resource.short_id
            )
        );
        assert_eq!(manifest[1].length, 5);
        assert_eq!(manifest[1].sha256.as_deref(), Some(sha256_hex(b"hello").as_str()));
        assert!(manifest[1].md5.is_none());
    }

    #[tokio::test]
    async fn test_checksum_session_error_is_not_fatal() {
        let fx = Fixture::new();
        let resource = fx.resource_with_files(&[("obs.csv", "1,2,3")]).await;
        let files = fx.store.list_files(&resource.short_id).await.unwrap();
        fx.storage.fail_checksum(&files[0].storage_path()).await;

        let manifest = ManifestBuilder::new(fx.services.clone())
            .build(&resource, &files)
            .await
            .unwrap();

        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].length, 5);
        assert!(manifest[0].url.ends_with("/data/contents/obs.csv"));
        assert!(manifest[0].sha256.is_none() && manifest[0].md5.is_none());

        let json = to_json(&manifest).unwrap();
        assert!(!json.contains("sha256") && !json.contains("md5"));
    }

    #[tokio::test]
    async fn test_md5_checksum_reported_as_md5() {
        let fx = Fixture::new();
        let resource = fx.resource_with_files(&[("obs.csv", "hello")]).await;
        let files = fx.store.list_files(&resource.short_id).await.unwrap();
        // md5("hello"), base64 encoded
        fx.storage
            .override_checksum(&files[0].storage_path(), "md5:XUFAKrxLKna5cZ2REBfFkg==")
            .await;

        let manifest = ManifestBuilder::new(fx.services.clone())
            .build(&resource, &files)
            .await
            .unwrap();

        assert_eq!(manifest[0].md5.as_deref(), Some("5d41402abc4b2a76b9719d911017c592"));
        assert!(manifest[0].sha256.is_none());
    }

    #[tokio::test]
    async fn test_reference_file_uses_backend_lookup() {
        let fx = Fixture::new();
        let resource = fx.resource_with_files(&[]).await;
        fx.storage
            .put_bytes("federated/archive/flow.nc", vec![0u8; 42])
            .await
            .unwrap();
        let reference = fx
            .store
            .add_file(ResourceFile {
                id: Uuid::new_v4(),
                resource_id: resource.short_id.clone(),
                relative_path: "flow.nc".to_string(),
                size: 0,
                checksum: None,
                reference_path: Some("/federated/archive/flow.nc".to_string()),
                created_at: chrono::Utc::now().into(),
            })
            .await
            .unwrap();

        let manifest = ManifestBuilder::new(fx.services.clone())
            .build(&resource, &[reference])
            .await
            .unwrap();

        assert_eq!(manifest[0].filename, "flow.nc");
        assert_eq!(manifest[0].length, 42);
        assert_eq!(
            manifest[0].url,
            format!(
                "https://data.example.org/download/{}/federated/archive/flow.nc",
                resource.short_id
            )
        );
        assert_eq!(manifest[0].sha256.as_deref(), Some(sha256_hex(&[0u8; 42]).as_str()));
    }

    #[tokio::test]
    async fn test_missing_reference_target_is_fatal() {
        let fx = Fixture::new();
        let resource = fx.resource_with_files(&[]).await;
        let reference = ResourceFile {
            id: Uuid::new_v4(),
            resource_id: resource.short_id.clone(),
            relative_path: "gone.nc".to_string(),
            size: 0,
            checksum: None,
            reference_path: Some("/federated/gone.nc".to_string()),
            created_at: chrono::Utc::now().into(),
        };

        let result = ManifestBuilder::new(fx.services.clone())
            .build(&resource, &[reference])
            .await;
        assert!(matches!(result, Err(crate::PublishError::Storage(_))));
    }
}
