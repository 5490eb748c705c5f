//! Resource file management
//!
//! Adding or removing content marks the resource's bag stale. File deletion
//! runs caller-supplied hooks in a fixed order:
//! 1. pre-delete hooks, while the file still exists
//! 2. physical deletion, then the file record
//! 3. post-delete hooks
//! 4. public/discoverable recheck

use crate::errors::{PublishError, PublishResult};
use crate::Services;
use async_trait::async_trait;
use dataforge_common::access::ResourceSnapshot;
use dataforge_common::db::models::{ElementInput, ElementTerm, Resource, ResourceFile};
use dataforge_common::db::NewResource;
use dataforge_common::errors::AppError;
use dataforge_common::storage::StorageError;
use dataforge_common::BAG_MODIFIED_AVU;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Callbacks around the removal of a single file
#[async_trait]
pub trait FileDeletionHook: Send + Sync {
    async fn pre_delete(
        &self,
        _resource: &Resource,
        _file: &ResourceFile,
        _username: &str,
    ) -> PublishResult<()> {
        Ok(())
    }

    async fn post_delete(&self, _resource: &Resource) -> PublishResult<()> {
        Ok(())
    }
}

/// Media type recorded in Format elements for a file name
pub fn mime_type(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => "text/csv",
        "txt" => "text/plain",
        "json" => "application/json",
        "xml" => "application/xml",
        "nc" => "application/x-netcdf",
        "tif" | "tiff" => "image/tiff",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        _ => "application/octet-stream",
    }
}

/// Flag the bag of `short_id` for rebuild
///
/// Resources without a storage collection have no bag to invalidate.
pub async fn mark_bag_stale(services: &Services, short_id: &str) -> PublishResult<()> {
    match services
        .storage
        .set_avu(short_id, BAG_MODIFIED_AVU, "true")
        .await
    {
        Ok(()) => Ok(()),
        Err(StorageError::NotFound(_)) => {
            debug!(resource_id = %short_id, "No storage collection, bag flag not set");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Create a resource record together with its storage collection
#[instrument(skip(services, input), fields(owner = %input.owner))]
pub async fn create_resource(services: &Services, input: NewResource) -> PublishResult<Resource> {
    let resource = services.store.create_resource(input).await?;
    if let Err(e) = services.storage.create_collection(&resource.short_id).await {
        if let Err(purge) = services.store.purge_resource(&resource.short_id).await {
            warn!(resource_id = %resource.short_id, error = %purge, "Failed to remove resource without collection");
        }
        return Err(e.into());
    }
    debug!(resource_id = %resource.short_id, "Resource created");
    Ok(resource)
}

/// Record `username` as the last modifier and invalidate the bag
pub async fn resource_modified(
    services: &Services,
    resource: &mut Resource,
    username: &str,
) -> PublishResult<()> {
    resource.updated_at = chrono::Utc::now().into();
    resource.last_changed_by = Some(username.to_string());
    *resource = services.store.save_resource(resource).await?;
    mark_bag_stale(services, &resource.short_id).await
}

pub struct FileManager {
    services: Services,
}

impl FileManager {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn mutable_resource(&self, short_id: &str) -> PublishResult<Resource> {
        let resource = self.services.store.get_resource(short_id).await?;
        if resource.immutable {
            return Err(PublishError::Immutable {
                resource_id: resource.short_id,
            });
        }
        Ok(resource)
    }

    async fn ensure_unique_path(&self, short_id: &str, relative_path: &str) -> PublishResult<()> {
        let files = self.services.store.list_files(short_id).await?;
        if files.iter().any(|f| f.relative_path == relative_path) {
            return Err(AppError::Duplicate {
                message: format!("{} already exists in resource {}", relative_path, short_id),
            }
            .into());
        }
        Ok(())
    }

    /// Store `bytes` as a new file of the resource
    #[instrument(skip(self, bytes), fields(resource_id = %short_id, size = bytes.len()))]
    pub async fn add_resource_file(
        &self,
        short_id: &str,
        relative_path: &str,
        bytes: Vec<u8>,
        username: &str,
    ) -> PublishResult<ResourceFile> {
        let mut resource = self.mutable_resource(short_id).await?;
        let relative_path = relative_path.trim_start_matches('/');
        self.ensure_unique_path(short_id, relative_path).await?;

        let mut file = ResourceFile {
            id: Uuid::new_v4(),
            resource_id: resource.short_id.clone(),
            relative_path: relative_path.to_string(),
            size: bytes.len() as i64,
            checksum: None,
            reference_path: None,
            created_at: chrono::Utc::now().into(),
        };

        let path = file.storage_path();
        self.services.storage.put_bytes(&path, bytes).await?;
        file.checksum = match self.services.storage.checksum(&path).await {
            Ok(checksum) => Some(checksum),
            Err(e) => {
                warn!(path = %path, error = %e, "Checksum unavailable at upload");
                None
            }
        };

        let file = self.services.store.add_file(file).await?;
        self.ensure_format_element(&resource, &file).await?;
        resource_modified(&self.services, &mut resource, username).await?;

        info!(file = %file.relative_path, "Resource file added");
        Ok(file)
    }

    /// Register externally hosted content by its backend path
    #[instrument(skip(self), fields(resource_id = %short_id))]
    pub async fn add_reference_file(
        &self,
        short_id: &str,
        reference_path: &str,
        username: &str,
    ) -> PublishResult<ResourceFile> {
        let mut resource = self.mutable_resource(short_id).await?;
        let size = self.services.storage.size(reference_path).await?;

        let name = reference_path
            .rsplit_once('/')
            .map_or(reference_path, |(_, name)| name);
        self.ensure_unique_path(short_id, name).await?;

        let file = ResourceFile {
            id: Uuid::new_v4(),
            resource_id: resource.short_id.clone(),
            relative_path: name.to_string(),
            size: size as i64,
            checksum: None,
            reference_path: Some(reference_path.to_string()),
            created_at: chrono::Utc::now().into(),
        };

        // Nothing is copied, but the bag flag lives on the collection
        self.services.storage.create_collection(short_id).await?;
        let file = self.services.store.add_file(file).await?;
        self.ensure_format_element(&resource, &file).await?;
        resource_modified(&self.services, &mut resource, username).await?;

        info!(reference = %reference_path, "Reference file added");
        Ok(file)
    }

    /// Delete one file, identified by relative path or record id
    #[instrument(skip(self, hooks), fields(resource_id = %short_id, file = %name_or_id))]
    pub async fn delete_resource_file(
        &self,
        short_id: &str,
        name_or_id: &str,
        username: &str,
        hooks: &[Arc<dyn FileDeletionHook>],
    ) -> PublishResult<String> {
        let mut resource = self.mutable_resource(short_id).await?;
        let files = self.services.store.list_files(short_id).await?;
        let file = files
            .into_iter()
            .find(|f| matches_file(f, name_or_id))
            .ok_or_else(|| AppError::FileNotFound {
                resource_id: short_id.to_string(),
                file: name_or_id.to_string(),
            })?;

        for hook in hooks {
            hook.pre_delete(&resource, &file, username).await?;
        }

        // Referenced content belongs to its host; only the record goes.
        if !file.is_reference() {
            match self.services.storage.delete(&file.storage_path()).await {
                Ok(()) => {}
                Err(StorageError::NotFound(path)) => {
                    warn!(path = %path, "Stored content already absent");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.services.store.delete_file(file.id).await?;
        self.delete_format_element(&resource, &file).await?;

        for hook in hooks {
            hook.post_delete(&resource).await?;
        }

        self.update_public_and_discoverable(&mut resource).await?;
        resource_modified(&self.services, &mut resource, username).await?;

        info!("Resource file deleted");
        Ok(name_or_id.to_string())
    }

    /// Withdraw public and discoverable flags the resource no longer qualifies for
    pub async fn update_public_and_discoverable(&self, resource: &mut Resource) -> PublishResult<()> {
        if !resource.public && !resource.discoverable {
            return Ok(());
        }

        let store = &self.services.store;
        let files = store.list_files(&resource.short_id).await?;
        let elements = store.list_elements(&resource.short_id).await?;
        let snapshot = ResourceSnapshot::new(resource, &files, &elements);

        if !self.services.policy.can_be_public_or_discoverable(&snapshot) {
            resource.public = false;
            resource.discoverable = false;
            *resource = store.save_resource(resource).await?;
            info!(resource_id = %resource.short_id, "Resource made private");
        }
        Ok(())
    }

    async fn ensure_format_element(&self, resource: &Resource, file: &ResourceFile) -> PublishResult<()> {
        let mime = mime_type(file.file_name());
        let elements = self.services.store.list_elements(&resource.short_id).await?;
        let present = elements
            .iter()
            .any(|e| e.element_term() == ElementTerm::Format && e.value.as_deref() == Some(mime));
        if !present {
            self.services
                .store
                .create_element(&resource.short_id, ElementInput::new(ElementTerm::Format).with_value(mime))
                .await?;
        }
        Ok(())
    }

    /// Drop the Format element once no remaining file shares its media type
    async fn delete_format_element(&self, resource: &Resource, deleted: &ResourceFile) -> PublishResult<()> {
        let store = &self.services.store;
        let mime = mime_type(deleted.file_name());
        let remaining = store.list_files(&resource.short_id).await?;
        if remaining.iter().any(|f| mime_type(f.file_name()) == mime) {
            return Ok(());
        }

        let elements = store.list_elements(&resource.short_id).await?;
        if let Some(format) = elements
            .iter()
            .find(|e| e.element_term() == ElementTerm::Format && e.value.as_deref() == Some(mime))
        {
            store.delete_element(format.id).await?;
        }
        Ok(())
    }
}

fn matches_file(file: &ResourceFile, name_or_id: &str) -> bool {
    match Uuid::parse_str(name_or_id) {
        Ok(id) => file.id == id,
        Err(_) => file.relative_path == name_or_id.trim_start_matches('/'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use dataforge_common::{ResourceStore, StorageBackend};
    use std::sync::Mutex;

    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
        storage: Arc<dataforge_common::storage::MemoryStorage>,
    }

    #[async_trait]
    impl FileDeletionHook for Recorder {
        async fn pre_delete(
            &self,
            _resource: &Resource,
            file: &ResourceFile,
            username: &str,
        ) -> PublishResult<()> {
            let present = self.storage.contains(&file.storage_path()).await;
            self.events
                .lock()
                .unwrap()
                .push(format!("pre:{}:{}:{}", file.relative_path, username, present));
            Ok(())
        }

        async fn post_delete(&self, resource: &Resource) -> PublishResult<()> {
            let left = self.storage.exists(&resource.short_id).await.unwrap();
            self.events.lock().unwrap().push(format!("post:{}", left));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_add_file_stores_content_and_format() {
        let fx = Fixture::new();
        let resource = fx.resource_with_files(&[]).await;
        let manager = FileManager::new(fx.services.clone());

        let file = manager
            .add_resource_file(&resource.short_id, "/obs/flow.csv", b"1,2".to_vec(), "alice")
            .await
            .unwrap();

        assert_eq!(file.relative_path, "obs/flow.csv");
        assert!(file.checksum.as_deref().is_some_and(|c| c.starts_with("sha2:")));
        assert!(fx.storage.contains(&file.storage_path()).await);

        let elements = fx.store.list_elements(&resource.short_id).await.unwrap();
        assert!(elements
            .iter()
            .any(|e| e.element_term() == ElementTerm::Format && e.value.as_deref() == Some("text/csv")));
        assert_eq!(
            fx.storage
                .get_avu(&resource.short_id, BAG_MODIFIED_AVU)
                .await
                .unwrap()
                .as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_duplicate_path_rejected() {
        let fx = Fixture::new();
        let resource = fx.resource_with_files(&[("a.txt", "a")]).await;
        let manager = FileManager::new(fx.services.clone());

        let err = manager
            .add_resource_file(&resource.short_id, "a.txt", b"b".to_vec(), "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::App(AppError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_immutable_resource_rejects_changes() {
        let fx = Fixture::new();
        let mut resource = fx.resource_with_files(&[("a.txt", "a")]).await;
        resource.immutable = true;
        fx.store.save_resource(&resource).await.unwrap();
        let manager = FileManager::new(fx.services.clone());

        let err = manager
            .add_resource_file(&resource.short_id, "b.txt", b"b".to_vec(), "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Immutable { .. }));

        let err = manager
            .delete_resource_file(&resource.short_id, "a.txt", "alice", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Immutable { .. }));
    }

    #[tokio::test]
    async fn test_reference_file_recorded_without_copy() {
        let fx = Fixture::new();
        let resource = fx.resource_with_files(&[]).await;
        fx.storage
            .put_bytes("federated/flow.nc", vec![1u8; 12])
            .await
            .unwrap();
        let manager = FileManager::new(fx.services.clone());

        let file = manager
            .add_reference_file(&resource.short_id, "/federated/flow.nc", "alice")
            .await
            .unwrap();

        assert!(file.is_reference());
        assert_eq!(file.size, 12);
        assert_eq!(file.relative_path, "flow.nc");
        assert!(!fx.storage.contains(&file.storage_path()).await);
    }

    #[tokio::test]
    async fn test_reference_file_creates_missing_collection() {
        let fx = Fixture::new();
        let resource = fx
            .store
            .create_resource(NewResource {
                title: "Imported".to_string(),
                owner: "alice".to_string(),
                resource_type: "GenericResource".to_string(),
            })
            .await
            .unwrap();
        fx.storage.put_bytes("federated/a.nc", vec![1u8; 4]).await.unwrap();
        let manager = FileManager::new(fx.services.clone());

        manager
            .add_reference_file(&resource.short_id, "/federated/a.nc", "alice")
            .await
            .unwrap();

        assert!(fx.storage.exists(&resource.short_id).await.unwrap());
        assert_eq!(
            fx.storage
                .get_avu(&resource.short_id, BAG_MODIFIED_AVU)
                .await
                .unwrap()
                .as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_created_resource_has_collection() {
        let fx = Fixture::new();
        let resource = create_resource(
            &fx.services,
            NewResource {
                title: "Fresh".to_string(),
                owner: "alice".to_string(),
                resource_type: "GenericResource".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(fx.storage.exists(&resource.short_id).await.unwrap());
        assert!(fx.store.list_files(&resource.short_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_runs_hooks_in_order() {
        let fx = Fixture::new();
        let resource = fx.resource_with_files(&[("a.csv", "1"), ("b.txt", "2")]).await;
        let events = Arc::new(Mutex::new(Vec::new()));
        let hooks: Vec<Arc<dyn FileDeletionHook>> = vec![Arc::new(Recorder {
            events: events.clone(),
            storage: fx.storage.clone(),
        })];
        let manager = FileManager::new(fx.services.clone());

        let deleted = manager
            .delete_resource_file(&resource.short_id, "a.csv", "alice", &hooks)
            .await
            .unwrap();

        assert_eq!(deleted, "a.csv");
        assert_eq!(
            *events.lock().unwrap(),
            vec!["pre:a.csv:alice:true".to_string(), "post:true".to_string()]
        );
        let remaining = fx.store.list_files(&resource.short_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].relative_path, "b.txt");
    }

    #[tokio::test]
    async fn test_delete_by_id_and_missing_file() {
        let fx = Fixture::new();
        let resource = fx.resource_with_files(&[("a.csv", "1")]).await;
        let files = fx.store.list_files(&resource.short_id).await.unwrap();
        let manager = FileManager::new(fx.services.clone());

        let err = manager
            .delete_resource_file(&resource.short_id, "missing.csv", "alice", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::App(AppError::FileNotFound { .. })));

        manager
            .delete_resource_file(&resource.short_id, &files[0].id.to_string(), "alice", &[])
            .await
            .unwrap();
        assert!(fx.store.list_files(&resource.short_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleting_last_file_makes_resource_private() {
        let fx = Fixture::new();
        let mut resource = fx.resource_with_files(&[("a.csv", "1")]).await;
        resource.public = true;
        resource.discoverable = true;
        fx.store.save_resource(&resource).await.unwrap();
        let manager = FileManager::new(fx.services.clone());

        manager
            .delete_resource_file(&resource.short_id, "a.csv", "bob", &[])
            .await
            .unwrap();

        let reloaded = fx.reload(&resource.short_id).await;
        assert!(!reloaded.public && !reloaded.discoverable);
        assert_eq!(reloaded.last_changed_by.as_deref(), Some("bob"));
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type("obs.CSV"), "text/csv");
        assert_eq!(mime_type("archive.tar.gz"), "application/gzip");
        assert_eq!(mime_type("README"), "application/octet-stream");
    }
}
