//! Persistence seam for resources, files and metadata

use crate::db::models::*;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use uuid::Uuid;

/// Attributes of a resource about to be created
#[derive(Debug, Clone)]
pub struct NewResource {
    pub title: String,
    pub owner: String,
    pub resource_type: String,
}

impl NewResource {
    /// Materialize a private, mutable resource with a fresh short id
    pub fn into_model(self) -> Resource {
        let now = chrono::Utc::now();
        Resource {
            short_id: Uuid::new_v4().simple().to_string(),
            title: self.title,
            owner: self.owner.clone(),
            resource_type: self.resource_type,
            immutable: false,
            public: false,
            discoverable: false,
            published: false,
            shareable: true,
            doi: None,
            minid: None,
            assessment_id: None,
            created_at: now.into(),
            updated_at: now.into(),
            last_changed_by: Some(self.owner),
        }
    }
}

/// Entity store consumed by the publication pipeline
///
/// Files are returned in enumeration (insertion) order. Deleting a resource
/// never cascades implicitly; callers run their lineage checks and then call
/// [`ResourceStore::purge_resource`].
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn create_resource(&self, input: NewResource) -> Result<Resource>;

    async fn find_resource(&self, short_id: &str) -> Result<Option<Resource>>;

    /// Persist every attribute of `resource`
    async fn save_resource(&self, resource: &Resource) -> Result<Resource>;

    /// Remove a resource together with its file records and metadata
    async fn purge_resource(&self, short_id: &str) -> Result<bool>;

    /// Purge the head of an obsolescence chain and make `predecessor` the
    /// head again, as one unit of work
    ///
    /// Promotion drops the predecessor's `isReplacedBy` relations and clears
    /// its immutable flag. Returns whether a predecessor was promoted.
    async fn purge_chain_head(&self, short_id: &str, predecessor: Option<&str>) -> Result<bool>;

    async fn find_resource_by_doi(&self, doi: &str) -> Result<Option<Resource>>;

    async fn find_resource_by_minid(&self, minid: &str) -> Result<Option<Resource>>;

    async fn list_files(&self, short_id: &str) -> Result<Vec<ResourceFile>>;

    async fn add_file(&self, file: ResourceFile) -> Result<ResourceFile>;

    async fn delete_file(&self, file_id: Uuid) -> Result<bool>;

    async fn list_elements(&self, short_id: &str) -> Result<Vec<MetadataElement>>;

    async fn create_element(&self, short_id: &str, input: ElementInput) -> Result<MetadataElement>;

    async fn delete_element(&self, element_id: Uuid) -> Result<bool>;

    /// Persist the published flags and the publication metadata atomically
    async fn commit_publication(
        &self,
        resource: &Resource,
        elements: Vec<ElementInput>,
    ) -> Result<Resource>;

    /// Find a resource, failing when it does not exist
    async fn get_resource(&self, short_id: &str) -> Result<Resource> {
        self.find_resource(short_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound {
                id: short_id.to_string(),
            })
    }
}
