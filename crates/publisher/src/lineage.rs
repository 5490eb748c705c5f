//! Versioning and copy lineage
//!
//! Both flows start from an empty placeholder resource which is then
//! populated from the original. A version links the pair with
//! `isVersionOf`/`isReplacedBy` and freezes the original; a copy records a
//! `derived_from` source and leaves the original alone.
//!
//! Obsolescence chains stay linear: a resource has at most one successor
//! and at most one predecessor. Only the head of a chain can be deleted.

use crate::errors::{PublishError, PublishResult};
use crate::files::{create_resource, mark_bag_stale, resource_modified};
use crate::Services;
use dataforge_common::db::models::{
    ElementInput, ElementTerm, MetadataElement, Resource, ResourceFile, DATE_PUBLISHED,
    DERIVED_FROM, IS_REPLACED_BY, IS_VERSION_OF,
};
use dataforge_common::db::NewResource;
use dataforge_common::metrics::record_lineage;
use dataforge_common::storage::StorageError;
use std::fmt;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineageAction {
    Version,
    Copy,
}

impl fmt::Display for LineageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineageAction::Version => write!(f, "version"),
            LineageAction::Copy => write!(f, "copy"),
        }
    }
}

/// Elements bound to a publication event or to the original's own chain
fn is_inheritable(element: &MetadataElement) -> bool {
    match element.element_term() {
        ElementTerm::Identifier | ElementTerm::Publisher => false,
        ElementTerm::Date => element.element_type.as_deref() != Some(DATE_PUBLISHED),
        ElementTerm::Relation => !element.is_relation(IS_REPLACED_BY),
        ElementTerm::Source => element.element_type.as_deref() != Some(DERIVED_FROM),
        _ => true,
    }
}

/// Short id addressed by a landing URL
fn short_id_from_url(url: &str) -> &str {
    let url = url.trim_end_matches('/');
    match url.rfind('/') {
        Some(idx) => &url[idx + 1..],
        None => url,
    }
}

pub struct Lineage {
    services: Services,
}

impl Lineage {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    fn landing_url(&self, short_id: &str) -> String {
        self.services.config.site.landing_url(short_id)
    }

    /// Create the empty resource a version or copy of `short_id` is built in
    ///
    /// Versions require ownership. Copies require view access and a license
    /// that permits copying.
    #[instrument(skip(self), fields(resource_id = %short_id, action = %action))]
    pub async fn create_empty_resource(
        &self,
        short_id: &str,
        username: &str,
        action: LineageAction,
    ) -> PublishResult<Resource> {
        let store = &self.services.store;
        let access = &self.services.access;
        let original = store.get_resource(short_id).await?;

        match action {
            LineageAction::Version => {
                if !access.owns_resource(username, &original).await? {
                    return Err(PublishError::denied(username, "version", short_id));
                }
            }
            LineageAction::Copy => {
                if !access.can_view_resource(username, &original).await? {
                    return Err(PublishError::denied(username, "view", short_id));
                }
                let elements = store.list_elements(short_id).await?;
                if !access
                    .can_copy_resource(username, &original, &elements)
                    .await?
                {
                    return Err(PublishError::denied(username, "copy", short_id));
                }
            }
        }

        let placeholder = create_resource(
            &self.services,
            NewResource {
                title: original.title.clone(),
                owner: username.to_string(),
                resource_type: original.resource_type.clone(),
            },
        )
        .await?;

        info!(new_resource_id = %placeholder.short_id, "Created placeholder resource");
        Ok(placeholder)
    }

    /// Copy stored content, file records and inheritable metadata
    async fn copy_content(&self, original: &Resource, new: &Resource) -> PublishResult<()> {
        let store = &self.services.store;
        let storage = &self.services.storage;

        if storage.exists(&original.short_id).await? {
            storage
                .copy_collection(&original.short_id, &new.short_id)
                .await?;
            // The copied flag describes the original's bag, not this one
            mark_bag_stale(&self.services, &new.short_id).await?;
        }

        for file in store.list_files(&original.short_id).await? {
            store
                .add_file(ResourceFile {
                    id: Uuid::new_v4(),
                    resource_id: new.short_id.clone(),
                    created_at: chrono::Utc::now().into(),
                    ..file
                })
                .await?;
        }

        for element in store.list_elements(&original.short_id).await? {
            if is_inheritable(&element) {
                store
                    .create_element(&new.short_id, ElementInput::from_element(&element))
                    .await?;
            }
        }
        Ok(())
    }

    /// Delete relations of `relation_type` on `short_id`, returning how many
    async fn delete_relations(&self, short_id: &str, relation_type: &str) -> PublishResult<usize> {
        let store = &self.services.store;
        let mut deleted = 0;
        for element in store.list_elements(short_id).await? {
            if element.is_relation(relation_type) && store.delete_element(element.id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn has_relation(&self, short_id: &str, relation_type: &str) -> PublishResult<bool> {
        let elements = self.services.store.list_elements(short_id).await?;
        Ok(elements.iter().any(|e| e.is_relation(relation_type)))
    }

    /// Populate `new` as a derived copy of `original`
    #[instrument(skip_all, fields(resource_id = %original.short_id, new_resource_id = %new.short_id))]
    pub async fn copy_resource(&self, original: &Resource, new: &Resource) -> PublishResult<Resource> {
        self.copy_content(original, new).await?;

        // A copy starts no chain of its own
        self.delete_relations(&new.short_id, IS_VERSION_OF).await?;

        self.services
            .store
            .create_element(
                &new.short_id,
                ElementInput::new(ElementTerm::Source)
                    .with_type(DERIVED_FROM)
                    .with_value(self.landing_url(&original.short_id)),
            )
            .await?;

        record_lineage("copy");
        info!("Resource copied");
        Ok(self.services.store.get_resource(&new.short_id).await?)
    }

    /// Populate `new` as the next version of `original` and freeze `original`
    #[instrument(skip_all, fields(resource_id = %original.short_id, new_resource_id = %new.short_id))]
    pub async fn create_new_version_resource(
        &self,
        original: &Resource,
        new: &Resource,
        username: &str,
    ) -> PublishResult<Resource> {
        let store = &self.services.store;

        if self.has_relation(&original.short_id, IS_REPLACED_BY).await? {
            return Err(PublishError::ChainIntegrity {
                resource_id: original.short_id.clone(),
                message: "resource has already been replaced by a newer version".to_string(),
            });
        }

        self.copy_content(original, new).await?;

        store
            .create_element(
                &original.short_id,
                ElementInput::relation(IS_REPLACED_BY, self.landing_url(&new.short_id)),
            )
            .await?;

        // An inherited isVersionOf points at the original's predecessor
        self.delete_relations(&new.short_id, IS_VERSION_OF).await?;
        store
            .create_element(
                &new.short_id,
                ElementInput::relation(IS_VERSION_OF, self.landing_url(&original.short_id)),
            )
            .await?;

        let mut superseded = store.get_resource(&original.short_id).await?;
        superseded.immutable = true;
        resource_modified(&self.services, &mut superseded, username).await?;

        record_lineage("version");
        info!("New version created");
        Ok(store.get_resource(&new.short_id).await?)
    }

    /// Delete a resource, promoting its predecessor when it heads a chain
    #[instrument(skip(self), fields(resource_id = %short_id))]
    pub async fn delete_resource(&self, short_id: &str) -> PublishResult<String> {
        let store = &self.services.store;
        let resource = store.get_resource(short_id).await?;
        let elements = store.list_elements(short_id).await?;

        if elements.iter().any(|e| e.is_relation(IS_REPLACED_BY)) {
            return Err(PublishError::ChainIntegrity {
                resource_id: short_id.to_string(),
                message: "an obsoleted resource in the middle of the obsolescence chain cannot be deleted"
                    .to_string(),
            });
        }

        let mut predecessor = elements
            .iter()
            .find(|e| e.is_relation(IS_VERSION_OF))
            .and_then(|e| e.value.as_deref())
            .map(|url| short_id_from_url(url).to_string());
        if let Some(id) = predecessor.as_deref() {
            if store.find_resource(id).await?.is_none() {
                warn!(predecessor = %id, "Predecessor no longer exists");
                predecessor = None;
            }
        }

        // Content goes first; the chain only changes once the records go
        self.remove_storage(&resource).await?;
        if store
            .purge_chain_head(short_id, predecessor.as_deref())
            .await?
        {
            info!(predecessor = ?predecessor, "Predecessor is the latest version again");
        }

        record_lineage("delete");
        info!("Resource deleted");
        Ok(short_id.to_string())
    }

    async fn remove_storage(&self, resource: &Resource) -> PublishResult<()> {
        let bag = self.services.config.storage.bag_path(&resource.short_id);
        for path in [resource.short_id.as_str(), bag.as_str()] {
            match self.services.storage.delete(path).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Drop a placeholder whose population failed
    async fn discard(&self, placeholder: &Resource) {
        if let Err(e) = self.remove_storage(placeholder).await {
            warn!(error = %e, "Failed to remove placeholder content");
        }
        if let Err(e) = self.services.store.purge_resource(&placeholder.short_id).await {
            warn!(error = %e, "Failed to remove placeholder resource");
        }
    }

    /// Create and populate a new version of `short_id`
    pub async fn version_resource(&self, short_id: &str, username: &str) -> PublishResult<Resource> {
        let original = self.services.store.get_resource(short_id).await?;
        let placeholder = self
            .create_empty_resource(short_id, username, LineageAction::Version)
            .await?;

        match self
            .create_new_version_resource(&original, &placeholder, username)
            .await
        {
            Ok(version) => Ok(version),
            Err(e) => {
                self.discard(&placeholder).await;
                Err(e)
            }
        }
    }

    /// Create and populate a copy of `short_id` owned by `username`
    pub async fn copy_resource_as(&self, short_id: &str, username: &str) -> PublishResult<Resource> {
        let original = self.services.store.get_resource(short_id).await?;
        let placeholder = self
            .create_empty_resource(short_id, username, LineageAction::Copy)
            .await?;

        match self.copy_resource(&original, &placeholder).await {
            Ok(copy) => Ok(copy),
            Err(e) => {
                self.discard(&placeholder).await;
                Err(e)
            }
        }
    }
}
