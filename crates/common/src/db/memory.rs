//! In-memory resource store
//!
//! Keeps resources, files and metadata in process memory behind an async
//! lock. Used by tests and by tooling that runs without Postgres.

use crate::db::models::*;
use crate::db::store::{NewResource, ResourceStore};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    resources: HashMap<String, Resource>,
    files: Vec<ResourceFile>,
    elements: Vec<MetadataElement>,
}

/// Resource store held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored resources
    pub async fn resource_count(&self) -> usize {
        self.state.read().await.resources.len()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn create_resource(&self, input: NewResource) -> Result<Resource> {
        let resource = input.into_model();
        let mut state = self.state.write().await;
        state
            .resources
            .insert(resource.short_id.clone(), resource.clone());
        Ok(resource)
    }

    async fn find_resource(&self, short_id: &str) -> Result<Option<Resource>> {
        Ok(self.state.read().await.resources.get(short_id).cloned())
    }

    async fn save_resource(&self, resource: &Resource) -> Result<Resource> {
        let mut state = self.state.write().await;
        match state.resources.get_mut(&resource.short_id) {
            Some(existing) => {
                *existing = resource.clone();
                Ok(resource.clone())
            }
            None => Err(AppError::ResourceNotFound {
                id: resource.short_id.clone(),
            }),
        }
    }

    async fn purge_resource(&self, short_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        state.elements.retain(|e| e.resource_id != short_id);
        state.files.retain(|f| f.resource_id != short_id);
        Ok(state.resources.remove(short_id).is_some())
    }

    async fn purge_chain_head(&self, short_id: &str, predecessor: Option<&str>) -> Result<bool> {
        let mut state = self.state.write().await;
        state.elements.retain(|e| e.resource_id != short_id);
        state.files.retain(|f| f.resource_id != short_id);
        state.resources.remove(short_id);

        let Some(predecessor) = predecessor else {
            return Ok(false);
        };
        let before = state.elements.len();
        state
            .elements
            .retain(|e| !(e.resource_id == predecessor && e.is_relation(IS_REPLACED_BY)));
        if state.elements.len() == before {
            return Ok(false);
        }

        if let Some(resource) = state.resources.get_mut(predecessor) {
            resource.immutable = false;
            resource.updated_at = chrono::Utc::now().into();
        }
        Ok(true)
    }

    async fn find_resource_by_doi(&self, doi: &str) -> Result<Option<Resource>> {
        let state = self.state.read().await;
        Ok(state
            .resources
            .values()
            .find(|r| r.doi.as_deref() == Some(doi))
            .cloned())
    }

    async fn find_resource_by_minid(&self, minid: &str) -> Result<Option<Resource>> {
        let state = self.state.read().await;
        Ok(state
            .resources
            .values()
            .find(|r| r.minid.as_deref() == Some(minid))
            .cloned())
    }

    async fn list_files(&self, short_id: &str) -> Result<Vec<ResourceFile>> {
        let state = self.state.read().await;
        Ok(state
            .files
            .iter()
            .filter(|f| f.resource_id == short_id)
            .cloned()
            .collect())
    }

    async fn add_file(&self, file: ResourceFile) -> Result<ResourceFile> {
        let mut state = self.state.write().await;
        if !state.resources.contains_key(&file.resource_id) {
            return Err(AppError::ResourceNotFound {
                id: file.resource_id.clone(),
            });
        }
        state.files.push(file.clone());
        Ok(file)
    }

    async fn delete_file(&self, file_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.files.len();
        state.files.retain(|f| f.id != file_id);
        Ok(state.files.len() < before)
    }

    async fn list_elements(&self, short_id: &str) -> Result<Vec<MetadataElement>> {
        let state = self.state.read().await;
        Ok(state
            .elements
            .iter()
            .filter(|e| e.resource_id == short_id)
            .cloned()
            .collect())
    }

    async fn create_element(&self, short_id: &str, input: ElementInput) -> Result<MetadataElement> {
        let mut state = self.state.write().await;
        if !state.resources.contains_key(short_id) {
            return Err(AppError::ResourceNotFound {
                id: short_id.to_string(),
            });
        }
        let element = input.into_model(short_id);
        state.elements.push(element.clone());
        Ok(element)
    }

    async fn delete_element(&self, element_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.elements.len();
        state.elements.retain(|e| e.id != element_id);
        Ok(state.elements.len() < before)
    }

    async fn commit_publication(
        &self,
        resource: &Resource,
        elements: Vec<ElementInput>,
    ) -> Result<Resource> {
        // one guard for flags and elements
        let mut state = self.state.write().await;
        let slot = state
            .resources
            .get_mut(&resource.short_id)
            .ok_or_else(|| AppError::ResourceNotFound {
                id: resource.short_id.clone(),
            })?;
        *slot = resource.clone();

        for input in elements {
            state.elements.push(input.into_model(&resource.short_id));
        }

        Ok(resource.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_resource(title: &str) -> NewResource {
        NewResource {
            title: title.to_string(),
            owner: "alice".to_string(),
            resource_type: "GenericResource".to_string(),
        }
    }

    #[tokio::test]
    async fn test_created_resource_is_private_draft() {
        let store = MemoryStore::new();
        let resource = store.create_resource(new_resource("Streamflow")).await.unwrap();

        assert_eq!(resource.publication_state(), PublicationState::Draft);
        assert!(!resource.public && !resource.discoverable && !resource.immutable);
        assert_eq!(resource.short_id.len(), 32);

        let found = store.get_resource(&resource.short_id).await.unwrap();
        assert_eq!(found, resource);
    }

    #[tokio::test]
    async fn test_get_missing_resource_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get_resource("nope").await.unwrap_err();
        assert!(matches!(err, AppError::ResourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_purge_removes_files_and_elements() {
        let store = MemoryStore::new();
        let resource = store.create_resource(new_resource("Soil")).await.unwrap();
        store
            .create_element(&resource.short_id, ElementInput::new(ElementTerm::Subject).with_value("soil"))
            .await
            .unwrap();

        assert!(store.purge_resource(&resource.short_id).await.unwrap());
        assert!(store.list_elements(&resource.short_id).await.unwrap().is_empty());
        assert_eq!(store.resource_count().await, 0);
        assert!(!store.purge_resource(&resource.short_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_chain_head_promotes_predecessor() {
        let store = MemoryStore::new();
        let mut older = store.create_resource(new_resource("v1")).await.unwrap();
        let newer = store.create_resource(new_resource("v2")).await.unwrap();
        older.immutable = true;
        store.save_resource(&older).await.unwrap();
        store
            .create_element(&older.short_id, ElementInput::relation(IS_REPLACED_BY, "v2"))
            .await
            .unwrap();
        store
            .create_element(&newer.short_id, ElementInput::relation(IS_VERSION_OF, "v1"))
            .await
            .unwrap();

        assert!(store
            .purge_chain_head(&newer.short_id, Some(&older.short_id))
            .await
            .unwrap());

        assert!(store.find_resource(&newer.short_id).await.unwrap().is_none());
        assert!(store.list_elements(&newer.short_id).await.unwrap().is_empty());
        assert!(store.list_elements(&older.short_id).await.unwrap().is_empty());
        assert!(!store.get_resource(&older.short_id).await.unwrap().immutable);

        // Nothing left to promote
        assert!(!store
            .purge_chain_head("gone", Some(&older.short_id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_lookup_by_identifier() {
        let store = MemoryStore::new();
        let mut resource = store.create_resource(new_resource("Rain")).await.unwrap();
        resource.doi = Some("10.1234/abcd".to_string());
        store.save_resource(&resource).await.unwrap();

        let found = store.find_resource_by_doi("10.1234/abcd").await.unwrap();
        assert_eq!(found.map(|r| r.short_id), Some(resource.short_id));
        assert!(store.find_resource_by_minid("ark:/1").await.unwrap().is_none());
    }
}
