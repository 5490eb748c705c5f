//! Access-control and eligibility collaborators
//!
//! Permission enforcement and metadata validation live outside the
//! publication pipeline. The pipeline consumes them through two traits:
//! - [`AccessControl`] answers ownership, view and copy questions
//! - [`PublicationPolicy`] decides publishability and public visibility

use crate::config::PublicationConfig;
use crate::db::models::{ElementTerm, MetadataElement, Resource, ResourceFile};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Everything the policy needs to judge a resource
#[derive(Debug, Clone, Copy)]
pub struct ResourceSnapshot<'a> {
    pub resource: &'a Resource,
    pub files: &'a [ResourceFile],
    pub elements: &'a [MetadataElement],
}

impl<'a> ResourceSnapshot<'a> {
    pub fn new(
        resource: &'a Resource,
        files: &'a [ResourceFile],
        elements: &'a [MetadataElement],
    ) -> Self {
        Self {
            resource,
            files,
            elements,
        }
    }

    fn has_term(&self, term: ElementTerm) -> bool {
        self.elements.iter().any(|e| {
            e.element_term() == term && e.value.as_deref().is_some_and(|v| !v.trim().is_empty())
        })
    }
}

/// Privilege checks consumed by publication and lineage operations
#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn owns_resource(&self, username: &str, resource: &Resource) -> Result<bool>;

    async fn can_view_resource(&self, username: &str, resource: &Resource) -> Result<bool>;

    /// License check for derived copies
    async fn can_copy_resource(
        &self,
        username: &str,
        resource: &Resource,
        elements: &[MetadataElement],
    ) -> Result<bool>;
}

/// Access control derived from resource ownership and explicit view grants
///
/// Public resources are viewable by anyone. Copying is allowed to the owner,
/// and to viewers unless the rights statement reserves all rights.
#[derive(Debug, Clone, Default)]
pub struct OwnershipAccess {
    viewers: HashMap<String, HashSet<String>>,
}

impl OwnershipAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `username` view access to `short_id`
    pub fn with_viewer(mut self, short_id: &str, username: &str) -> Self {
        self.viewers
            .entry(short_id.to_string())
            .or_default()
            .insert(username.to_string());
        self
    }
}

#[async_trait]
impl AccessControl for OwnershipAccess {
    async fn owns_resource(&self, username: &str, resource: &Resource) -> Result<bool> {
        Ok(resource.is_owned_by(username))
    }

    async fn can_view_resource(&self, username: &str, resource: &Resource) -> Result<bool> {
        let granted = self
            .viewers
            .get(&resource.short_id)
            .is_some_and(|users| users.contains(username));
        Ok(resource.public || resource.is_owned_by(username) || granted)
    }

    async fn can_copy_resource(
        &self,
        username: &str,
        resource: &Resource,
        elements: &[MetadataElement],
    ) -> Result<bool> {
        if resource.is_owned_by(username) {
            return Ok(true);
        }
        let reserved = elements.iter().any(|e| {
            e.element_term() == ElementTerm::Rights
                && e.value
                    .as_deref()
                    .is_some_and(|v| v.to_ascii_lowercase().contains("all rights reserved"))
        });
        Ok(!reserved)
    }
}

/// Eligibility predicates defined by the metadata layer
pub trait PublicationPolicy: Send + Sync {
    /// Why the resource cannot be published, or `None` when it can
    fn publication_blocker(&self, snapshot: &ResourceSnapshot<'_>) -> Option<String>;

    fn can_be_public_or_discoverable(&self, snapshot: &ResourceSnapshot<'_>) -> bool;

    fn can_be_published(&self, snapshot: &ResourceSnapshot<'_>) -> bool {
        self.publication_blocker(snapshot).is_none()
    }
}

/// Requires a title, an abstract, at least one keyword and some content
#[derive(Debug, Clone)]
pub struct MetadataPolicy {
    allowed_resource_types: Vec<String>,
}

impl MetadataPolicy {
    pub fn new(allowed_resource_types: Vec<String>) -> Self {
        Self {
            allowed_resource_types,
        }
    }

    pub fn from_config(config: &PublicationConfig) -> Self {
        Self::new(config.allowed_resource_types.clone())
    }

    fn missing_requirement(snapshot: &ResourceSnapshot<'_>) -> Option<&'static str> {
        if snapshot.resource.title.trim().is_empty() {
            Some("title is empty")
        } else if !snapshot.has_term(ElementTerm::Description) {
            Some("abstract is missing")
        } else if !snapshot.has_term(ElementTerm::Subject) {
            Some("no keywords")
        } else if snapshot.files.is_empty() {
            Some("resource has no content files")
        } else {
            None
        }
    }
}

impl Default for MetadataPolicy {
    fn default() -> Self {
        Self::from_config(&PublicationConfig::default())
    }
}

impl PublicationPolicy for MetadataPolicy {
    fn publication_blocker(&self, snapshot: &ResourceSnapshot<'_>) -> Option<String> {
        let resource = snapshot.resource;
        if resource.published {
            return Some("resource is already published".to_string());
        }
        if !self
            .allowed_resource_types
            .iter()
            .any(|t| t == &resource.resource_type)
        {
            return Some(format!(
                "resource type {} cannot be published",
                resource.resource_type
            ));
        }
        Self::missing_requirement(snapshot).map(str::to_string)
    }

    fn can_be_public_or_discoverable(&self, snapshot: &ResourceSnapshot<'_>) -> bool {
        Self::missing_requirement(snapshot).is_none()
    }
}
