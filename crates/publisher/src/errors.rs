//! Publication pipeline error types

use dataforge_common::errors::AppError;
use dataforge_common::storage::StorageError;
use thiserror::Error;

pub type PublishResult<T> = std::result::Result<T, PublishError>;

#[derive(Error, Debug)]
pub enum PublishError {
    /// Precondition failed before any side effect
    #[error("Resource {resource_id} cannot be published: {reason}")]
    Ineligible { resource_id: String, reason: String },

    #[error("Storage integrity error for resource {resource_id}: {message}")]
    StorageIntegrity { resource_id: String, message: String },

    #[error("Unable to mint a {scheme} identifier: {message}")]
    IdentifierMint { scheme: String, message: String },

    #[error("Assessment registration failed during {stage}: {message}")]
    Registration { stage: String, message: String },

    #[error("Lineage violation on resource {resource_id}: {message}")]
    ChainIntegrity { resource_id: String, message: String },

    #[error("User {username} is not permitted to {action} resource {resource_id}")]
    PermissionDenied {
        username: String,
        action: String,
        resource_id: String,
    },

    #[error("Resource {resource_id} is immutable")]
    Immutable { resource_id: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    App(#[from] AppError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Stable kind label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Ineligible { .. } => "publication_ineligible",
            PublishError::StorageIntegrity { .. } => "storage_integrity",
            PublishError::IdentifierMint { .. } => "identifier_mint",
            PublishError::Registration { .. } => "registration",
            PublishError::ChainIntegrity { .. } => "chain_integrity",
            PublishError::PermissionDenied { .. } => "permission_denied",
            PublishError::Immutable { .. } => "immutable",
            PublishError::Storage(_) => "storage",
            PublishError::App(_) => "app",
            PublishError::Io(_) => "io",
        }
    }

    pub(crate) fn mint(scheme: impl Into<String>, message: impl Into<String>) -> Self {
        PublishError::IdentifierMint {
            scheme: scheme.into(),
            message: message.into(),
        }
    }

    pub(crate) fn registration(stage: impl Into<String>, message: impl Into<String>) -> Self {
        PublishError::Registration {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub(crate) fn denied(username: &str, action: &str, resource_id: &str) -> Self {
        PublishError::PermissionDenied {
            username: username.to_string(),
            action: action.to_string(),
            resource_id: resource_id.to_string(),
        }
    }
}
