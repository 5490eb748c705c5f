//! DataForge Publisher
//!
//! Moves a mutable, privately owned resource to an immutable, citable,
//! publicly discoverable artifact:
//! 1. Builds the per-file manifest
//! 2. Packages multi-file resources into a bag
//! 3. Mints a MINID or DOI for the packaged content
//! 4. Registers the resource with the FairShake assessment registry
//! 5. Commits the published flags and publication metadata
//!
//! Also hosts the versioning/copy lineage operations, file management with
//! deletion hooks and identifier resolution.

pub mod bag;
pub mod errors;
pub mod files;
pub mod lineage;
pub mod manifest;
pub mod minter;
pub mod publish;
pub mod registrant;
pub mod resolve;

pub use errors::{PublishError, PublishResult};
pub use minter::PublishType;
pub use publish::Publisher;

use dataforge_common::{
    errors::AppError, AccessControl, AppConfig, PublicationPolicy, ResourceStore, StorageBackend,
};
use std::sync::Arc;

/// Collaborators shared by every pipeline component
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ResourceStore>,
    pub storage: Arc<dyn StorageBackend>,
    pub access: Arc<dyn AccessControl>,
    pub policy: Arc<dyn PublicationPolicy>,
    pub config: Arc<AppConfig>,
}

/// Outbound HTTP client honoring the configured timeout
pub fn http_client(config: &AppConfig) -> Result<reqwest::Client, AppError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.http_timeout() {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}
