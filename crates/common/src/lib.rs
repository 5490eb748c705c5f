//! DataForge Common Library
//!
//! Shared code for the DataForge publication services including:
//! - Resource, file and metadata models with the repository pattern
//! - Storage backend abstraction (collections, AVUs, checksums)
//! - Access-control and eligibility collaborator traits
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod access;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use access::{AccessControl, MetadataPolicy, OwnershipAccess, PublicationPolicy, ResourceSnapshot};
pub use config::AppConfig;
pub use db::{MemoryStore, Repository, ResourceStore};
pub use errors::{AppError, Result};
pub use storage::{StorageBackend, StorageError};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// AVU recording whether a resource's bag is stale
pub const BAG_MODIFIED_AVU: &str = "bag_modified";
