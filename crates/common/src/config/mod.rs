//! Configuration management for DataForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Public site configuration
    #[serde(default)]
    pub site: SiteConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Storage backend configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Minimal identifier (MINID) registration service
    #[serde(default)]
    pub minid: MinidConfig,

    /// DOI naming authority
    #[serde(default)]
    pub doi: DoiConfig,

    /// FairShake assessment registry
    #[serde(default)]
    pub fairshake: FairshakeConfig,

    /// Publication pipeline settings
    #[serde(default)]
    pub publication: PublicationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Public base URL, without trailing slash
    #[serde(default = "default_site_url")]
    pub url: String,

    /// Directory under which per-run scratch directories are created
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory of the local storage backend
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Collection (relative to the root) holding resource bags
    #[serde(default = "default_bag_collection")]
    pub bag_collection: String,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct MinidConfig {
    /// Registration server base URL
    #[serde(default = "default_minid_server")]
    pub server: String,

    /// Contact email registered with the identifier
    #[serde(default)]
    pub email: String,

    /// Authorization code issued to the contact
    #[serde(default)]
    pub code: String,

    /// Register against the service's test namespace
    #[serde(default = "default_enabled")]
    pub test: bool,

    /// Landing page prefix for minted identifiers
    #[serde(default = "default_minid_landing_prefix")]
    pub landing_prefix: String,

    /// Resolver prefix for minted identifiers
    #[serde(default = "default_minid_resolver_prefix")]
    pub resolver_prefix: String,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct DoiConfig {
    /// Naming-authority endpoint accepting the registration PUT
    #[serde(default = "default_doi_put_url")]
    pub put_url: String,

    /// OAuth bearer token
    #[serde(default)]
    pub oauth_token: String,

    /// `@id` of the authoring organization
    #[serde(default = "default_doi_author_id")]
    pub author_id: String,

    /// Name of the authoring organization
    #[serde(default = "default_doi_author_name")]
    pub author_name: String,

    /// Publisher organization name
    #[serde(default = "default_publisher_name")]
    pub publisher_name: String,

    /// Publisher organization URL
    #[serde(default = "default_doi_publisher_url")]
    pub publisher_url: String,

    /// Resolver prefix recorded in the Identifier metadata element
    #[serde(default = "default_doi_resolver_prefix")]
    pub resolver_prefix: String,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct FairshakeConfig {
    /// API base URL, without trailing slash
    #[serde(default = "default_fairshake_url")]
    pub url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Tag string attached to every registration
    #[serde(default = "default_fairshake_tags")]
    pub tags: String,

    /// Project associations
    #[serde(default = "default_fairshake_projects")]
    pub projects: Vec<i64>,

    /// Rubric associations
    #[serde(default = "default_fairshake_rubrics")]
    pub rubrics: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublicationConfig {
    /// Resource types that may be formally published
    #[serde(default = "default_publishable_types")]
    pub allowed_resource_types: Vec<String>,

    /// Name recorded in the Publisher metadata element
    #[serde(default = "default_publisher_name")]
    pub publisher_name: String,

    /// URL recorded in the Publisher metadata element
    #[serde(default = "default_publisher_url")]
    pub publisher_url: String,

    /// Timeout applied to outbound HTTP clients; transport default when unset
    pub http_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_site_url() -> String { "https://www.commonsshare.org".to_string() }
fn default_temp_dir() -> PathBuf { std::env::temp_dir() }
fn default_database_url() -> String { "postgres://localhost/dataforge".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_storage_root() -> PathBuf { PathBuf::from("/var/lib/dataforge/storage") }
fn default_bag_collection() -> String { "bags".to_string() }
fn default_minid_server() -> String { "https://minid.bd2k.org".to_string() }
fn default_minid_landing_prefix() -> String { "http://minid.bd2k.org/minid/landingpage/".to_string() }
fn default_minid_resolver_prefix() -> String { "http://n2t.net/".to_string() }
fn default_doi_put_url() -> String { "https://ors.datacite.org/doi".to_string() }
fn default_doi_author_id() -> String { "doi:/10.25491/5e92-ht74".to_string() }
fn default_doi_author_name() -> String {
    "Renaissance Computing Institute (RENCI) at the University of North Carolina at Chapel Hill"
        .to_string()
}
fn default_doi_publisher_url() -> String { "www.commonsshare.org".to_string() }
fn default_doi_resolver_prefix() -> String { "https://ors.datacite.org/".to_string() }
fn default_fairshake_url() -> String { "https://fairshake.cloud".to_string() }
fn default_fairshake_tags() -> String { "dcppc".to_string() }
fn default_fairshake_projects() -> Vec<i64> { vec![14] }
fn default_fairshake_rubrics() -> Vec<i64> { vec![11] }
fn default_publishable_types() -> Vec<String> {
    vec![
        "GenericResource".to_string(),
        "CompositeResource".to_string(),
        "RasterResource".to_string(),
        "ModelInstanceResource".to_string(),
    ]
}
fn default_publisher_name() -> String { "CommonsShare".to_string() }
fn default_publisher_url() -> String { "https://www.commonsshare.org".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "dataforge".to_string() }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__DOI__OAUTH_TOKEN=...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("publication.allowed_resource_types")
                    .with_list_parse_key("fairshake.projects")
                    .with_list_parse_key("fairshake.rubrics")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Outbound HTTP timeout, if one is configured
    pub fn http_timeout(&self) -> Option<Duration> {
        self.publication.http_timeout_secs.map(Duration::from_secs)
    }
}

impl StorageConfig {
    /// Backend path of the bag of `short_id`
    pub fn bag_path(&self, short_id: &str) -> String {
        format!("{}/{}.tar.gz", self.bag_collection.trim_matches('/'), short_id)
    }
}

impl SiteConfig {
    /// Landing page of a resource
    pub fn landing_url(&self, short_id: &str) -> String {
        format!("{}/resource/{}", self.url, short_id)
    }

    /// Download URL of a path inside the storage backend
    pub fn download_url(&self, storage_path: &str) -> String {
        format!("{}/download/{}", self.url, storage_path.trim_start_matches('/'))
    }

    /// Data-object-service URL of a resource
    pub fn data_object_url(&self, short_id: &str) -> String {
        format!("{}/dosapi/dataobjects/{}/", self.url, short_id)
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: default_site_url(),
            temp_dir: default_temp_dir(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            bag_collection: default_bag_collection(),
        }
    }
}

impl Default for MinidConfig {
    fn default() -> Self {
        Self {
            server: default_minid_server(),
            email: String::new(),
            code: String::new(),
            test: default_enabled(),
            landing_prefix: default_minid_landing_prefix(),
            resolver_prefix: default_minid_resolver_prefix(),
        }
    }
}

impl Default for DoiConfig {
    fn default() -> Self {
        Self {
            put_url: default_doi_put_url(),
            oauth_token: String::new(),
            author_id: default_doi_author_id(),
            author_name: default_doi_author_name(),
            publisher_name: default_publisher_name(),
            publisher_url: default_doi_publisher_url(),
            resolver_prefix: default_doi_resolver_prefix(),
        }
    }
}

impl Default for FairshakeConfig {
    fn default() -> Self {
        Self {
            url: default_fairshake_url(),
            username: String::new(),
            password: String::new(),
            tags: default_fairshake_tags(),
            projects: default_fairshake_projects(),
            rubrics: default_fairshake_rubrics(),
        }
    }
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            allowed_resource_types: default_publishable_types(),
            publisher_name: default_publisher_name(),
            publisher_url: default_publisher_url(),
            http_timeout_secs: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            minid: MinidConfig::default(),
            doi: DoiConfig::default(),
            fairshake: FairshakeConfig::default(),
            publication: PublicationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

// Credentials stay out of log output.
impl fmt::Debug for MinidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinidConfig")
            .field("server", &self.server)
            .field("email", &self.email)
            .field("code", &"[REDACTED]")
            .field("test", &self.test)
            .finish()
    }
}

impl fmt::Debug for DoiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoiConfig")
            .field("put_url", &self.put_url)
            .field("oauth_token", &"[REDACTED]")
            .field("publisher_name", &self.publisher_name)
            .finish()
    }
}

impl fmt::Debug for FairshakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FairshakeConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("projects", &self.projects)
            .field("rubrics", &self.rubrics)
            .finish()
    }
}
