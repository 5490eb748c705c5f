//! Persistent identifier minting
//!
//! Two schemes share one contract:
//! - MINID: a content-addressed minimal identifier registered with a
//!   resolver service
//! - DOI: issued by a naming authority for a structured dataset description

mod doi;
mod minid;

pub use doi::DoiClient;
pub use minid::MinidClient;

use crate::errors::{PublishError, PublishResult};
use async_trait::async_trait;
use dataforge_common::db::models::{ElementInput, ElementTerm, Resource};
use dataforge_common::errors::AppError;
use dataforge_common::AppConfig;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Identifier scheme requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishType {
    Minid,
    Doi,
}

impl PublishType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishType::Minid => "minid",
            PublishType::Doi => "doi",
        }
    }
}

impl fmt::Display for PublishType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minid" => Ok(PublishType::Minid),
            "doi" => Ok(PublishType::Doi),
            other => Err(AppError::Configuration {
                message: format!("unknown publish type: {}", other),
            }),
        }
    }
}

/// What an identifier is minted for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    pub title: String,
    /// Hex SHA-256 of the published content
    pub checksum: String,
    pub size: u64,
    pub content_type: String,
    pub landing_url: String,
    pub download_url: String,
    pub data_object_url: String,
}

impl MintRequest {
    /// Resolvable locations in registration order
    pub fn locations(&self) -> Vec<String> {
        vec![self.landing_url.clone(), self.download_url.clone()]
    }
}

/// Freshly minted identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedIdentifier {
    pub scheme: PublishType,
    pub value: String,
    /// URL recorded in the Identifier metadata element
    pub element_url: String,
}

impl MintedIdentifier {
    /// Bind the identifier to `resource`, clearing the other scheme
    pub fn apply(&self, resource: &mut Resource) {
        match self.scheme {
            PublishType::Doi => {
                resource.doi = Some(self.value.clone());
                resource.minid = None;
            }
            PublishType::Minid => {
                resource.minid = Some(self.value.clone());
                resource.doi = None;
            }
        }
    }

    pub fn metadata_element(&self) -> ElementInput {
        ElementInput::new(ElementTerm::Identifier)
            .with_name(self.scheme.as_str())
            .with_url(self.element_url.clone())
    }
}

#[async_trait]
pub trait IdentifierMinter: Send + Sync {
    fn scheme(&self) -> PublishType;

    async fn mint(&self, request: &MintRequest) -> PublishResult<MintedIdentifier>;
}

/// Minters keyed by scheme
#[derive(Clone, Default)]
pub struct MinterRegistry {
    minters: HashMap<PublishType, Arc<dyn IdentifierMinter>>,
}

impl MinterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the MINID and DOI clients built from configuration
    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Self {
        Self::new()
            .with(Arc::new(MinidClient::new(client.clone(), config.minid.clone())))
            .with(Arc::new(DoiClient::new(client, config.doi.clone())))
    }

    pub fn with(mut self, minter: Arc<dyn IdentifierMinter>) -> Self {
        self.minters.insert(minter.scheme(), minter);
        self
    }

    pub fn get(&self, scheme: PublishType) -> PublishResult<Arc<dyn IdentifierMinter>> {
        self.minters.get(&scheme).cloned().ok_or_else(|| {
            PublishError::App(AppError::Configuration {
                message: format!("no minter registered for {}", scheme),
            })
        })
    }
}

/// Mock minter for testing
pub struct MockMinter {
    scheme: PublishType,
    value: String,
    fail: bool,
    calls: AtomicUsize,
    last_request: Mutex<Option<MintRequest>>,
}

impl MockMinter {
    pub fn new(scheme: PublishType, value: &str) -> Self {
        Self {
            scheme,
            value: value.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Minter whose every call fails like a non-200 authority response
    pub fn failing(scheme: PublishType) -> Self {
        Self {
            fail: true,
            ..Self::new(scheme, "")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<MintRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl IdentifierMinter for MockMinter {
    fn scheme(&self) -> PublishType {
        self.scheme
    }

    async fn mint(&self, request: &MintRequest) -> PublishResult<MintedIdentifier> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        if self.fail {
            return Err(PublishError::mint(self.scheme.as_str(), "HTTP 500: registry unavailable"));
        }

        Ok(MintedIdentifier {
            scheme: self.scheme,
            value: self.value.clone(),
            element_url: format!("https://resolver.example.org/{}", self.value),
        })
    }
}
