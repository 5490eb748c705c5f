//! Third-party assessment registry
//!
//! Published resources are registered as digital objects with FairShake.
//! Registration is two sequential calls with no combined retry:
//! 1. `POST /auth/login/` exchanges service credentials for an API key (200)
//! 2. `POST /digital_object/` registers the resource with that key (201)

use crate::errors::{PublishError, PublishResult};
use async_trait::async_trait;
use dataforge_common::config::FairshakeConfig;
use dataforge_common::metrics::record_registration_failure;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info, instrument};

/// What is registered for a published resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub title: String,
    pub url: String,
}

#[async_trait]
pub trait AssessmentRegistrar: Send + Sync {
    /// Register the resource and return the assessment object id
    async fn register(&self, registration: &Registration) -> PublishResult<i64>;
}

pub struct FairshakeRegistrar {
    client: reqwest::Client,
    config: FairshakeConfig,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    key: String,
}

#[derive(Serialize)]
struct DigitalObjectRequest<'a> {
    title: &'a str,
    tags: &'a str,
    url: &'a str,
    projects: &'a [i64],
    rubrics: &'a [i64],
}

#[derive(Deserialize)]
struct DigitalObjectResponse {
    id: i64,
}

impl FairshakeRegistrar {
    pub fn new(client: reqwest::Client, config: FairshakeConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn fail(stage: &str, message: impl Into<String>) -> PublishError {
        record_registration_failure(stage);
        PublishError::registration(stage, message)
    }

    /// Exchange service credentials for an API key
    #[instrument(skip(self))]
    pub async fn login(&self) -> PublishResult<String> {
        let response = self
            .client
            .post(self.endpoint("/auth/login/"))
            .header("Content-Type", "application/json")
            .json(&LoginRequest {
                username: &self.config.username,
                password: &self.config.password,
            })
            .send()
            .await
            .map_err(|e| Self::fail("auth", format!("Request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Error retrieving API key from FairShake");
            return Err(Self::fail("auth", format!("HTTP {}: {}", status, text)));
        }

        let result: LoginResponse = response
            .json()
            .await
            .map_err(|e| Self::fail("auth", format!("Failed to parse response: {}", e)))?;
        Ok(result.key)
    }

    /// Register a digital object using `key`
    #[instrument(skip(self, key, registration), fields(url = %registration.url))]
    pub async fn submit(&self, key: &str, registration: &Registration) -> PublishResult<i64> {
        let response = self
            .client
            .post(self.endpoint("/digital_object/"))
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Token {}", key))
            .json(&DigitalObjectRequest {
                title: &registration.title,
                tags: &self.config.tags,
                url: &registration.url,
                projects: &self.config.projects,
                rubrics: &self.config.rubrics,
            })
            .send()
            .await
            .map_err(|e| Self::fail("register", format!("Request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Error registering resource with FairShake");
            return Err(Self::fail("register", format!("HTTP {}: {}", status, text)));
        }

        let result: DigitalObjectResponse = response
            .json()
            .await
            .map_err(|e| Self::fail("register", format!("Failed to parse response: {}", e)))?;

        info!(assessment_id = result.id, "Created FairShake object");
        Ok(result.id)
    }
}

#[async_trait]
impl AssessmentRegistrar for FairshakeRegistrar {
    async fn register(&self, registration: &Registration) -> PublishResult<i64> {
        let key = self.login().await?;
        self.submit(&key, registration).await
    }
}

/// Mock registrar for testing
pub struct MockRegistrar {
    id: i64,
    failing_stage: Option<&'static str>,
    calls: AtomicUsize,
}

impl MockRegistrar {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            failing_stage: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Registrar failing at `stage` ("auth" or "register")
    pub fn failing(stage: &'static str) -> Self {
        Self {
            failing_stage: Some(stage),
            ..Self::new(0)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssessmentRegistrar for MockRegistrar {
    async fn register(&self, _registration: &Registration) -> PublishResult<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failing_stage {
            Some(stage) => Err(PublishError::registration(stage, "HTTP 503")),
            None => Ok(self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = FairshakeConfig {
            url: "https://fairshake.example.org/".to_string(),
            ..FairshakeConfig::default()
        };
        let registrar = FairshakeRegistrar::new(reqwest::Client::new(), config);
        assert_eq!(
            registrar.endpoint("/auth/login/"),
            "https://fairshake.example.org/auth/login/"
        );
    }

    #[tokio::test]
    async fn test_mock_registrar_failure_stage() {
        let registrar = MockRegistrar::failing("auth");
        let registration = Registration {
            title: "t".into(),
            url: "u".into(),
        };
        let err = registrar.register(&registration).await.unwrap_err();
        assert!(matches!(err, PublishError::Registration { ref stage, .. } if stage == "auth"));
        assert_eq!(registrar.calls(), 1);
    }
}
