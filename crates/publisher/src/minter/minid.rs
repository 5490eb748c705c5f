//! Minimal identifier (MINID) registration client

use super::{IdentifierMinter, MintRequest, MintedIdentifier, PublishType};
use crate::errors::{PublishError, PublishResult};
use async_trait::async_trait;
use dataforge_common::config::MinidConfig;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

pub struct MinidClient {
    client: reqwest::Client,
    config: MinidConfig,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    checksum: &'a str,
    checksum_function: &'static str,
    email: &'a str,
    code: &'a str,
    title: String,
    locations: Vec<String>,
    test: bool,
}

#[derive(Deserialize)]
struct RegisterResponse {
    identifier: String,
}

impl MinidClient {
    pub fn new(client: reqwest::Client, config: MinidConfig) -> Self {
        Self { client, config }
    }

    fn fail(&self, message: impl Into<String>) -> PublishError {
        PublishError::mint(PublishType::Minid.as_str(), message)
    }
}

#[async_trait]
impl IdentifierMinter for MinidClient {
    fn scheme(&self) -> PublishType {
        PublishType::Minid
    }

    #[instrument(skip(self, request), fields(checksum = %request.checksum))]
    async fn mint(&self, request: &MintRequest) -> PublishResult<MintedIdentifier> {
        let url = format!("{}/minid", self.config.server.trim_end_matches('/'));
        let body = RegisterRequest {
            checksum: &request.checksum,
            checksum_function: "sha256",
            email: &self.config.email,
            code: &self.config.code,
            title: format!("MINID for {}", request.title),
            locations: request.locations(),
            test: self.config.test,
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.fail(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "MINID registration rejected");
            return Err(self.fail(format!("registry returned {}", status)));
        }

        let result: RegisterResponse = response
            .json()
            .await
            .map_err(|e| self.fail(format!("Failed to parse response: {}", e)))?;

        info!(minid = %result.identifier, "MINID registered");

        Ok(MintedIdentifier {
            scheme: PublishType::Minid,
            element_url: format!(
                "{}{}, {}{}",
                self.config.landing_prefix,
                result.identifier,
                self.config.resolver_prefix,
                result.identifier
            ),
            value: result.identifier,
        })
    }
}
