//! DOI registration against a schema.org-speaking naming authority

use super::{IdentifierMinter, MintRequest, MintedIdentifier, PublishType};
use crate::errors::{PublishError, PublishResult};
use async_trait::async_trait;
use chrono::Datelike;
use dataforge_common::config::DoiConfig;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

pub struct DoiClient {
    client: reqwest::Client,
    config: DoiConfig,
}

#[derive(Debug, Serialize)]
pub struct Organization {
    #[serde(rename = "@type")]
    pub kind: &'static str,
    #[serde(rename = "@id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PropertyValue {
    #[serde(rename = "@type")]
    pub kind: &'static str,
    #[serde(rename = "propertyID")]
    pub property_id: &'static str,
}

/// Dataset description submitted with the registration PUT
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetPayload {
    #[serde(rename = "@context")]
    pub context: &'static str,
    #[serde(rename = "@type")]
    pub kind: &'static str,
    pub author: Vec<Organization>,
    pub publisher: Vec<Organization>,
    pub date_published: String,
    pub url: String,
    pub name: String,
    /// Checksum property; the digest itself is not submitted
    pub identifier: Vec<PropertyValue>,
    pub file_format: String,
    pub content_size: String,
    pub content_url: Vec<String>,
}

#[derive(Deserialize)]
struct DoiResponse {
    #[serde(rename = "@id")]
    id: String,
}

impl DoiClient {
    pub fn new(client: reqwest::Client, config: DoiConfig) -> Self {
        Self { client, config }
    }

    pub fn payload(&self, request: &MintRequest, year: i32) -> DatasetPayload {
        DatasetPayload {
            context: "https://schema.org",
            kind: "Dataset",
            author: vec![Organization {
                kind: "Organization",
                id: Some(self.config.author_id.clone()),
                name: self.config.author_name.clone(),
                url: None,
            }],
            publisher: vec![Organization {
                kind: "Organization",
                id: None,
                name: self.config.publisher_name.clone(),
                url: Some(self.config.publisher_url.clone()),
            }],
            date_published: year.to_string(),
            url: request.landing_url.clone(),
            name: format!("DOI for {}", request.title),
            identifier: vec![PropertyValue {
                kind: "PropertyValue",
                property_id: "sha256",
            }],
            file_format: request.content_type.clone(),
            content_size: request.size.to_string(),
            content_url: vec![request.download_url.clone(), request.data_object_url.clone()],
        }
    }

    fn fail(&self, message: impl Into<String>) -> PublishError {
        PublishError::mint(PublishType::Doi.as_str(), message)
    }
}

#[async_trait]
impl IdentifierMinter for DoiClient {
    fn scheme(&self) -> PublishType {
        PublishType::Doi
    }

    #[instrument(skip(self, request), fields(url = %request.landing_url))]
    async fn mint(&self, request: &MintRequest) -> PublishResult<MintedIdentifier> {
        let payload = self.payload(request, chrono::Utc::now().year());

        let response = self
            .client
            .put(&self.config.put_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.oauth_token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.fail(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Error retrieving DOI from naming authority");
            return Err(self.fail(format!("naming authority returned {}", status)));
        }

        let result: DoiResponse = response
            .json()
            .await
            .map_err(|e| self.fail(format!("Failed to parse response: {}", e)))?;

        info!(doi = %result.id, "DOI registered");

        Ok(MintedIdentifier {
            scheme: PublishType::Doi,
            element_url: format!("{}{}", self.config.resolver_prefix, result.id),
            value: result.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let client = DoiClient::new(reqwest::Client::new(), DoiConfig::default());
        let request = MintRequest {
            title: "Soil moisture".to_string(),
            checksum: "ab".repeat(32),
            size: 2048,
            content_type: "application/gzip".to_string(),
            landing_url: "https://data.example.org/resource/r1".to_string(),
            download_url: "https://data.example.org/download/bags/r1.tar.gz".to_string(),
            data_object_url: "https://data.example.org/dosapi/dataobjects/r1/".to_string(),
        };

        let json = serde_json::to_value(client.payload(&request, 2019)).unwrap();

        assert_eq!(json["@context"], "https://schema.org");
        assert_eq!(json["@type"], "Dataset");
        assert_eq!(json["author"][0]["@id"], "doi:/10.25491/5e92-ht74");
        assert_eq!(json["publisher"][0]["name"], "CommonsShare");
        assert!(json["publisher"][0].get("@id").is_none());
        assert_eq!(json["datePublished"], "2019");
        assert_eq!(json["name"], "DOI for Soil moisture");
        assert_eq!(json["identifier"][0]["propertyID"], "sha256");
        assert!(json["identifier"][0].get("value").is_none());
        assert_eq!(json["fileFormat"], "application/gzip");
        assert_eq!(json["contentSize"], "2048");
        assert_eq!(json["contentUrl"][1], "https://data.example.org/dosapi/dataobjects/r1/");
    }
}
