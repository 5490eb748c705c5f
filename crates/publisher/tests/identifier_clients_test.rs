//! HTTP contract tests for the MINID and DOI clients.
//!
//! Each test stands up a wiremock server in place of the identifier
//! service and checks the request shape and the status handling.

use dataforge_common::config::{DoiConfig, MinidConfig};
use dataforge_publisher::minter::{DoiClient, IdentifierMinter, MintRequest, MinidClient};
use dataforge_publisher::{PublishError, PublishType};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> MintRequest {
    MintRequest {
        title: "Soil moisture".to_string(),
        checksum: "ab".repeat(32),
        size: 4096,
        content_type: "application/gzip".to_string(),
        landing_url: "https://data.example.org/resource/r1".to_string(),
        download_url: "https://data.example.org/download/bags/r1.tar.gz".to_string(),
        data_object_url: "https://data.example.org/dosapi/dataobjects/r1/".to_string(),
    }
}

fn doi_client(server: &MockServer) -> DoiClient {
    let config = DoiConfig {
        put_url: format!("{}/doi", server.uri()),
        oauth_token: "secret-token".to_string(),
        resolver_prefix: "https://doi.org/".to_string(),
        ..DoiConfig::default()
    };
    DoiClient::new(reqwest::Client::new(), config)
}

fn minid_client(server: &MockServer) -> MinidClient {
    let config = MinidConfig {
        server: server.uri(),
        email: "curator@example.org".to_string(),
        code: "abc-123".to_string(),
        landing_prefix: "https://minid.example.org/landing/".to_string(),
        resolver_prefix: "https://n2t.net/".to_string(),
        ..MinidConfig::default()
    };
    MinidClient::new(reqwest::Client::new(), config)
}

#[tokio::test]
async fn doi_mint_puts_dataset_with_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/doi"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_partial_json(json!({
            "@type": "Dataset",
            "name": "DOI for Soil moisture",
            "fileFormat": "application/gzip",
            "contentSize": "4096",
            "url": "https://data.example.org/resource/r1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"@id": "10.25491/xyz-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let minted = doi_client(&server).mint(&request()).await.unwrap();

    assert_eq!(minted.scheme, PublishType::Doi);
    assert_eq!(minted.value, "10.25491/xyz-1");
    assert_eq!(minted.element_url, "https://doi.org/10.25491/xyz-1");
}

#[tokio::test]
async fn doi_mint_non_200_is_mint_error() {
    let server = MockServer::start().await;

    // 201 is still a failure for the naming authority
    for status in [500u16, 201] {
        server.reset().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = doi_client(&server).mint(&request()).await.unwrap_err();
        assert!(
            matches!(err, PublishError::IdentifierMint { ref scheme, .. } if scheme == "doi"),
            "status {} should fail the mint",
            status
        );
    }
}

#[tokio::test]
async fn minid_mint_registers_checksum_and_locations() {
    let server = MockServer::start().await;
    let req = request();

    Mock::given(method("POST"))
        .and(path("/minid"))
        .and(body_partial_json(json!({
            "checksum": req.checksum,
            "checksum_function": "sha256",
            "email": "curator@example.org",
            "code": "abc-123",
            "title": "MINID for Soil moisture",
            "locations": [req.landing_url, req.download_url]
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"identifier": "ark:/57799/b9xyz"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let minted = minid_client(&server).mint(&req).await.unwrap();

    assert_eq!(minted.scheme, PublishType::Minid);
    assert_eq!(minted.value, "ark:/57799/b9xyz");
    assert_eq!(
        minted.element_url,
        "https://minid.example.org/landing/ark:/57799/b9xyz, https://n2t.net/ark:/57799/b9xyz"
    );
}

#[tokio::test]
async fn minid_mint_service_failure_is_mint_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = minid_client(&server).mint(&request()).await.unwrap_err();
    assert!(matches!(err, PublishError::IdentifierMint { ref scheme, .. } if scheme == "minid"));
    assert_eq!(err.kind(), "identifier_mint");
}

#[tokio::test]
async fn unreachable_registry_is_mint_error() {
    let config = MinidConfig {
        server: "http://127.0.0.1:1".to_string(),
        ..MinidConfig::default()
    };
    let client = MinidClient::new(reqwest::Client::new(), config);

    let err = client.mint(&request()).await.unwrap_err();
    assert!(matches!(err, PublishError::IdentifierMint { .. }));
}
