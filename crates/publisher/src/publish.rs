//! Publication state machine
//!
//! `Draft -> Publishing -> Published`. `Publishing` only exists for the
//! duration of [`Publisher::publish`]; nothing is persisted until the final
//! commit, so any failure before it leaves the resource a draft. Identifiers
//! or registrations created by external services before such a failure are
//! not withdrawn.
//!
//! Callers serialize publish attempts per resource.

use crate::bag::{hash_file, Artifact, BagPackager, PLAIN_CONTENT_TYPE};
use crate::errors::{PublishError, PublishResult};
use crate::files::mark_bag_stale;
use crate::manifest::{self, source_path, ManifestBuilder, ManifestEntry};
use crate::minter::{MintRequest, MinterRegistry, PublishType};
use crate::registrant::{AssessmentRegistrar, FairshakeRegistrar, Registration};
use crate::{http_client, Services};
use dataforge_common::access::ResourceSnapshot;
use dataforge_common::db::models::{
    ElementInput, ElementTerm, Resource, ResourceFile, DATE_PUBLISHED,
};
use dataforge_common::metrics::{record_mint_failure, PublicationMetrics};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Name of the manifest document written into the run's scratch directory
pub const MANIFEST_FILE_NAME: &str = "resource-file-manifest.json";

pub struct Publisher {
    services: Services,
    minters: MinterRegistry,
    registrar: Arc<dyn AssessmentRegistrar>,
    manifests: ManifestBuilder,
    packager: BagPackager,
}

impl Publisher {
    pub fn new(
        services: Services,
        minters: MinterRegistry,
        registrar: Arc<dyn AssessmentRegistrar>,
    ) -> Self {
        Self {
            manifests: ManifestBuilder::new(services.clone()),
            packager: BagPackager::new(services.clone()),
            services,
            minters,
            registrar,
        }
    }

    /// Publisher wired to the configured MINID, DOI and FairShake services
    pub fn from_config(services: Services) -> PublishResult<Self> {
        let client = http_client(&services.config)?;
        let minters = MinterRegistry::from_config(&services.config, client.clone());
        let registrar = Arc::new(FairshakeRegistrar::new(
            client,
            services.config.fairshake.clone(),
        ));
        Ok(Self::new(services, minters, registrar))
    }

    /// Formally publish `short_id` under a `publish_type` identifier
    #[instrument(skip(self), fields(resource_id = %short_id, publish_type = %publish_type))]
    pub async fn publish(
        &self,
        username: &str,
        short_id: &str,
        publish_type: PublishType,
    ) -> PublishResult<Resource> {
        let metrics = PublicationMetrics::start(publish_type.as_str());
        let result = self.run(username, short_id, publish_type).await;
        match &result {
            Ok(_) => metrics.finish("published"),
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Publication failed");
                metrics.finish(e.kind());
            }
        }
        result
    }

    async fn run(
        &self,
        username: &str,
        short_id: &str,
        publish_type: PublishType,
    ) -> PublishResult<Resource> {
        let store = &self.services.store;
        let mut resource = store.get_resource(short_id).await?;

        if !self.services.access.owns_resource(username, &resource).await? {
            return Err(PublishError::denied(username, "publish", short_id));
        }

        let files = store.list_files(short_id).await?;
        let elements = store.list_elements(short_id).await?;
        let snapshot = ResourceSnapshot::new(&resource, &files, &elements);
        if let Some(reason) = self.services.policy.publication_blocker(&snapshot) {
            return Err(PublishError::Ineligible {
                resource_id: short_id.to_string(),
                reason,
            });
        }

        let minter = self.minters.get(publish_type)?;

        // Removed on every exit path when dropped.
        let scratch = tempfile::Builder::new()
            .prefix("publish-")
            .tempdir_in(&self.services.config.site.temp_dir)?;

        let entries = self.manifests.build(&resource, &files).await?;
        tokio::fs::write(
            scratch.path().join(MANIFEST_FILE_NAME),
            manifest::to_json(&entries)?,
        )
        .await?;

        let artifact = if files.len() > 1 {
            self.packager.package(&resource, scratch.path()).await?
        } else {
            self.single_file_artifact(short_id, &files, &entries, scratch.path())
                .await?
        };

        let site = &self.services.config.site;
        let request = MintRequest {
            title: resource.title.clone(),
            checksum: artifact.checksum.clone(),
            size: artifact.size,
            content_type: artifact.content_type.to_string(),
            landing_url: site.landing_url(short_id),
            download_url: artifact.download_url.clone(),
            data_object_url: site.data_object_url(short_id),
        };

        let minted = minter.mint(&request).await.map_err(|e| {
            record_mint_failure(publish_type.as_str());
            e
        })?;
        scratch.close()?;

        let assessment_id = self
            .registrar
            .register(&Registration {
                title: resource.title.clone(),
                url: request.landing_url.clone(),
            })
            .await?;

        minted.apply(&mut resource);
        resource.assessment_id = Some(assessment_id);
        resource.public = true;
        resource.discoverable = true;
        resource.immutable = true;
        resource.shareable = false;
        resource.published = true;

        let now = chrono::Utc::now();
        resource.updated_at = now.into();
        resource.last_changed_by = Some(username.to_string());

        let publication = &self.services.config.publication;
        let records = vec![
            ElementInput::new(ElementTerm::Publisher)
                .with_name(publication.publisher_name.clone())
                .with_url(publication.publisher_url.clone()),
            ElementInput::new(ElementTerm::Date)
                .with_type(DATE_PUBLISHED)
                .with_start_date(now.into()),
            minted.metadata_element(),
        ];

        let published = store.commit_publication(&resource, records).await?;

        if let Err(e) = mark_bag_stale(&self.services, short_id).await {
            warn!(error = %e, "Published, but the bag could not be marked stale");
        }

        info!(
            identifier = %minted.value,
            assessment_id,
            "Resource published"
        );
        Ok(published)
    }

    /// Describe the only file of a resource without building a bag
    async fn single_file_artifact(
        &self,
        short_id: &str,
        files: &[ResourceFile],
        entries: &[ManifestEntry],
        scratch: &Path,
    ) -> PublishResult<Artifact> {
        let (file, entry) = match (files.first(), entries.first()) {
            (Some(file), Some(entry)) => (file, entry),
            _ => {
                return Err(PublishError::Ineligible {
                    resource_id: short_id.to_string(),
                    reason: "resource has no content files".to_string(),
                })
            }
        };

        let (checksum, size) = match entry.sha256.as_ref() {
            Some(sha256) => (sha256.clone(), entry.length),
            None => {
                // Backend could not report a SHA-256; hash a local copy.
                let local = scratch.join("content");
                self.services
                    .storage
                    .get_file(&source_path(file), &local)
                    .await?;
                hash_file(local).await?
            }
        };

        Ok(Artifact {
            checksum,
            size,
            download_url: entry.url.clone(),
            content_type: PLAIN_CONTENT_TYPE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::ARCHIVE_CONTENT_TYPE;
    use crate::minter::MockMinter;
    use crate::registrant::MockRegistrar;
    use crate::testing::Fixture;
    use dataforge_common::db::models::PublicationState;
    use dataforge_common::errors::AppError;
    use dataforge_common::storage::sha256_hex;
    use dataforge_common::{ResourceStore, StorageBackend, BAG_MODIFIED_AVU};

    struct Harness {
        fx: Fixture,
        minter: Arc<MockMinter>,
        registrar: Arc<MockRegistrar>,
        publisher: Publisher,
    }

    fn harness(minter: MockMinter, registrar: MockRegistrar) -> Harness {
        let fx = Fixture::new();
        let minter = Arc::new(minter);
        let registrar = Arc::new(registrar);
        let publisher = Publisher::new(
            fx.services.clone(),
            MinterRegistry::new().with(minter.clone()),
            registrar.clone(),
        );
        Harness {
            fx,
            minter,
            registrar,
            publisher,
        }
    }

    fn publication_elements(elements: &[dataforge_common::db::models::MetadataElement]) -> usize {
        elements
            .iter()
            .filter(|e| {
                matches!(
                    e.element_term(),
                    ElementTerm::Identifier | ElementTerm::Publisher
                ) || e.element_type.as_deref() == Some(DATE_PUBLISHED)
            })
            .count()
    }

    #[tokio::test]
    async fn test_single_file_publication_skips_bag() {
        let h = harness(
            MockMinter::new(PublishType::Minid, "ark:/57799/b9j69h"),
            MockRegistrar::new(77),
        );
        let resource = h.fx.resource_with_files(&[("flow.csv", "1,2,3")]).await;

        let published = h
            .publisher
            .publish("alice", &resource.short_id, PublishType::Minid)
            .await
            .unwrap();

        let bag_path = format!("bags/{}.tar.gz", resource.short_id);
        assert_eq!(h.fx.storage.write_count(&bag_path).await, 0);
        assert!(!h.fx.storage.contains(&bag_path).await);

        let request = h.minter.last_request().unwrap();
        assert_eq!(request.checksum, sha256_hex(b"1,2,3"));
        assert_eq!(request.size, 5);
        assert_eq!(request.content_type, PLAIN_CONTENT_TYPE);
        assert!(request.download_url.ends_with("/data/contents/flow.csv"));
        assert_eq!(
            request.landing_url,
            format!("https://data.example.org/resource/{}", resource.short_id)
        );

        assert_eq!(published.minid.as_deref(), Some("ark:/57799/b9j69h"));
        assert!(published.doi.is_none());
        assert_eq!(published.assessment_id, Some(77));
        assert_eq!(published.publication_state(), PublicationState::Published);
    }

    #[tokio::test]
    async fn test_multi_file_publication_mints_from_bag() {
        let h = harness(
            MockMinter::new(PublishType::Doi, "10.25491/abcd-1234"),
            MockRegistrar::new(5),
        );
        let resource = h
            .fx
            .resource_with_files(&[("a.csv", "1"), ("b.csv", "2")])
            .await;

        h.publisher
            .publish("alice", &resource.short_id, PublishType::Doi)
            .await
            .unwrap();

        let bag_path = format!("bags/{}.tar.gz", resource.short_id);
        let bag = h.fx.storage.read(&bag_path).await.unwrap();
        let request = h.minter.last_request().unwrap();
        assert_eq!(request.checksum, sha256_hex(&bag));
        assert_eq!(request.size, bag.len() as u64);
        assert_eq!(request.content_type, ARCHIVE_CONTENT_TYPE);
        assert!(request.download_url.ends_with(&bag_path));

        // Metadata changed at commit, so the bag is stale again
        assert_eq!(
            h.fx.storage
                .get_avu(&resource.short_id, BAG_MODIFIED_AVU)
                .await
                .unwrap()
                .as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_published_flags_and_records() {
        for scheme in [PublishType::Doi, PublishType::Minid] {
            let h = harness(MockMinter::new(scheme, "id-1"), MockRegistrar::new(1));
            let resource = h.fx.resource_with_files(&[("a.txt", "a")]).await;

            h.publisher
                .publish("alice", &resource.short_id, scheme)
                .await
                .unwrap();

            let r = h.fx.reload(&resource.short_id).await;
            assert!(r.public && r.discoverable && r.immutable && r.published);
            assert!(!r.shareable);
            assert_eq!(
                [r.doi.is_some(), r.minid.is_some()].iter().filter(|s| **s).count(),
                1
            );
            assert_eq!(r.last_changed_by.as_deref(), Some("alice"));

            let elements = h.fx.store.list_elements(&resource.short_id).await.unwrap();
            assert_eq!(publication_elements(&elements), 3);
            let identifier = elements
                .iter()
                .find(|e| e.element_term() == ElementTerm::Identifier)
                .unwrap();
            assert_eq!(identifier.name.as_deref(), Some(scheme.as_str()));
            let publisher = elements
                .iter()
                .find(|e| e.element_term() == ElementTerm::Publisher)
                .unwrap();
            assert_eq!(publisher.name.as_deref(), Some("CommonsShare"));
        }
    }

    #[tokio::test]
    async fn test_mint_failure_leaves_draft() {
        let h = harness(MockMinter::failing(PublishType::Doi), MockRegistrar::new(1));
        let resource = h.fx.resource_with_files(&[("a.txt", "a")]).await;

        let err = h
            .publisher
            .publish("alice", &resource.short_id, PublishType::Doi)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::IdentifierMint { .. }));
        assert_eq!(h.registrar.calls(), 0);

        let r = h.fx.reload(&resource.short_id).await;
        assert_eq!(r, resource);
        let elements = h.fx.store.list_elements(&resource.short_id).await.unwrap();
        assert_eq!(publication_elements(&elements), 0);
    }

    #[tokio::test]
    async fn test_registration_failure_leaves_draft_after_mint() {
        let h = harness(
            MockMinter::new(PublishType::Minid, "ark:/1"),
            MockRegistrar::failing("register"),
        );
        let resource = h.fx.resource_with_files(&[("a.txt", "a")]).await;

        let err = h
            .publisher
            .publish("alice", &resource.short_id, PublishType::Minid)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "registration");
        // The minted identifier is orphaned, not recorded
        assert_eq!(h.minter.calls(), 1);
        let r = h.fx.reload(&resource.short_id).await;
        assert!(r.minid.is_none() && !r.published && !r.immutable);
    }

    #[tokio::test]
    async fn test_preconditions_have_no_side_effects() {
        let h = harness(MockMinter::new(PublishType::Doi, "x"), MockRegistrar::new(1));
        let empty = h.fx.resource_with_files(&[]).await;

        let err = h
            .publisher
            .publish("alice", &empty.short_id, PublishType::Doi)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Ineligible { .. }));

        let resource = h.fx.resource_with_files(&[("a.txt", "a")]).await;
        let err = h
            .publisher
            .publish("mallory", &resource.short_id, PublishType::Doi)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::PermissionDenied { .. }));

        let err = h
            .publisher
            .publish("alice", &resource.short_id, PublishType::Minid)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::App(AppError::Configuration { .. })));

        assert_eq!(h.minter.calls(), 0);
        assert_eq!(h.registrar.calls(), 0);
    }

    #[tokio::test]
    async fn test_published_resource_cannot_republish() {
        let h = harness(MockMinter::new(PublishType::Doi, "10.1/x"), MockRegistrar::new(1));
        let resource = h.fx.resource_with_files(&[("a.txt", "a")]).await;

        h.publisher
            .publish("alice", &resource.short_id, PublishType::Doi)
            .await
            .unwrap();
        let err = h
            .publisher
            .publish("alice", &resource.short_id, PublishType::Doi)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Ineligible { .. }));
        assert_eq!(h.minter.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_file_without_backend_sha_is_hashed_locally() {
        let h = harness(MockMinter::new(PublishType::Minid, "ark:/2"), MockRegistrar::new(1));
        let resource = h.fx.resource_with_files(&[("a.txt", "hello")]).await;
        let files = h.fx.store.list_files(&resource.short_id).await.unwrap();
        h.fx.storage.fail_checksum(&files[0].storage_path()).await;

        h.publisher
            .publish("alice", &resource.short_id, PublishType::Minid)
            .await
            .unwrap();

        let request = h.minter.last_request().unwrap();
        assert_eq!(request.checksum, sha256_hex(b"hello"));
        assert_eq!(request.size, 5);
    }

    #[tokio::test]
    async fn test_reference_only_resource_is_published_as_bag() {
        let h = harness(MockMinter::new(PublishType::Doi, "10.1/ref"), MockRegistrar::new(5));
        let resource = h.fx.resource_with_files(&[]).await;
        h.fx.storage.put_bytes("federated/a.nc", vec![1u8; 8]).await.unwrap();
        h.fx.storage.put_bytes("federated/b.nc", vec![2u8; 16]).await.unwrap();
        let manager = crate::files::FileManager::new(h.fx.services.clone());
        for path in ["/federated/a.nc", "/federated/b.nc"] {
            manager
                .add_reference_file(&resource.short_id, path, "alice")
                .await
                .unwrap();
        }

        let published = h
            .publisher
            .publish("alice", &resource.short_id, PublishType::Doi)
            .await
            .unwrap();

        assert_eq!(published.doi.as_deref(), Some("10.1/ref"));
        let request = h.minter.last_request().unwrap();
        assert_eq!(request.content_type, ARCHIVE_CONTENT_TYPE);
        assert!(h
            .fx
            .storage
            .contains(&format!("bags/{}.tar.gz", resource.short_id))
            .await);
    }

    #[tokio::test]
    async fn test_missing_collection_aborts_multi_file_publication() {
        let h = harness(MockMinter::new(PublishType::Doi, "10.1/y"), MockRegistrar::new(1));
        let resource = h.fx.resource_with_files(&[("a.txt", "a"), ("b.txt", "b")]).await;
        h.fx.storage.delete(&resource.short_id).await.unwrap();

        let err = h
            .publisher
            .publish("alice", &resource.short_id, PublishType::Doi)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::StorageIntegrity { .. }));
        assert_eq!(h.minter.calls(), 0);
    }
}
