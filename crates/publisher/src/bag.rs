//! Bag packaging
//!
//! A bag is a gzip-compressed tar archive holding a resource's payload,
//! a SHA-256 payload manifest, a fetch list for referenced content and a
//! metadata descriptor. Entries are written in sorted order with fixed
//! header fields, so unchanged content always yields the same bytes.
//!
//! Freshness is tracked by the `bag_modified` AVU on the resource's
//! collection: absent or `"true"` means the bag must be rebuilt.

use crate::errors::{PublishError, PublishResult};
use crate::manifest::source_path;
use crate::Services;
use dataforge_common::db::models::{MetadataElement, Resource, ResourceFile};
use dataforge_common::metrics::record_bag_build;
use dataforge_common::storage::sha256_hex;
use dataforge_common::BAG_MODIFIED_AVU;
use flate2::{write::GzEncoder, Compression};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const BAGIT_DECLARATION: &str = "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n";

/// Content type declared for single-file publications
pub const PLAIN_CONTENT_TYPE: &str = "text/plain";

/// Content type declared for bag publications
pub const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

/// Packaged content an identifier is minted for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Hex SHA-256 of the content
    pub checksum: String,
    pub size: u64,
    pub download_url: String,
    pub content_type: &'static str,
}

#[derive(Serialize)]
struct MetadataDescriptor<'a> {
    short_id: &'a str,
    title: &'a str,
    owner: &'a str,
    resource_type: &'a str,
    elements: Vec<ElementDescriptor<'a>>,
}

#[derive(Serialize)]
struct ElementDescriptor<'a> {
    term: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    element_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
}

impl<'a> From<&'a MetadataElement> for ElementDescriptor<'a> {
    fn from(e: &'a MetadataElement) -> Self {
        Self {
            term: &e.term,
            element_type: e.element_type.as_deref(),
            value: e.value.as_deref(),
            name: e.name.as_deref(),
            url: e.url.as_deref(),
            start_date: e.start_date.map(|d| d.to_rfc3339()),
        }
    }
}

pub struct BagPackager {
    services: Services,
}

impl BagPackager {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Backend path of the bag of `short_id`
    pub fn bag_path(&self, short_id: &str) -> String {
        self.services.config.storage.bag_path(short_id)
    }

    /// Rebuild the bag when the freshness flag is absent or set
    ///
    /// Returns whether a rebuild happened.
    #[instrument(skip(self, resource), fields(resource_id = %resource.short_id))]
    pub async fn ensure_fresh(&self, resource: &Resource) -> PublishResult<bool> {
        let collection = resource.short_id.as_str();
        if !self.services.storage.exists(collection).await? {
            return Err(PublishError::StorageIntegrity {
                resource_id: resource.short_id.clone(),
                message: "resource collection does not exist in storage".to_string(),
            });
        }

        let flag = self
            .services
            .storage
            .get_avu(collection, BAG_MODIFIED_AVU)
            .await?;
        let stale = flag.map_or(true, |v| v.eq_ignore_ascii_case("true"));

        if stale {
            self.build(resource).await?;
        } else {
            debug!("Bag is up to date");
        }
        Ok(stale)
    }

    /// Build the bag of `resource` and store it at [`BagPackager::bag_path`]
    #[instrument(skip(self, resource), fields(resource_id = %resource.short_id))]
    pub async fn build(&self, resource: &Resource) -> PublishResult<u64> {
        let store = &self.services.store;
        let files = store.list_files(&resource.short_id).await?;
        let elements = store.list_elements(&resource.short_id).await?;

        let entries = self.collect_entries(resource, &files, &elements).await?;
        let archive = tokio::task::spawn_blocking(move || write_archive(entries))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        let size = archive.len() as u64;
        self.services
            .storage
            .put_bytes(&self.bag_path(&resource.short_id), archive)
            .await?;
        self.services
            .storage
            .set_avu(&resource.short_id, BAG_MODIFIED_AVU, "false")
            .await?;

        record_bag_build(size);
        info!(size, files = files.len(), "Bag built");
        Ok(size)
    }

    /// Ensure the bag is fresh, download it into `scratch` and describe it
    #[instrument(skip(self, resource, scratch), fields(resource_id = %resource.short_id))]
    pub async fn package(&self, resource: &Resource, scratch: &Path) -> PublishResult<Artifact> {
        self.ensure_fresh(resource).await?;

        let bag_path = self.bag_path(&resource.short_id);
        let local = scratch.join(format!("{}.tar.gz", resource.short_id));
        self.services.storage.get_file(&bag_path, &local).await?;

        let (checksum, size) = hash_file(local).await?;
        Ok(Artifact {
            checksum,
            size,
            download_url: self.services.config.site.download_url(&bag_path),
            content_type: ARCHIVE_CONTENT_TYPE,
        })
    }

    async fn collect_entries(
        &self,
        resource: &Resource,
        files: &[ResourceFile],
        elements: &[MetadataElement],
    ) -> PublishResult<BTreeMap<String, Vec<u8>>> {
        let root = resource.short_id.as_str();
        let storage = &self.services.storage;
        let mut entries = BTreeMap::new();
        let mut payload_manifest = BTreeMap::new();
        let mut fetch = BTreeMap::new();

        for file in files {
            let payload = format!("data/contents/{}", file.relative_path.trim_start_matches('/'));
            match file.reference_path.as_deref() {
                Some(reference) => {
                    let url = self.services.config.site.download_url(&format!(
                        "{}/{}",
                        root,
                        reference.trim_start_matches('/')
                    ));
                    let length = storage.size(&source_path(file)).await?;
                    fetch.insert(payload, format!("{} {}", url, length));
                }
                None => {
                    let bytes = storage.read(&file.storage_path()).await?;
                    payload_manifest.insert(payload.clone(), sha256_hex(&bytes));
                    entries.insert(format!("{}/{}", root, payload), bytes);
                }
            }
        }

        let manifest: String = payload_manifest
            .iter()
            .map(|(path, digest)| format!("{}  {}\n", digest, path))
            .collect();
        entries.insert(format!("{}/manifest-sha256.txt", root), manifest.into_bytes());

        if !fetch.is_empty() {
            let listing: String = fetch
                .iter()
                .map(|(path, line)| format!("{} {}\n", line, path))
                .collect();
            entries.insert(format!("{}/fetch.txt", root), listing.into_bytes());
        }

        let descriptor = MetadataDescriptor {
            short_id: root,
            title: &resource.title,
            owner: &resource.owner,
            resource_type: &resource.resource_type,
            elements: elements.iter().map(ElementDescriptor::from).collect(),
        };
        entries.insert(
            format!("{}/data/resourcemetadata.json", root),
            serde_json::to_vec_pretty(&descriptor).map_err(dataforge_common::AppError::from)?,
        );
        entries.insert(format!("{}/bagit.txt", root), BAGIT_DECLARATION.as_bytes().to_vec());

        Ok(entries)
    }
}

fn write_archive(entries: BTreeMap<String, Vec<u8>>) -> std::io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);

    for (path, bytes) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        builder.append_data(&mut header, path, bytes.as_slice())?;
    }

    builder.into_inner()?.finish()
}

/// Hex SHA-256 and byte length of a local file
pub async fn hash_file(path: PathBuf) -> PublishResult<(String, u64)> {
    let digest = tokio::task::spawn_blocking(move || -> std::io::Result<(String, u64)> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        Ok((hex::encode(hasher.finalize()), total))
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
    Ok(digest)
}
