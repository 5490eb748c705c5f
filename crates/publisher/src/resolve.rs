//! Persistent identifier lookup

use dataforge_common::errors::{AppError, Result};
use dataforge_common::ResourceStore;
use tracing::instrument;

/// Short id of the resource published under `doi`
#[instrument(skip(store))]
pub async fn resolve_doi(store: &dyn ResourceStore, doi: &str) -> Result<String> {
    store
        .find_resource_by_doi(doi)
        .await?
        .map(|r| r.short_id)
        .ok_or_else(|| AppError::IdentifierNotFound {
            scheme: "doi".to_string(),
            value: doi.to_string(),
        })
}

/// Short id of the resource published under `minid`
#[instrument(skip(store))]
pub async fn resolve_minid(store: &dyn ResourceStore, minid: &str) -> Result<String> {
    store
        .find_resource_by_minid(minid)
        .await?
        .map(|r| r.short_id)
        .ok_or_else(|| AppError::IdentifierNotFound {
            scheme: "minid".to_string(),
            value: minid.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataforge_common::db::NewResource;
    use dataforge_common::MemoryStore;

    #[tokio::test]
    async fn test_resolves_both_schemes() {
        let store = MemoryStore::new();
        let mut resource = store
            .create_resource(NewResource {
                title: "Snowpack".to_string(),
                owner: "alice".to_string(),
                resource_type: "GenericResource".to_string(),
            })
            .await
            .unwrap();
        resource.doi = Some("10.25491/abcd".to_string());
        store.save_resource(&resource).await.unwrap();

        assert_eq!(
            resolve_doi(&store, "10.25491/abcd").await.unwrap(),
            resource.short_id
        );

        let err = resolve_minid(&store, "ark:/57799/missing").await.unwrap_err();
        assert!(matches!(err, AppError::IdentifierNotFound { ref scheme, .. } if scheme == "minid"));
        assert!(err.is_not_found());
    }
}
