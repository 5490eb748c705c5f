//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::db::models::*;
use crate::db::store::{NewResource, ResourceStore};
use crate::db::DbPool;
use crate::errors::Result;
use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

/// Postgres-backed resource store
///
/// Pipeline flows read back rows they have just written, so reads go to
/// the primary unless the repository was built for lookups only.
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
    replica_reads: bool,
}

impl Repository {
    /// Repository that reads its own writes
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            replica_reads: false,
        }
    }

    /// Repository for read-only lookups, served by the replica when configured
    pub fn with_replica_reads(pool: DbPool) -> Self {
        Self {
            pool,
            replica_reads: true,
        }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        if self.replica_reads {
            self.pool.read()
        } else {
            self.pool.write()
        }
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

#[async_trait]
impl ResourceStore for Repository {
    // ========================================================================
    // Resource Operations
    // ========================================================================

    async fn create_resource(&self, input: NewResource) -> Result<Resource> {
        let resource = input.into_model().into_active_model().reset_all();
        resource.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn find_resource(&self, short_id: &str) -> Result<Option<Resource>> {
        ResourceEntity::find_by_id(short_id.to_string())
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn save_resource(&self, resource: &Resource) -> Result<Resource> {
        let active = resource.clone().into_active_model().reset_all();
        active.update(self.write_conn()).await.map_err(Into::into)
    }

    async fn purge_resource(&self, short_id: &str) -> Result<bool> {
        let txn = self.write_conn().begin().await?;

        let elements = MetadataElementEntity::delete_many()
            .filter(MetadataElementColumn::ResourceId.eq(short_id))
            .exec(&txn)
            .await?;

        let files = ResourceFileEntity::delete_many()
            .filter(ResourceFileColumn::ResourceId.eq(short_id))
            .exec(&txn)
            .await?;

        let result = ResourceEntity::delete_by_id(short_id.to_string())
            .exec(&txn)
            .await?;

        txn.commit().await?;

        debug!(
            resource_id = %short_id,
            elements = elements.rows_affected,
            files = files.rows_affected,
            "Resource purged"
        );

        Ok(result.rows_affected > 0)
    }

    async fn purge_chain_head(&self, short_id: &str, predecessor: Option<&str>) -> Result<bool> {
        let txn = self.write_conn().begin().await?;

        MetadataElementEntity::delete_many()
            .filter(MetadataElementColumn::ResourceId.eq(short_id))
            .exec(&txn)
            .await?;
        ResourceFileEntity::delete_many()
            .filter(ResourceFileColumn::ResourceId.eq(short_id))
            .exec(&txn)
            .await?;
        ResourceEntity::delete_by_id(short_id.to_string())
            .exec(&txn)
            .await?;

        let mut promoted = false;
        if let Some(predecessor) = predecessor {
            let relations = MetadataElementEntity::delete_many()
                .filter(MetadataElementColumn::ResourceId.eq(predecessor))
                .filter(MetadataElementColumn::Term.eq(ElementTerm::Relation.as_str()))
                .filter(MetadataElementColumn::ElementType.eq(IS_REPLACED_BY))
                .exec(&txn)
                .await?;

            if relations.rows_affected > 0 {
                let now: DateTimeWithTimeZone = chrono::Utc::now().into();
                ResourceEntity::update_many()
                    .col_expr(ResourceColumn::Immutable, Expr::value(false))
                    .col_expr(ResourceColumn::UpdatedAt, Expr::value(now))
                    .filter(ResourceColumn::ShortId.eq(predecessor))
                    .exec(&txn)
                    .await?;
                promoted = true;
            }
        }

        txn.commit().await?;

        debug!(resource_id = %short_id, promoted, "Chain head purged");
        Ok(promoted)
    }

    async fn find_resource_by_doi(&self, doi: &str) -> Result<Option<Resource>> {
        ResourceEntity::find()
            .filter(ResourceColumn::Doi.eq(doi))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_resource_by_minid(&self, minid: &str) -> Result<Option<Resource>> {
        ResourceEntity::find()
            .filter(ResourceColumn::Minid.eq(minid))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // File Operations
    // ========================================================================

    async fn list_files(&self, short_id: &str) -> Result<Vec<ResourceFile>> {
        ResourceFileEntity::find()
            .filter(ResourceFileColumn::ResourceId.eq(short_id))
            .order_by_asc(ResourceFileColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn add_file(&self, file: ResourceFile) -> Result<ResourceFile> {
        let file = file.into_active_model().reset_all();
        file.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn delete_file(&self, file_id: Uuid) -> Result<bool> {
        let result = ResourceFileEntity::delete_by_id(file_id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Metadata Operations
    // ========================================================================

    async fn list_elements(&self, short_id: &str) -> Result<Vec<MetadataElement>> {
        MetadataElementEntity::find()
            .filter(MetadataElementColumn::ResourceId.eq(short_id))
            .order_by_asc(MetadataElementColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn create_element(&self, short_id: &str, input: ElementInput) -> Result<MetadataElement> {
        let element = input.into_model(short_id).into_active_model().reset_all();
        element.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn delete_element(&self, element_id: Uuid) -> Result<bool> {
        let result = MetadataElementEntity::delete_by_id(element_id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Publication
    // ========================================================================

    async fn commit_publication(
        &self,
        resource: &Resource,
        elements: Vec<ElementInput>,
    ) -> Result<Resource> {
        let txn = self.write_conn().begin().await?;

        let saved = resource
            .clone()
            .into_active_model()
            .reset_all()
            .update(&txn)
            .await?;

        for input in elements {
            input
                .into_model(&resource.short_id)
                .into_active_model()
                .reset_all()
                .insert(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(saved)
    }
}
