//! Resource entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Publication lifecycle of a resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationState {
    /// Mutable content and metadata, not formally published
    Draft,
    /// Pipeline in flight; never persisted
    Publishing,
    /// Immutable, public, discoverable and carrying a persistent identifier
    Published,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resources")]
pub struct Model {
    /// Short identifier assigned at creation, never reassigned
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub short_id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Username of the creating owner
    #[sea_orm(column_type = "Text")]
    pub owner: String,

    #[sea_orm(column_type = "Text")]
    pub resource_type: String,

    pub immutable: bool,

    pub public: bool,

    pub discoverable: bool,

    pub published: bool,

    pub shareable: bool,

    #[sea_orm(column_type = "Text", nullable)]
    pub doi: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub minid: Option<String>,

    /// Third-party assessment registry id
    pub assessment_id: Option<i64>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,

    #[sea_orm(column_type = "Text", nullable)]
    pub last_changed_by: Option<String>,
}

impl Model {
    /// Derive the lifecycle state from the persisted flags
    pub fn publication_state(&self) -> PublicationState {
        if self.published {
            PublicationState::Published
        } else {
            PublicationState::Draft
        }
    }

    /// The persistent identifier currently bound to this resource, if any
    pub fn persistent_identifier(&self) -> Option<&str> {
        self.doi
            .as_deref()
            .filter(|d| !d.is_empty())
            .or_else(|| self.minid.as_deref().filter(|m| !m.is_empty()))
    }

    pub fn is_owned_by(&self, username: &str) -> bool {
        self.owner == username
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    // Files and metadata are removed explicitly by the delete operation.
    #[sea_orm(has_many = "super::resource_file::Entity")]
    Files,

    #[sea_orm(has_many = "super::metadata_element::Entity")]
    MetadataElements,
}

impl Related<super::resource_file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Files.def()
    }
}

impl Related<super::metadata_element::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MetadataElements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
