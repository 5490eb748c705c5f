//! Resource file entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resource_files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub resource_id: String,

    /// Path relative to the resource's content directory
    #[sea_orm(column_type = "Text")]
    pub relative_path: String,

    /// Byte length recorded when the content was added
    pub size: i64,

    /// Backend checksum string captured at upload time, if any
    #[sea_orm(column_type = "Text", nullable)]
    pub checksum: Option<String>,

    /// Location of externally hosted content; `None` for stored files
    #[sea_orm(column_type = "Text", nullable)]
    pub reference_path: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn is_reference(&self) -> bool {
        self.reference_path.is_some()
    }

    /// Last path segment of the file
    pub fn file_name(&self) -> &str {
        match self.reference_path.as_deref() {
            Some(reference) => last_segment(reference),
            None => last_segment(&self.relative_path),
        }
    }

    /// Path of stored content inside the backend
    pub fn storage_path(&self) -> String {
        format!(
            "{}/data/contents/{}",
            self.resource_id,
            self.relative_path.trim_start_matches('/')
        )
    }
}

fn last_segment(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::resource::Entity",
        from = "Column::ResourceId",
        to = "super::resource::Column::ShortId"
    )]
    Resource,
}

impl Related<super::resource::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Resource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(relative_path: &str, reference_path: Option<&str>) -> Model {
        Model {
            id: Uuid::new_v4(),
            resource_id: "res1".to_string(),
            relative_path: relative_path.to_string(),
            size: 10,
            checksum: None,
            reference_path: reference_path.map(str::to_string),
            created_at: chrono::Utc::now().into(),
        }
    }

    #[test]
    fn test_stored_file_paths() {
        let f = file("site/obs.csv", None);
        assert_eq!(f.file_name(), "obs.csv");
        assert_eq!(f.storage_path(), "res1/data/contents/site/obs.csv");
        assert!(!f.is_reference());
    }

    #[test]
    fn test_reference_file_name_comes_from_target() {
        let f = file("ref", Some("/shared/archive/2019/flow.nc"));
        assert!(f.is_reference());
        assert_eq!(f.file_name(), "flow.nc");
    }
}
