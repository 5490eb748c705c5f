//! Science metadata element entity
//!
//! One row per element; the `term` column selects which attributes are
//! meaningful (relation type + value, identifier name + url, ...).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Relation type linking a newer version to the one it supersedes
pub const IS_VERSION_OF: &str = "isVersionOf";

/// Relation type linking a superseded version to its successor
pub const IS_REPLACED_BY: &str = "isReplacedBy";

/// Source type linking a copy to the resource it was derived from
pub const DERIVED_FROM: &str = "derived_from";

/// Date type recorded at publication
pub const DATE_PUBLISHED: &str = "published";

/// Metadata vocabulary terms handled by the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementTerm {
    Title,
    Description,
    Creator,
    Subject,
    Rights,
    Format,
    Relation,
    Source,
    Identifier,
    Publisher,
    Date,
    Other,
}

impl From<String> for ElementTerm {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "title" => ElementTerm::Title,
            "description" => ElementTerm::Description,
            "creator" => ElementTerm::Creator,
            "subject" => ElementTerm::Subject,
            "rights" => ElementTerm::Rights,
            "format" => ElementTerm::Format,
            "relation" => ElementTerm::Relation,
            "source" => ElementTerm::Source,
            "identifier" => ElementTerm::Identifier,
            "publisher" => ElementTerm::Publisher,
            "date" => ElementTerm::Date,
            _ => ElementTerm::Other,
        }
    }
}

impl From<ElementTerm> for String {
    fn from(term: ElementTerm) -> Self {
        term.as_str().to_string()
    }
}

impl ElementTerm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementTerm::Title => "title",
            ElementTerm::Description => "description",
            ElementTerm::Creator => "creator",
            ElementTerm::Subject => "subject",
            ElementTerm::Rights => "rights",
            ElementTerm::Format => "format",
            ElementTerm::Relation => "relation",
            ElementTerm::Source => "source",
            ElementTerm::Identifier => "identifier",
            ElementTerm::Publisher => "publisher",
            ElementTerm::Date => "date",
            ElementTerm::Other => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "metadata_elements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub resource_id: String,

    #[sea_orm(column_type = "Text")]
    pub term: String,

    /// Qualifier: relation type, date type, ...
    #[sea_orm(column_type = "Text", nullable)]
    pub element_type: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub value: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub url: Option<String>,

    pub start_date: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn element_term(&self) -> ElementTerm {
        ElementTerm::from(self.term.clone())
    }

    /// True for a relation element of the given type
    pub fn is_relation(&self, relation_type: &str) -> bool {
        self.element_term() == ElementTerm::Relation
            && self.element_type.as_deref() == Some(relation_type)
    }
}

/// Attributes of an element about to be created
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInput {
    pub term: String,
    pub element_type: Option<String>,
    pub value: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub start_date: Option<DateTimeWithTimeZone>,
}

impl ElementInput {
    pub fn new(term: ElementTerm) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }

    pub fn relation(relation_type: &str, value: impl Into<String>) -> Self {
        Self {
            element_type: Some(relation_type.to_string()),
            value: Some(value.into()),
            ..Self::new(ElementTerm::Relation)
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_type(mut self, element_type: impl Into<String>) -> Self {
        self.element_type = Some(element_type.into());
        self
    }

    pub fn with_start_date(mut self, date: DateTimeWithTimeZone) -> Self {
        self.start_date = Some(date);
        self
    }

    /// Rebuild the input that would recreate `element` on another resource
    pub fn from_element(element: &Model) -> Self {
        Self {
            term: element.term.clone(),
            element_type: element.element_type.clone(),
            value: element.value.clone(),
            name: element.name.clone(),
            url: element.url.clone(),
            start_date: element.start_date,
        }
    }

    /// Materialize the input as a row owned by `resource_id`
    pub fn into_model(self, resource_id: &str) -> Model {
        Model {
            id: Uuid::new_v4(),
            resource_id: resource_id.to_string(),
            term: self.term,
            element_type: self.element_type,
            value: self.value,
            name: self.name,
            url: self.url,
            start_date: self.start_date,
            created_at: chrono::Utc::now().into(),
        }
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
