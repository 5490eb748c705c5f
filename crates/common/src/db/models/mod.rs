//! SeaORM entity models
//!
//! Database entities for DataForge

mod metadata_element;
mod resource;
mod resource_file;

pub use resource::{
    Entity as ResourceEntity,
    Model as Resource,
    ActiveModel as ResourceActiveModel,
    Column as ResourceColumn,
    PublicationState,
};

pub use resource_file::{
    Entity as ResourceFileEntity,
    Model as ResourceFile,
    ActiveModel as ResourceFileActiveModel,
    Column as ResourceFileColumn,
};

pub use metadata_element::{
    Entity as MetadataElementEntity,
    Model as MetadataElement,
    ActiveModel as MetadataElementActiveModel,
    Column as MetadataElementColumn,
    ElementInput,
    ElementTerm,
    DATE_PUBLISHED,
    DERIVED_FROM,
    IS_REPLACED_BY,
    IS_VERSION_OF,
};
