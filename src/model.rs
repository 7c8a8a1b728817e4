//! Entity/resource/collection data-access runtime.
//!
//! Every domain entity type has a persistence object ([`EntityResource`]) and
//! an aggregate loader ([`Collection`]). Both are resolved by name through the
//! [`ModelCatalog`], following the `<Kind>Resource` / `<Kind>Collection`
//! naming convention, by an [`EntityRegistry`] scoped to one library.

mod catalog;
mod collection;
mod registry;
mod resource;

pub use catalog::{MODEL_NAMESPACE, ModelCatalog, ModelFactory};
pub use collection::{
    AuthorCollection, BookCollection, Collection, CollectionIter, SerieCollection, TagCollection,
};
pub use registry::EntityRegistry;
pub use resource::{
    AuthorResource, BookResource, EntityResource, LetterCount, SerieResource, TagResource,
};

use crate::db::RowData;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of domain entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A book.
    Book,
    /// A book author.
    Author,
    /// A book series.
    Serie,
    /// A subject tag.
    Tag,
}

impl EntityKind {
    /// Naming-convention stem of this entity type.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Book => "Book",
            EntityKind::Author => "Author",
            EntityKind::Serie => "Serie",
            EntityKind::Tag => "Tag",
        }
    }

    /// Model name of the persistence object.
    pub fn resource_name(&self) -> String {
        format!("{}Resource", self.name())
    }

    /// Model name of the aggregate loader.
    pub fn collection_name(&self) -> String {
        format!("{}Collection", self.name())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A hydrated record for one row of a domain table.
pub trait Entity: Default + Clone + Send + Sync + 'static {
    /// Entity type tag.
    const KIND: EntityKind;
    /// Table holding the entity rows.
    const TABLE: &'static str;
    /// Column the alphabetic index is built on.
    const SORT_COLUMN: &'static str;
    /// Natural ordering of collections.
    const DEFAULT_ORDER: &'static str;

    /// Primary key.
    fn id(&self) -> i64;

    /// Populate every field from one result row.
    ///
    /// Either all fields are replaced or, on error, none are.
    fn set_data(&mut self, row: &RowData) -> Result<()>;

    /// Build a new entity from one result row.
    fn from_row(row: &RowData) -> Result<Self> {
        let mut entity = Self::default();
        entity.set_data(row)?;
        Ok(entity)
    }
}

/// Link table joining an entity to books.
#[derive(Debug, Clone, Copy)]
pub struct BookLink {
    /// Link table name.
    pub table: &'static str,
    /// Column of the link table referencing the entity.
    pub column: &'static str,
}

/// Entities attached to books through a link table.
pub trait Linked: Entity {
    /// How the entity is joined to books.
    const LINK: BookLink;
}
