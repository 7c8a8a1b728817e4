use crate::db::{RowData, column_i64, column_string};
use crate::error::Result;
use crate::model::{BookLink, Entity, EntityKind, Linked};
use serde::{Deserialize, Serialize};

/// A subject tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Primary key.
    pub id: i64,
    /// Tag name.
    pub name: String,
}

impl Entity for Tag {
    const KIND: EntityKind = EntityKind::Tag;
    const TABLE: &'static str = "tags";
    // Calibre keeps no sort key for tags
    const SORT_COLUMN: &'static str = "name";
    const DEFAULT_ORDER: &'static str = "main.name, main.id";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_data(&mut self, row: &RowData) -> Result<()> {
        let tag = Tag {
            id: column_i64(row, "id")?,
            name: column_string(row, "name")?,
        };
        *self = tag;
        Ok(())
    }
}

impl Linked for Tag {
    const LINK: BookLink = BookLink {
        table: "books_tags_link",
        column: "tag",
    };
}
