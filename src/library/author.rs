use crate::db::{RowData, column_i64, column_opt_string, column_string};
use crate::error::Result;
use crate::model::{BookLink, Entity, EntityKind, Linked};
use serde::{Deserialize, Serialize};

/// A book author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Primary key.
    pub id: i64,
    /// Display name ("Isaac Asimov").
    pub name: String,
    /// Name used for sorting ("Asimov, Isaac").
    pub sort: Option<String>,
}

impl Entity for Author {
    const KIND: EntityKind = EntityKind::Author;
    const TABLE: &'static str = "authors";
    const SORT_COLUMN: &'static str = "sort";
    const DEFAULT_ORDER: &'static str = "main.sort, main.id";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_data(&mut self, row: &RowData) -> Result<()> {
        let author = Author {
            id: column_i64(row, "id")?,
            name: column_string(row, "name")?,
            sort: column_opt_string(row, "sort")?,
        };
        *self = author;
        Ok(())
    }
}

impl Linked for Author {
    const LINK: BookLink = BookLink {
        table: "books_authors_link",
        column: "author",
    };
}
