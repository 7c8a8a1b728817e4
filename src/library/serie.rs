use crate::db::{RowData, column_i64, column_opt_string, column_string};
use crate::error::Result;
use crate::model::{BookLink, Entity, EntityKind, Linked};
use serde::{Deserialize, Serialize};

/// A book series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Serie {
    /// Primary key.
    pub id: i64,
    /// Serie name.
    pub name: String,
    /// Name used for sorting.
    pub sort: Option<String>,
}

impl Entity for Serie {
    const KIND: EntityKind = EntityKind::Serie;
    const TABLE: &'static str = "series";
    const SORT_COLUMN: &'static str = "sort";
    const DEFAULT_ORDER: &'static str = "main.sort, main.id";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_data(&mut self, row: &RowData) -> Result<()> {
        let serie = Serie {
            id: column_i64(row, "id")?,
            name: column_string(row, "name")?,
            sort: column_opt_string(row, "sort")?,
        };
        *self = serie;
        Ok(())
    }
}

impl Linked for Serie {
    const LINK: BookLink = BookLink {
        table: "books_series_link",
        column: "series",
    };
}
