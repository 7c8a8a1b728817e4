use crate::context::LibraryContext;
use crate::db::{Database, RowData, column_i64, column_string};
use crate::error::{AppError, Result};
use crate::model::{Entity, Linked};
use rusqlite::params;
use rusqlite::types::Value;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Number of entities whose sort key starts with a given letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LetterCount {
    /// Uppercase, accent-free first letter.
    pub letter: String,
    /// Number of entities.
    pub count: i64,
}

/// Persistence object of entity type `E`: single loads and scalar/aggregate queries.
pub struct EntityResource<E: Entity> {
    library: Arc<LibraryContext>,
    _entity: PhantomData<fn() -> E>,
}

/// Persistence object of books.
pub type BookResource = EntityResource<crate::library::Book>;
/// Persistence object of authors.
pub type AuthorResource = EntityResource<crate::library::Author>;
/// Persistence object of series.
pub type SerieResource = EntityResource<crate::library::Serie>;
/// Persistence object of tags.
pub type TagResource = EntityResource<crate::library::Tag>;

impl<E: Entity> EntityResource<E> {
    /// Create the resource for a library.
    pub fn new(library: Arc<LibraryContext>) -> Self {
        Self {
            library,
            _entity: PhantomData,
        }
    }

    /// Library database.
    pub fn connection(&self) -> &Database {
        self.library.db()
    }

    /// SELECT every column of the entity table, aliased `main`.
    pub fn base_select(&self) -> String {
        format!("SELECT main.* FROM {} AS main", E::TABLE)
    }

    /// Load entity `id` into `target`.
    pub fn load<'a>(&self, id: i64, target: &'a mut E) -> Result<&'a mut E> {
        let sql = format!("{} WHERE main.id = ?1", self.base_select());
        let row = self
            .connection()
            .fetch_row(&sql, params![id])?
            .ok_or(AppError::NotFound { kind: E::KIND, id })?;

        target.set_data(&row)?;
        Ok(target)
    }

    /// Entity count per first letter of the sort key, ascending by letter.
    ///
    /// Letters are uppercased with accents removed, so `Émile` counts under `E`.
    pub fn aggregated_list(&self) -> Result<Vec<LetterCount>> {
        let sql = format!(
            "SELECT
                first_letter(main.{sort}) AS letter,
                COUNT(*) AS total
             FROM {table} AS main
             WHERE first_letter(main.{sort}) IS NOT NULL
             GROUP BY letter
             ORDER BY letter",
            sort = E::SORT_COLUMN,
            table = E::TABLE,
        );

        self.connection()
            .fetch_all(&sql, [])?
            .iter()
            .map(letter_count)
            .collect()
    }

    /// Total number of entities.
    pub fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", E::TABLE);
        scalar_to_i64(self.connection().fetch_scalar(&sql, [])?)
    }
}

impl<E: Linked> EntityResource<E> {
    /// Number of books linked to entity `id`.
    pub fn count_books(&self, id: i64) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {table} AS main
             INNER JOIN {link} ON main.id = {link}.{column}
             INNER JOIN books ON {link}.book = books.id
             WHERE main.id = ?1",
            table = E::TABLE,
            link = E::LINK.table,
            column = E::LINK.column,
        );

        scalar_to_i64(self.connection().fetch_scalar(&sql, params![id])?)
    }
}

fn letter_count(row: &RowData) -> Result<LetterCount> {
    Ok(LetterCount {
        letter: column_string(row, "letter")?,
        count: column_i64(row, "total")?,
    })
}

/// Missing or NULL scalars count as zero.
pub(crate) fn scalar_to_i64(value: Option<Value>) -> Result<i64> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Integer(v)) => Ok(v),
        Some(Value::Real(v)) => Ok(v as i64),
        Some(other) => Err(AppError::InvalidFormat(format!(
            "Expected an integer count, got {:?}",
            other
        ))),
    }
}
