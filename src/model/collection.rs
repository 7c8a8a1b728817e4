use crate::context::LibraryContext;
use crate::db::{RowData, column_i64};
use crate::error::{AppError, Result};
use crate::library::{Author, Book, Serie, Tag};
use crate::model::resource::scalar_to_i64;
use crate::model::{Entity, Linked};
use crate::text::first_letter;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::cell::OnceCell;
use std::sync::Arc;

/// Lazily loaded set of entities of type `E`.
///
/// The query runs at most once, on the first [`fetch`](Self::fetch) or
/// iteration, and its result is kept. Iterating consumes the collection; a new
/// query needs a new collection.
pub struct Collection<E: Entity> {
    library: Arc<LibraryContext>,
    joins: Vec<String>,
    conditions: Vec<String>,
    params: Vec<Value>,
    order: String,
    items: OnceCell<Vec<E>>,
}

/// Collection of books.
pub type BookCollection = Collection<Book>;
/// Collection of authors.
pub type AuthorCollection = Collection<Author>;
/// Collection of series.
pub type SerieCollection = Collection<Serie>;
/// Collection of tags.
pub type TagCollection = Collection<Tag>;

impl<E: Entity> Collection<E> {
    /// Unfiltered collection of a library.
    pub fn new(library: Arc<LibraryContext>) -> Self {
        Self {
            library,
            joins: Vec::new(),
            conditions: Vec::new(),
            params: Vec::new(),
            order: E::DEFAULT_ORDER.to_string(),
            items: OnceCell::new(),
        }
    }

    /// Every entity, in natural order.
    pub fn all(self) -> Self {
        Self::new(self.library)
    }

    /// Entities whose sort key starts with `letter` (accents and case ignored).
    pub fn by_first_letter(self, letter: &str) -> Self {
        let letter = first_letter(letter).map_or(Value::Null, Value::Text);
        let condition = format!("first_letter(main.{}) = ?", E::SORT_COLUMN);
        self.filter(None, condition, vec![letter])
    }

    fn filter(mut self, join: Option<String>, condition: String, params: Vec<Value>) -> Self {
        self.joins.extend(join);
        self.conditions.push(condition);
        self.params.extend(params);
        self.items = OnceCell::new();
        self
    }

    fn order_by(mut self, order: &str) -> Self {
        self.order = order.to_string();
        self
    }

    /// Alias for the next joined link table.
    fn next_alias(&self) -> String {
        format!("l{}", self.joins.len())
    }

    fn from_clause(&self) -> String {
        let mut sql = format!("FROM {} AS main", E::TABLE);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql
    }

    /// SQL selecting the entities.
    pub fn sql(&self) -> String {
        format!("SELECT main.* {} ORDER BY {}", self.from_clause(), self.order)
    }

    /// Number of entities. Uses a COUNT query unless already loaded.
    pub fn count(&self) -> Result<usize> {
        if let Some(items) = self.items.get() {
            return Ok(items.len());
        }

        let sql = format!("SELECT COUNT(*) {}", self.from_clause());
        let count = scalar_to_i64(
            self.library
                .db()
                .fetch_scalar(&sql, params_from_iter(self.params.iter()))?,
        )?;
        Ok(count.max(0) as usize)
    }

    /// Whether the query already ran.
    pub fn is_loaded(&self) -> bool {
        self.items.get().is_some()
    }

    /// Entities, running the query on first call only.
    pub fn fetch(&self) -> Result<&[E]> {
        if let Some(items) = self.items.get() {
            return Ok(items);
        }

        let items = self.query()?;
        Ok(self.items.get_or_init(|| items))
    }

    /// Entities as an owned vector.
    pub fn into_vec(self) -> Result<Vec<E>> {
        if self.items.get().is_some() {
            return Ok(self.items.into_inner().unwrap_or_default());
        }
        self.query()
    }

    fn query(&self) -> Result<Vec<E>> {
        self.query_rows()?.iter().map(hydrate::<E>).collect()
    }

    fn query_rows(&self) -> Result<Vec<RowData>> {
        let sql = self.sql();
        let rows = self
            .library
            .db()
            .fetch_all(&sql, params_from_iter(self.params.iter()))?;

        tracing::debug!(
            entity = %E::KIND,
            library = %self.library.name(),
            rows = rows.len(),
            "Collection loaded"
        );

        Ok(rows)
    }
}

/// Build one entity, tagging failures with the row id.
fn hydrate<E: Entity>(row: &RowData) -> Result<E> {
    E::from_row(row).map_err(|e| AppError::InvalidRow {
        kind: E::KIND,
        id: column_i64(row, "id").ok(),
        reason: e.to_string(),
    })
}

impl<E: Linked> Collection<E> {
    /// Entities linked to book `book_id`, in link order.
    pub fn by_book(self, book_id: i64) -> Self {
        let alias = self.next_alias();
        let join = format!(
            "INNER JOIN {table} AS {alias} ON {alias}.{column} = main.id",
            table = E::LINK.table,
            column = E::LINK.column,
        );
        let condition = format!("{}.book = ?", alias);
        let order = format!("{}.id", alias);
        self.filter(Some(join), condition, vec![Value::Integer(book_id)])
            .order_by(&order)
    }
}

impl Collection<Book> {
    /// Books linked to entity `id` of type `L`.
    pub fn by_linked<L: Linked>(self, id: i64) -> Self {
        let alias = self.next_alias();
        let join = format!(
            "INNER JOIN {table} AS {alias} ON {alias}.book = main.id",
            table = L::LINK.table,
        );
        let condition = format!("{}.{} = ?", alias, L::LINK.column);
        self.filter(Some(join), condition, vec![Value::Integer(id)])
    }

    /// Books written by author `id`.
    pub fn by_author(self, id: i64) -> Self {
        self.by_linked::<Author>(id)
    }

    /// Books of serie `id`, in serie order.
    pub fn by_serie(self, id: i64) -> Self {
        self.by_linked::<Serie>(id)
            .order_by("main.series_index, main.sort, main.id")
    }

    /// Books tagged with tag `id`.
    pub fn by_tag(self, id: i64) -> Self {
        self.by_linked::<Tag>(id)
    }
}

impl<E: Entity> IntoIterator for Collection<E> {
    type Item = Result<E>;
    type IntoIter = CollectionIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        CollectionIter {
            state: IterState::Pending(self),
        }
    }
}

/// Consuming iterator over a [`Collection`]; runs the query on first `next`.
///
/// Rows are hydrated one at a time, so a malformed row yields an
/// [`AppError::InvalidRow`] item and iteration goes on with the next one.
pub struct CollectionIter<E: Entity> {
    state: IterState<E>,
}

enum IterState<E: Entity> {
    Pending(Collection<E>),
    Loaded(std::vec::IntoIter<E>),
    Rows(std::vec::IntoIter<RowData>),
    Done,
}

impl<E: Entity> Iterator for CollectionIter<E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, IterState::Done) {
            IterState::Pending(collection) => {
                if collection.is_loaded() {
                    let items = collection.items.into_inner().unwrap_or_default();
                    self.state = IterState::Loaded(items.into_iter());
                    return self.next();
                }
                match collection.query_rows() {
                    Ok(rows) => {
                        self.state = IterState::Rows(rows.into_iter());
                        self.next()
                    }
                    Err(e) => Some(Err(e)),
                }
            }
            IterState::Loaded(mut items) => {
                let item = items.next()?;
                self.state = IterState::Loaded(items);
                Some(Ok(item))
            }
            IterState::Rows(mut rows) => {
                let row = rows.next()?;
                self.state = IterState::Rows(rows);
                Some(hydrate(&row))
            }
            IterState::Done => None,
        }
    }
}
