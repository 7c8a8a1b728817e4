use crate::db::RowData;
use crate::error::{AppError, Result};
use crate::text::{first_letter, remove_accents};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Params, Row};
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access to one Calibre `metadata.db`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open an existing library database read-only.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(AppError::Config(format!(
                "Library database not found: {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Create (or open read-write) a library database with the Calibre tables.
    pub fn create(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self::from_connection(conn)?;
        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self::from_connection(conn)?;
        db.initialize_schema()?;
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        register_functions(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Initialize the subset of the Calibre schema this crate reads.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL DEFAULT 'Unknown',
                sort TEXT,
                timestamp TIMESTAMP,
                pubdate TIMESTAMP,
                series_index REAL NOT NULL DEFAULT 1.0,
                author_sort TEXT,
                isbn TEXT DEFAULT '',
                path TEXT NOT NULL DEFAULT '',
                uuid TEXT,
                has_cover BOOL DEFAULT 0,
                last_modified TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS authors (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                sort TEXT,
                link TEXT NOT NULL DEFAULT '',
                UNIQUE (name)
            );

            CREATE TABLE IF NOT EXISTS series (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                sort TEXT,
                UNIQUE (name)
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                UNIQUE (name)
            );

            CREATE TABLE IF NOT EXISTS books_authors_link (
                id INTEGER PRIMARY KEY,
                book INTEGER NOT NULL,
                author INTEGER NOT NULL,
                UNIQUE (book, author)
            );

            CREATE TABLE IF NOT EXISTS books_series_link (
                id INTEGER PRIMARY KEY,
                book INTEGER NOT NULL,
                series INTEGER NOT NULL,
                UNIQUE (book)
            );

            CREATE TABLE IF NOT EXISTS books_tags_link (
                id INTEGER PRIMARY KEY,
                book INTEGER NOT NULL,
                tag INTEGER NOT NULL,
                UNIQUE (book, tag)
            );

            CREATE INDEX IF NOT EXISTS books_authors_link_aidx ON books_authors_link (author);
            CREATE INDEX IF NOT EXISTS books_series_link_sidx ON books_series_link (series);
            CREATE INDEX IF NOT EXISTS books_tags_link_tidx ON books_tags_link (tag);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== QUERY EXECUTION ==========

    /// Fetch the first row of a query, if any.
    pub fn fetch_row<P: Params>(&self, sql: &str, params: P) -> Result<Option<RowData>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;
        let columns = column_names(&stmt);

        stmt.query_row(params, |row| row_data(row, &columns))
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to fetch row: {}", e)))
    }

    /// Fetch every row of a query.
    pub fn fetch_all<P: Params>(&self, sql: &str, params: P) -> Result<Vec<RowData>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;
        let columns = column_names(&stmt);

        let rows = stmt
            .query_map(params, |row| row_data(row, &columns))
            .map_err(|e| AppError::Internal(format!("Failed to fetch rows: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect rows: {}", e)))?;

        Ok(rows)
    }

    /// Fetch the first column of the first row, if any.
    pub fn fetch_scalar<P: Params>(&self, sql: &str, params: P) -> Result<Option<Value>> {
        let conn = self.conn.lock();
        conn.query_row(sql, params, |row| row.get::<_, Value>(0))
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to fetch scalar: {}", e)))
    }

    /// Execute a statement, returning the number of changed rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        let conn = self.conn.lock();
        conn.execute(sql, params)
            .map_err(|e| AppError::Internal(format!("Failed to execute statement: {}", e)))
    }
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(String::from).collect()
}

fn row_data(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<RowData> {
    let mut data = RowData::new();
    for (idx, name) in columns.iter().enumerate() {
        data.insert(name.clone(), row.get::<_, Value>(idx)?);
    }
    Ok(data)
}

/// Register the SQL helpers used by letter indexes.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "remove_accents",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| remove_accents(&v)))
        },
    )
    .map_err(|e| AppError::Internal(format!("Failed to register SQL functions: {}", e)))?;

    conn.create_scalar_function(
        "first_letter",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.as_deref().and_then(first_letter))
        },
    )
    .map_err(|e| AppError::Internal(format!("Failed to register SQL functions: {}", e)))
}
