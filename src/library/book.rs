//! Book model.

use crate::context::LibraryContext;
use crate::db::{
    RowData, column_bool, column_i64, column_opt_datetime, column_opt_f64, column_opt_string,
    column_string,
};
use crate::error::Result;
use crate::library::cover::{CoverArtifact, ThumbnailEncoder};
use crate::model::{Entity, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the cover image inside a book folder.
pub const COVER_FILE: &str = "cover.jpg";

/// Represents a book of a Calibre library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Primary key.
    pub id: i64,

    /// Book title.
    pub title: String,

    /// Title used for sorting.
    pub sort: Option<String>,

    /// Authors used for sorting ("Asimov, Isaac").
    pub author_sort: Option<String>,

    /// Book folder, relative to the library root.
    pub path: String,

    /// Whether a cover image is available.
    pub has_cover: bool,

    /// Position in series.
    pub series_index: Option<f64>,

    /// Publication date, as stored.
    pub pubdate: Option<String>,

    /// Last metadata change.
    pub last_modified: Option<DateTime<Utc>>,
}

impl Default for Book {
    fn default() -> Self {
        Self {
            id: 0,
            title: "Unknown".to_string(),
            sort: None,
            author_sort: None,
            path: String::new(),
            has_cover: false,
            series_index: None,
            pubdate: None,
            last_modified: None,
        }
    }
}

impl Entity for Book {
    const KIND: EntityKind = EntityKind::Book;
    const TABLE: &'static str = "books";
    const SORT_COLUMN: &'static str = "sort";
    const DEFAULT_ORDER: &'static str = "main.sort, main.id";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_data(&mut self, row: &RowData) -> Result<()> {
        let book = Book {
            id: column_i64(row, "id")?,
            title: column_string(row, "title")?,
            sort: column_opt_string(row, "sort")?,
            author_sort: column_opt_string(row, "author_sort")?,
            path: column_opt_string(row, "path")?.unwrap_or_default(),
            has_cover: column_bool(row, "has_cover")?,
            series_index: column_opt_f64(row, "series_index")?,
            pubdate: column_opt_string(row, "pubdate")?,
            last_modified: column_opt_datetime(row, "last_modified")?,
        };

        *self = book;
        Ok(())
    }
}

impl Book {
    /// Absolute book folder.
    pub fn folder(&self, library_root: &Path) -> PathBuf {
        library_root.join(&self.path)
    }

    /// Absolute path of the source cover, if the book has one.
    pub fn cover_source(&self, library_root: &Path) -> Option<PathBuf> {
        self.has_cover
            .then(|| self.folder(library_root).join(COVER_FILE))
    }

    /// Cover artifact of this book.
    pub fn cover(
        &self,
        library: &LibraryContext,
        encoder: Arc<dyn ThumbnailEncoder>,
    ) -> CoverArtifact {
        CoverArtifact::new(
            self.id,
            self.cover_source(library.root()),
            library.thumbnail_root(),
            encoder,
        )
    }

    /// Title used when sorting, falling back to the title.
    pub fn sort_title(&self) -> &str {
        self.sort.as_deref().unwrap_or(&self.title)
    }
}
