//! Search documents for the full-text book index.
//!
//! Each book is flattened with its authors, serie and tags into one
//! [`SearchDocument`]; a [`SearchIndexer`] receives them together with the
//! index settings.

use crate::context::{AppContext, LibraryContext};
use crate::error::Result;
use crate::files::write_atomic;
use crate::library::{Author, Book, Serie, Tag};
use crate::model::{Entity, EntityRegistry};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// One book, flattened for indexing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    /// Unique document id: `<library>-<book id>`.
    #[serde(rename = "objectID")]
    pub object_id: String,
    /// Book title.
    pub title: String,
    /// Author names, in Calibre order.
    pub authors: Vec<String>,
    /// Serie name.
    pub serie: Option<String>,
    /// Tag names.
    pub tags: Vec<String>,
    /// Position in the serie (only set with a serie).
    pub serie_index: Option<f64>,
}

/// Settings pushed to the index before documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSettings {
    /// Index name.
    pub index_name: String,
    /// Searchable attributes.
    pub attributes_to_index: Vec<String>,
    /// Tie-breaking ranking.
    pub custom_ranking: Vec<String>,
}

impl IndexSettings {
    /// Settings for the book index.
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            attributes_to_index: ["title", "authors", "serie", "tags", "serieIndex"]
                .into_iter()
                .map(String::from)
                .collect(),
            custom_ranking: vec!["desc(serieIndex)".to_string()],
        }
    }
}

/// Receiver of search documents.
pub trait SearchIndexer {
    /// Apply the index settings.
    fn configure(&mut self, settings: &IndexSettings) -> Result<()>;

    /// Add (or replace) the documents of one library.
    fn add_documents(&mut self, library: &str, documents: &[SearchDocument]) -> Result<()>;
}

/// Indexer writing `settings.json` and one `<library>.ndjson` per library.
pub struct DirectoryIndexer {
    dir: PathBuf,
}

impl DirectoryIndexer {
    /// Create an indexer writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SearchIndexer for DirectoryIndexer {
    fn configure(&mut self, settings: &IndexSettings) -> Result<()> {
        let data = serde_json::to_vec_pretty(settings)?;
        write_atomic(&self.dir.join("settings.json"), &data)
    }

    fn add_documents(&mut self, library: &str, documents: &[SearchDocument]) -> Result<()> {
        let mut data = Vec::new();
        for document in documents {
            serde_json::to_writer(&mut data, document)?;
            data.push(b'\n');
        }
        write_atomic(&self.dir.join(format!("{}.ndjson", library)), &data)
    }
}

/// Flatten one book with its linked entities.
pub fn build_document(registry: &EntityRegistry<Book>, book: &Book) -> Result<SearchDocument> {
    let authors = registry
        .for_entity::<Author>()
        .collection()?
        .by_book(book.id())
        .into_vec()?;
    let serie = registry
        .for_entity::<Serie>()
        .collection()?
        .by_book(book.id())
        .into_vec()?
        .into_iter()
        .next();
    let tags = registry
        .for_entity::<Tag>()
        .collection()?
        .by_book(book.id())
        .into_vec()?;

    Ok(SearchDocument {
        object_id: format!("{}-{}", registry.library().name(), book.id),
        title: book.title.clone(),
        authors: authors.into_iter().map(|a| a.name).collect(),
        serie_index: serie.as_ref().and(book.series_index),
        serie: serie.map(|s| s.name),
        tags: tags.into_iter().map(|t| t.name).collect(),
    })
}

/// Build and hand over the documents of every book in a library.
pub fn index_library(
    app: &AppContext,
    library: Arc<LibraryContext>,
    indexer: &mut dyn SearchIndexer,
) -> Result<usize> {
    let registry = EntityRegistry::<Book>::new(app.clone(), Arc::clone(&library));

    let documents = registry
        .collection()?
        .all()
        .into_iter()
        .map(|book| build_document(&registry, &book?))
        .collect::<Result<Vec<_>>>()?;

    indexer.add_documents(library.name(), &documents)?;
    tracing::info!(library = %library.name(), documents = documents.len(), "Search documents exported");

    Ok(documents.len())
}
