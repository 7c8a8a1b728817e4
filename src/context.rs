//! Application and library contexts.
//!
//! Everything that needs configuration, the model catalog or a library
//! connection receives one of these explicitly.

use crate::config::{ALL_LIBRARIES, Config, INTERNAL_LIBRARY_KEY};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::model::ModelCatalog;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// File name of a Calibre library database.
pub const LIBRARY_DB_FILE: &str = "metadata.db";

/// Shared application context.
#[derive(Clone)]
pub struct AppContext {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Registered model factories.
    pub catalog: Arc<ModelCatalog>,
}

impl AppContext {
    /// Create a context with the standard model catalog.
    pub fn new(config: Config) -> Self {
        Self::with_catalog(config, ModelCatalog::standard())
    }

    /// Create a context with a custom model catalog.
    pub fn with_catalog(config: Config, catalog: ModelCatalog) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
        }
    }

    /// Resolve a selection into library names, failing on unknown names.
    pub fn select_libraries(&self, selection: &LibrarySelection) -> Result<Vec<String>> {
        match selection {
            LibrarySelection::All => Ok(self
                .config
                .book_libraries()
                .map(|(name, _)| name.clone())
                .collect()),
            LibrarySelection::Named(name) => {
                if self.config.book_libraries().any(|(n, _)| n == name) {
                    Ok(vec![name.clone()])
                } else {
                    Err(AppError::InvalidArgument(format!(
                        "Database {} does not exist",
                        name
                    )))
                }
            }
        }
    }

    /// Open the context of a configured library.
    pub fn library(&self, name: &str) -> Result<Arc<LibraryContext>> {
        let root = self
            .config
            .book_libraries()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, path)| path.clone())
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("Database {} does not exist", name))
            })?;

        let db = Database::open(&root.join(LIBRARY_DB_FILE))?;

        Ok(Arc::new(LibraryContext::new(
            name,
            root,
            db,
            self.config.thumbnail_root(name),
        )))
    }
}

/// The active library: one Calibre database and its cache location.
pub struct LibraryContext {
    name: String,
    root: PathBuf,
    db: Database,
    thumbnail_root: PathBuf,
}

impl LibraryContext {
    /// Create a library context from its parts.
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        db: Database,
        thumbnail_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            db,
            thumbnail_root: thumbnail_root.into(),
        }
    }

    /// Library name, as configured.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Library root directory (book folders are relative to it).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Library database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Root directory of this library's thumbnail cache.
    pub fn thumbnail_root(&self) -> &Path {
        &self.thumbnail_root
    }
}

/// Libraries a batch command runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySelection {
    /// Every book library (the internal one excluded).
    All,
    /// One library by name.
    Named(String),
}

impl FromStr for LibrarySelection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(AppError::InvalidArgument("Empty database name".into())),
            ALL_LIBRARIES => Ok(LibrarySelection::All),
            INTERNAL_LIBRARY_KEY => Err(AppError::InvalidArgument(format!(
                "Database {} is reserved",
                INTERNAL_LIBRARY_KEY
            ))),
            name => Ok(LibrarySelection::Named(name.to_string())),
        }
    }
}
