//! cops-rs: core of a Calibre library browser.
//!
//! This crate provides the data-access runtime shared by every view of a
//! Calibre library, and the batch jobs built on it.
//!
//! # Features
//!
//! - Entity registry resolving resources and collections by entity type
//! - Book, author, serie and tag models read from `metadata.db`
//! - Idempotent cover thumbnail cache with atomic writes
//! - Batch thumbnail generation over several libraries
//! - Search document export

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Application and library contexts.
pub mod context;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// File helpers.
pub mod files;
/// Library entities and covers.
pub mod library;
/// Entity registry, resources and collections.
pub mod model;
/// Search document export.
pub mod search;
/// Text helpers.
pub mod text;
/// Batch thumbnail generation.
pub mod thumbnails;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use context::{AppContext, LibraryContext, LibrarySelection};
pub use db::Database;
pub use error::{AppError, Result};
pub use model::{Collection, Entity, EntityKind, EntityRegistry, EntityResource};
pub use thumbnails::ThumbnailGenerator;
