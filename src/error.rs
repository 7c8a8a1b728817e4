use crate::model::EntityKind;
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// No factory registered for the requested model name.
    #[error("Could not resolve model {0}")]
    Resolution(String),

    /// Entity lookup by primary key found no row.
    #[error("{kind} with id {id} not found")]
    NotFound {
        /// Entity type that was requested.
        kind: EntityKind,
        /// Requested primary key.
        id: i64,
    },

    /// Invalid argument supplied by the caller (e.g. unknown library name).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Thumbnail generation failed for a single cover.
    #[error("Thumbnail {width}x{height} for book {book_id} failed: {reason}")]
    ArtifactGeneration {
        /// Book the thumbnail belongs to.
        book_id: i64,
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Underlying failure.
        reason: String,
    },

    /// One result row could not be turned into an entity.
    #[error("Invalid {kind} row {}: {reason}", row_label(.id))]
    InvalidRow {
        /// Entity type being hydrated.
        kind: EntityKind,
        /// Primary key of the row, when readable.
        id: Option<i64>,
        /// Underlying failure.
        reason: String,
    },

    /// Row data does not match the entity it hydrates.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image processing error.
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (database failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;

fn row_label(id: &Option<i64>) -> String {
    match id {
        Some(id) => format!("with id {}", id),
        None => "without id".to_string(),
    }
}
