//! Domain entities of a Calibre library.

mod author;
mod book;
pub mod cover;
mod serie;
mod tag;

pub use author::Author;
pub use book::Book;
pub use cover::{CoverArtifact, ImageThumbnailer, Thumbnail, ThumbnailEncoder, ThumbnailSize};
pub use serie::Serie;
pub use tag::Tag;
