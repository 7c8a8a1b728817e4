//! Cover thumbnails and their on-disk cache.
//!
//! A thumbnail is identified by (book id, width, height). Its cache path is a
//! pure function of those three values and the library's cache root, so a
//! second request for the same thumbnail only checks that the file exists.

use crate::error::{AppError, Result};
use crate::files::write_atomic;
use image::ImageReader;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Thumbnail shown on book detail pages.
pub const DETAIL_SIZE: ThumbnailSize = ThumbnailSize::new(160, 260);

/// Thumbnail shown in book lists.
pub const LIST_SIZE: ThumbnailSize = ThumbnailSize::new(80, 120);

/// Default JPEG quality (1-100).
pub const DEFAULT_QUALITY: u8 = 85;

/// Bounding box of a thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThumbnailSize {
    /// Maximum width in pixels.
    pub width: u32,
    /// Maximum height in pixels.
    pub height: u32,
}

impl ThumbnailSize {
    /// Create a bounding box.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of a `src_width` x `src_height` image scaled to fit inside the box.
    ///
    /// The aspect ratio is kept and images already inside the box are not enlarged.
    pub fn fit(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        if src_width == 0 || src_height == 0 {
            return (0, 0);
        }
        if src_width <= self.width && src_height <= self.height {
            return (src_width, src_height);
        }

        let scale = f64::min(
            self.width as f64 / src_width as f64,
            self.height as f64 / src_height as f64,
        );
        let width = ((src_width as f64 * scale).round() as u32).clamp(1, self.width);
        let height = ((src_height as f64 * scale).round() as u32).clamp(1, self.height);

        (width, height)
    }
}

impl fmt::Display for ThumbnailSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Cache path of a thumbnail: `<root>/<width>x<height>/<book id>.jpg`.
pub fn thumbnail_cache_path(cache_root: &Path, book_id: i64, size: ThumbnailSize) -> PathBuf {
    cache_root
        .join(size.to_string())
        .join(format!("{}.jpg", book_id))
}

/// Turns source image bytes into encoded thumbnail bytes.
pub trait ThumbnailEncoder: Send + Sync {
    /// Resize `source` to fit within `size` and encode it.
    fn encode(&self, source: &[u8], size: ThumbnailSize) -> Result<Vec<u8>>;
}

/// JPEG thumbnails through the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageThumbnailer {
    quality: u8,
}

impl ImageThumbnailer {
    /// Create an encoder with the given JPEG quality (clamped to 1-100).
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for ImageThumbnailer {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl ThumbnailEncoder for ImageThumbnailer {
    fn encode(&self, source: &[u8], size: ThumbnailSize) -> Result<Vec<u8>> {
        let img = ImageReader::new(Cursor::new(source))
            .with_guessed_format()?
            .decode()?;

        let (width, height) = size.fit(img.width(), img.height());
        let resized = if (width, height) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(width, height, FilterType::Lanczos3)
        };

        // JPEG has no alpha channel
        let rgb = resized.to_rgb8();

        let mut jpeg_data = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_data, self.quality);
        encoder.encode_image(&rgb)?;

        Ok(jpeg_data)
    }
}

/// A resolved thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    /// Cache file.
    pub path: PathBuf,
    /// Whether this request wrote the file.
    pub generated: bool,
}

/// Cover image of one book and the thumbnails derived from it.
pub struct CoverArtifact {
    book_id: i64,
    source: Option<PathBuf>,
    cache_root: PathBuf,
    encoder: Arc<dyn ThumbnailEncoder>,
    resolved: HashMap<ThumbnailSize, PathBuf>,
}

impl CoverArtifact {
    /// Create the artifact of a book. `source` is `None` when the book has no cover.
    pub fn new(
        book_id: i64,
        source: Option<PathBuf>,
        cache_root: impl Into<PathBuf>,
        encoder: Arc<dyn ThumbnailEncoder>,
    ) -> Self {
        Self {
            book_id,
            source,
            cache_root: cache_root.into(),
            encoder,
            resolved: HashMap::new(),
        }
    }

    /// Owning book.
    pub fn book_id(&self) -> i64 {
        self.book_id
    }

    /// Source cover image, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Cache path of the thumbnail at `size`.
    pub fn cache_path(&self, size: ThumbnailSize) -> PathBuf {
        thumbnail_cache_path(&self.cache_root, self.book_id, size)
    }

    /// Path of the `width` x `height` thumbnail, generating it if missing.
    ///
    /// Returns `None` when the book has no cover.
    pub fn thumbnail_path(&mut self, width: u32, height: u32) -> Result<Option<PathBuf>> {
        Ok(self
            .resolve(ThumbnailSize::new(width, height))?
            .map(|thumbnail| thumbnail.path))
    }

    /// Resolve the thumbnail at `size`: cache hit, or generate and persist.
    pub fn resolve(&mut self, size: ThumbnailSize) -> Result<Option<Thumbnail>> {
        if size.width == 0 || size.height == 0 {
            return Err(AppError::InvalidArgument(format!(
                "Invalid thumbnail size {}",
                size
            )));
        }

        let Some(source) = self.source.clone() else {
            return Ok(None);
        };

        if let Some(path) = self.resolved.get(&size) {
            return Ok(Some(Thumbnail {
                path: path.clone(),
                generated: false,
            }));
        }

        let path = self.cache_path(size);
        let generated = if path.is_file() {
            false
        } else {
            self.generate(&source, &path, size)
                .map_err(|e| AppError::ArtifactGeneration {
                    book_id: self.book_id,
                    width: size.width,
                    height: size.height,
                    reason: e.to_string(),
                })?;
            tracing::debug!(book = self.book_id, size = %size, path = %path.display(), "Thumbnail generated");
            true
        };

        self.resolved.insert(size, path.clone());
        Ok(Some(Thumbnail { path, generated }))
    }

    fn generate(&self, source: &Path, path: &Path, size: ThumbnailSize) -> Result<()> {
        let data = std::fs::read(source)?;
        let encoded = self.encoder.encode(&data, size)?;
        write_atomic(path, &encoded)
    }
}
