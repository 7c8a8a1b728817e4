//! Batch thumbnail generation over one or all libraries.

use crate::context::{AppContext, LibraryContext, LibrarySelection};
use crate::error::{AppError, Result};
use crate::library::Book;
use crate::library::cover::{
    DETAIL_SIZE, ImageThumbnailer, LIST_SIZE, ThumbnailEncoder, ThumbnailSize,
};
use crate::model::EntityRegistry;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Sizes generated for every book: detail view, then list view.
pub const THUMBNAIL_SIZES: [ThumbnailSize; 2] = [DETAIL_SIZE, LIST_SIZE];

/// Books between two progress log lines.
const LOG_EVERY: usize = 100;

/// Progress of one library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress<'a> {
    /// Library being processed.
    pub library: &'a str,
    /// Books processed so far.
    pub processed: usize,
    /// Books in the library.
    pub total: usize,
}

/// A book whose thumbnails could not be generated.
#[derive(Debug, Clone, Serialize)]
pub struct BookFailure {
    /// Book id.
    pub book_id: i64,
    /// Book title.
    pub title: String,
    /// Error message.
    pub error: String,
}

/// Outcome of one library run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LibraryReport {
    /// Library name.
    pub library: String,
    /// Books in the library.
    pub total: usize,
    /// Books processed (including failed ones).
    pub processed: usize,
    /// Thumbnails written by this run.
    pub generated: usize,
    /// Thumbnails already in the cache.
    pub cached: usize,
    /// Books without a cover.
    pub without_cover: usize,
    /// Books that failed.
    pub failures: Vec<BookFailure>,
    /// Whether the run stopped on cancellation.
    pub cancelled: bool,
}

impl LibraryReport {
    /// Record a book row that could not be read. Its id is 0 when unreadable.
    fn record_invalid(&mut self, error: AppError) {
        self.processed += 1;
        let book_id = match &error {
            AppError::InvalidRow { id, .. } => id.unwrap_or_default(),
            _ => 0,
        };
        tracing::warn!(book = book_id, error = %error, "Unreadable book row");
        self.failures.push(BookFailure {
            book_id,
            title: String::new(),
            error: error.to_string(),
        });
    }

    fn record(&mut self, book: &Book, outcome: Result<BookOutcome>) {
        self.processed += 1;
        match outcome {
            Ok(BookOutcome::NoCover) => self.without_cover += 1,
            Ok(BookOutcome::Done { generated, cached }) => {
                self.generated += generated;
                self.cached += cached;
            }
            Err(e) => {
                tracing::warn!(book = book.id, title = %book.title, error = %e, "Thumbnail generation failed");
                self.failures.push(BookFailure {
                    book_id: book.id,
                    title: book.title.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
}

enum BookOutcome {
    NoCover,
    Done { generated: usize, cached: usize },
}

/// Cooperative cancellation signal, checked before each book.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Generates the cover thumbnails of every book.
pub struct ThumbnailGenerator {
    app: AppContext,
    encoder: Arc<dyn ThumbnailEncoder>,
    sizes: Vec<ThumbnailSize>,
    workers: usize,
    cancel: CancelFlag,
}

impl ThumbnailGenerator {
    /// Create a generator configured from the application config.
    pub fn new(app: AppContext) -> Self {
        let encoder = Arc::new(ImageThumbnailer::new(app.config.thumbnails.quality));
        let workers = app.config.thumbnails.workers;
        Self {
            app,
            encoder,
            sizes: THUMBNAIL_SIZES.to_vec(),
            workers,
            cancel: CancelFlag::default(),
        }
    }

    /// Use another image encoder.
    pub fn with_encoder(mut self, encoder: Arc<dyn ThumbnailEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Number of parallel workers (1 = sequential).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Handle that stops the run before the next book.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Generate thumbnails for the selected libraries.
    ///
    /// An unknown library name fails before any book is touched.
    pub fn run(
        &self,
        selection: &LibrarySelection,
        on_progress: &(dyn Fn(Progress<'_>) + Sync),
    ) -> Result<Vec<LibraryReport>> {
        let names = self.app.select_libraries(selection)?;
        let mut reports = Vec::with_capacity(names.len());

        for name in names {
            if self.cancel.is_cancelled() {
                break;
            }
            let library = self.app.library(&name)?;
            reports.push(self.generate_library(library, on_progress)?);
        }

        Ok(reports)
    }

    /// Generate thumbnails for every book of one library.
    pub fn generate_library(
        &self,
        library: Arc<LibraryContext>,
        on_progress: &(dyn Fn(Progress<'_>) + Sync),
    ) -> Result<LibraryReport> {
        let start = std::time::Instant::now();
        let registry = EntityRegistry::<Book>::new(self.app.clone(), Arc::clone(&library));
        let books = registry.collection()?.all();
        let total = books.count()?;

        tracing::info!(
            library = %library.name(),
            books = total,
            workers = self.workers,
            "Generating all book thumbnails"
        );

        let mut report = LibraryReport {
            library: library.name().to_string(),
            total,
            ..Default::default()
        };

        if self.workers <= 1 {
            for book in books {
                if self.cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                match book {
                    Ok(book) => report.record(&book, self.process_book(&library, &book)),
                    Err(e @ AppError::InvalidRow { .. }) => report.record_invalid(e),
                    Err(e) => return Err(e),
                }
                self.progress(library.name(), report.processed, total, on_progress);
            }
        } else {
            // Collection fetch stays outside the parallel region
            let mut valid = Vec::with_capacity(total);
            for book in books {
                match book {
                    Ok(book) => valid.push(book),
                    Err(e @ AppError::InvalidRow { .. }) => report.record_invalid(e),
                    Err(e) => return Err(e),
                }
            }
            report = self.generate_parallel(&library, valid, report, on_progress)?;
        }

        tracing::info!(
            library = %library.name(),
            processed = report.processed,
            generated = report.generated,
            cached = report.cached,
            without_cover = report.without_cover,
            failed = report.failures.len(),
            elapsed = ?start.elapsed(),
            "Thumbnail generation done"
        );

        Ok(report)
    }

    fn generate_parallel(
        &self,
        library: &LibraryContext,
        books: Vec<Book>,
        report: LibraryReport,
        on_progress: &(dyn Fn(Progress<'_>) + Sync),
    ) -> Result<LibraryReport> {
        let total = report.total;
        let processed = AtomicUsize::new(report.processed);
        let report = Mutex::new(report);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build thread pool: {}", e)))?;

        pool.install(|| {
            books.par_iter().for_each(|book| {
                if self.cancel.is_cancelled() {
                    report.lock().cancelled = true;
                    return;
                }

                let outcome = self.process_book(library, book);
                report.lock().record(book, outcome);

                // Updates may arrive out of order; the last one is sent below
                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if done < total {
                    self.progress(library.name(), done, total, on_progress);
                }
            });
        });

        let report = report.into_inner();
        self.progress(library.name(), report.processed, total, on_progress);
        Ok(report)
    }

    /// Both sizes of one book; the first failure ends the book.
    fn process_book(&self, library: &LibraryContext, book: &Book) -> Result<BookOutcome> {
        let mut cover = book.cover(library, Arc::clone(&self.encoder));
        let mut generated = 0;
        let mut cached = 0;

        for size in &self.sizes {
            match cover.resolve(*size)? {
                None => return Ok(BookOutcome::NoCover),
                Some(thumbnail) if thumbnail.generated => generated += 1,
                Some(_) => cached += 1,
            }
        }

        Ok(BookOutcome::Done { generated, cached })
    }

    fn progress(
        &self,
        library: &str,
        processed: usize,
        total: usize,
        on_progress: &(dyn Fn(Progress<'_>) + Sync),
    ) {
        if processed % LOG_EVERY == 0 || processed == total {
            let percent = (processed * 100).checked_div(total).unwrap_or(100);
            tracing::info!(library = %library, "Processing... {}/{} ({}%)", processed, total, percent);
        }

        on_progress(Progress {
            library,
            processed,
            total,
        });
    }
}
