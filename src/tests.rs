use crate::config::{Config, INTERNAL_LIBRARY_KEY};
use crate::context::{AppContext, LIBRARY_DB_FILE, LibraryContext, LibrarySelection};
use crate::db::{Database, RowData, parse_calibre_timestamp};
use crate::error::{AppError, Result};
use crate::files::write_atomic;
use crate::library::cover::{
    CoverArtifact, DETAIL_SIZE, ImageThumbnailer, LIST_SIZE, ThumbnailEncoder, ThumbnailSize,
    thumbnail_cache_path,
};
use crate::library::{Author, Book, Serie, Tag};
use crate::model::{Collection, Entity, EntityKind, EntityRegistry, ModelCatalog};
use crate::search::{self, DirectoryIndexer, IndexSettings, SearchIndexer};
use crate::text::{first_letter, remove_accents};
use crate::thumbnails::{Progress, ThumbnailGenerator};
use parking_lot::Mutex;
use rusqlite::params;
use rusqlite::types::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

// ========== FIXTURES ==========

fn create_author(db: &Database, id: i64, name: &str, sort: &str) {
    db.execute(
        "INSERT INTO authors (id, name, sort) VALUES (?1, ?2, ?3)",
        params![id, name, sort],
    )
    .unwrap();
}

fn create_book(db: &Database, id: i64, title: &str, has_cover: bool) {
    db.execute(
        "INSERT INTO books (id, title, sort, author_sort, path, has_cover, series_index, last_modified)
         VALUES (?1, ?2, ?2, NULL, ?3, ?4, 1.0, '2013-01-01 10:00:00+00:00')",
        params![id, title, format!("Author/{} ({})", title, id), has_cover],
    )
    .unwrap();
}

/// A book whose `has_cover` is not a number.
fn create_malformed_book(db: &Database, id: i64) {
    db.execute(
        "INSERT INTO books (id, title, sort, path, has_cover) VALUES (?1, 'Broken', 'Broken', 'Author/Broken', 'yes')",
        params![id],
    )
    .unwrap();
}

fn link(db: &Database, table: &str, column: &str, book: i64, other: i64) {
    db.execute(
        &format!("INSERT INTO {} (book, {}) VALUES (?1, ?2)", table, column),
        params![book, other],
    )
    .unwrap();
}

/// Three authors, four books, one serie, two tags.
fn seed(db: &Database) {
    create_author(db, 1, "Douglas Adams", "Adams, Douglas");
    create_author(db, 2, "Isaac Asimov", "asimov, isaac");
    create_author(db, 3, "Dan Brown", "Brown, Dan");

    create_book(db, 1, "Foundation", true);
    create_book(db, 2, "Foundation and Empire", true);
    create_book(db, 3, "The Hitchhiker's Guide", true);
    create_book(db, 4, "Digital Fortress", false);

    link(db, "books_authors_link", "author", 1, 2);
    link(db, "books_authors_link", "author", 2, 2);
    link(db, "books_authors_link", "author", 3, 1);
    link(db, "books_authors_link", "author", 4, 3);
    // Co-author, linked after the main author
    link(db, "books_authors_link", "author", 3, 2);

    db.execute(
        "INSERT INTO series (id, name, sort) VALUES (1, 'Foundation', 'Foundation')",
        [],
    )
    .unwrap();
    link(db, "books_series_link", "series", 1, 1);
    link(db, "books_series_link", "series", 2, 1);
    db.execute("UPDATE books SET series_index = 2.0 WHERE id = 2", [])
        .unwrap();

    db.execute("INSERT INTO tags (id, name) VALUES (1, 'Science Fiction')", [])
        .unwrap();
    db.execute("INSERT INTO tags (id, name) VALUES (2, 'Humour')", [])
        .unwrap();
    link(db, "books_tags_link", "tag", 1, 1);
    link(db, "books_tags_link", "tag", 2, 1);
    link(db, "books_tags_link", "tag", 3, 1);
    link(db, "books_tags_link", "tag", 3, 2);
}

fn write_cover(library_root: &Path, book: &Book, width: u32, height: u32) {
    let dir = book.folder(library_root);
    std::fs::create_dir_all(&dir).unwrap();
    image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]))
        .save_with_format(dir.join("cover.jpg"), image::ImageFormat::Jpeg)
        .unwrap();
}

struct Fixture {
    dir: TempDir,
    app: AppContext,
    library: Arc<LibraryContext>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_catalog(ModelCatalog::standard())
    }

    fn with_catalog(catalog: ModelCatalog) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_memory().unwrap();
        seed(&db);

        let library = Arc::new(LibraryContext::new(
            "test",
            dir.path().join("library"),
            db,
            dir.path().join("cache"),
        ));

        Self {
            dir,
            app: AppContext::with_catalog(Config::default(), catalog),
            library,
        }
    }

    fn registry<E: Entity>(&self) -> EntityRegistry<E> {
        EntityRegistry::new(self.app.clone(), Arc::clone(&self.library))
    }
}

/// A configured multi-library setup on disk, covers included.
struct DiskFixture {
    dir: TempDir,
    config: Config,
}

impl DiskFixture {
    fn new(names: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache.dir = dir.path().join("cache");

        for name in names {
            let root = dir.path().join("libraries").join(name);
            let db = Database::create(&root.join(LIBRARY_DB_FILE)).unwrap();
            seed(&db);
            for (id, title) in [
                (1, "Foundation"),
                (2, "Foundation and Empire"),
                (3, "The Hitchhiker's Guide"),
            ] {
                let book = Book {
                    id,
                    path: format!("Author/{} ({})", title, id),
                    ..Default::default()
                };
                write_cover(&root, &book, 600, 900);
            }
            config.libraries.insert(name.to_string(), root);
        }

        // Never opened by batch commands
        config.libraries.insert(
            INTERNAL_LIBRARY_KEY.to_string(),
            dir.path().join("does-not-exist"),
        );

        Self { dir, config }
    }

    fn app(&self) -> AppContext {
        AppContext::new(self.config.clone())
    }

    fn library_db(&self, library: &str) -> Database {
        Database::create(&self.config.libraries[library].join(LIBRARY_DB_FILE)).unwrap()
    }

    fn thumbnail(&self, library: &str, book_id: i64, size: ThumbnailSize) -> PathBuf {
        thumbnail_cache_path(&self.config.thumbnail_root(library), book_id, size)
    }
}

fn no_progress(_: Progress<'_>) {}

struct CountingEncoder {
    calls: AtomicUsize,
}

impl CountingEncoder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ThumbnailEncoder for CountingEncoder {
    fn encode(&self, _source: &[u8], size: ThumbnailSize) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(size.to_string().into_bytes())
    }
}

struct FailingEncoder;

impl ThumbnailEncoder for FailingEncoder {
    fn encode(&self, _source: &[u8], _size: ThumbnailSize) -> Result<Vec<u8>> {
        Err(AppError::InvalidFormat("corrupt image".into()))
    }
}

// ========== REGISTRY ==========

#[test]
fn registry_get_model_tries_literal_then_namespaced_name() {
    let fx = Fixture::new();
    let registry = fx.registry::<Book>();

    let book: Book = registry.get_model_as("Book").unwrap();
    assert_eq!(book, Book::default());

    let author: Author = registry.get_model_as("model::Author").unwrap();
    assert_eq!(author, Author::default());
}

#[test]
fn registry_get_model_unknown_name_fails() {
    let fx = Fixture::new();
    let err = fx.registry::<Book>().get_model("DoesNotExist").unwrap_err();
    assert!(matches!(err, AppError::Resolution(ref name) if name.contains("DoesNotExist")));
}

#[test]
fn registry_get_model_wrong_type_fails() {
    let fx = Fixture::new();
    let err = fx
        .registry::<Book>()
        .get_model_as::<Author>("Book")
        .unwrap_err();
    assert!(matches!(err, AppError::Resolution(_)));
}

#[test]
fn registry_get_model_builds_fresh_instances() {
    let fx = Fixture::new();
    let registry = fx.registry::<Book>();

    let mut first: Book = registry.get_model_as("Book").unwrap();
    first.title = "Changed".to_string();
    let second: Book = registry.get_model_as("Book").unwrap();
    assert_eq!(second.title, "Unknown");
}

#[test]
fn registry_resource_is_memoized() {
    let fx = Fixture::new();
    let registry = fx.registry::<Author>();

    let first = registry.resource().unwrap();
    let second = registry.resource().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn registry_clone_does_not_share_resource() {
    let fx = Fixture::new();
    let registry = fx.registry::<Author>();
    let original = registry.resource().unwrap();

    let clone = registry.clone();
    let cloned = clone.resource().unwrap();
    assert!(!Arc::ptr_eq(&original, &cloned));

    // The cloned-from registry keeps its own
    assert!(Arc::ptr_eq(&original, &registry.resource().unwrap()));
}

#[test]
fn registry_unregistered_resource_fails() {
    let mut catalog = ModelCatalog::standard();
    assert!(catalog.unregister("TagResource"));
    let fx = Fixture::with_catalog(catalog);

    let registry = fx.registry::<Tag>();
    assert!(matches!(registry.resource(), Err(AppError::Resolution(_))));
    // The collection is registered separately
    assert_eq!(registry.collection().unwrap().count().unwrap(), 2);
}

#[test]
fn registry_collections_are_not_shared() {
    let fx = Fixture::new();
    let registry = fx.registry::<Book>();

    let first = registry.collection().unwrap();
    first.fetch().unwrap();
    assert!(first.is_loaded());

    let second = registry.collection().unwrap();
    assert!(!second.is_loaded());
}

#[test]
fn registry_for_entity_switches_type() {
    let fx = Fixture::new();
    let books = fx.registry::<Book>();
    let authors = books.for_entity::<Author>();

    assert_eq!(authors.load(2).unwrap().name, "Isaac Asimov");
    assert_eq!(authors.library().name(), "test");
}

#[test]
fn catalog_resolves_entity_names_by_convention() {
    let catalog = ModelCatalog::standard();
    for kind in [
        EntityKind::Book,
        EntityKind::Author,
        EntityKind::Serie,
        EntityKind::Tag,
    ] {
        assert!(catalog.contains(kind.name()));
        assert!(catalog.contains(&kind.resource_name()));
        assert!(catalog.contains(&kind.collection_name()));
    }
    assert!(!ModelCatalog::new().contains("Book"));
}

// ========== RESOURCES ==========

#[test]
fn resource_load_hydrates_target() {
    let fx = Fixture::new();
    let resource = fx.registry::<Author>().resource().unwrap();

    let mut author = Author::default();
    resource.load(1, &mut author).unwrap();
    assert_eq!(author.id, 1);
    assert_eq!(author.name, "Douglas Adams");
    assert_eq!(author.sort.as_deref(), Some("Adams, Douglas"));
}

#[test]
fn resource_load_book_fields() {
    let fx = Fixture::new();
    let book = fx.registry::<Book>().load(2).unwrap();

    assert_eq!(book.title, "Foundation and Empire");
    assert!(book.has_cover);
    assert_eq!(book.series_index, Some(2.0));
    assert_eq!(book.path, "Author/Foundation and Empire (2)");
    assert!(book.last_modified.is_some());
}

#[test]
fn resource_load_missing_id_fails_with_not_found() {
    let fx = Fixture::new();
    let resource = fx.registry::<Author>().resource().unwrap();

    let mut author = Author::default();
    let err = resource.load(999999, &mut author).unwrap_err();
    assert!(matches!(
        err,
        AppError::NotFound {
            kind: EntityKind::Author,
            id: 999999
        }
    ));
    assert!(err.to_string().contains("999999"));
    assert_eq!(author, Author::default());
}

#[test]
fn set_data_is_all_or_nothing() {
    let mut author = Author {
        id: 7,
        name: "Kept".to_string(),
        sort: None,
    };

    let mut row = RowData::new();
    row.insert("id".into(), Value::Integer(8));
    // "name" missing
    row.insert("sort".into(), Value::Text("x".into()));

    assert!(author.set_data(&row).is_err());
    assert_eq!(author.id, 7);
    assert_eq!(author.name, "Kept");
}

#[test]
fn resource_aggregated_list_groups_case_insensitively() {
    let fx = Fixture::new();
    let list = fx
        .registry::<Author>()
        .resource()
        .unwrap()
        .aggregated_list()
        .unwrap();

    let pairs: Vec<(&str, i64)> = list.iter().map(|l| (l.letter.as_str(), l.count)).collect();
    assert_eq!(pairs, vec![("A", 2), ("B", 1)]);
}

#[test]
fn resource_aggregated_list_ignores_accents() {
    let fx = Fixture::new();
    create_author(fx.library.db(), 4, "Émile Zola", "Émile, Zola");
    create_author(fx.library.db(), 5, "Eco", "eco, umberto");

    let list = fx
        .registry::<Author>()
        .resource()
        .unwrap()
        .aggregated_list()
        .unwrap();

    let e = list.iter().find(|l| l.letter == "E").unwrap();
    assert_eq!(e.count, 2);
}

#[test]
fn resource_aggregated_list_folds_non_ascii_case() {
    let fx = Fixture::new();
    create_author(fx.library.db(), 10, "Дмитрий", "Дмитрий");
    create_author(fx.library.db(), 11, "Фёдор Достоевский", "достоевский");
    create_author(fx.library.db(), 12, "Blank", "   ");

    let list = fx
        .registry::<Author>()
        .resource()
        .unwrap()
        .aggregated_list()
        .unwrap();

    let pairs: Vec<(&str, i64)> = list.iter().map(|l| (l.letter.as_str(), l.count)).collect();
    assert_eq!(pairs, vec![("A", 2), ("B", 1), ("Д", 2)]);

    // The filter agrees with the index, whatever the case of the argument
    for letter in ["д", "Д"] {
        let ids: Vec<i64> = fx
            .registry::<Author>()
            .collection()
            .unwrap()
            .by_first_letter(letter)
            .into_vec()
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![10, 11]);
    }
}

#[test]
fn resource_count_books() {
    let fx = Fixture::new();
    let resource = fx.registry::<Author>().resource().unwrap();

    assert_eq!(resource.count_books(2).unwrap(), 3);
    assert_eq!(resource.count_books(3).unwrap(), 1);
    assert_eq!(resource.count_books(42).unwrap(), 0);

    let tags = fx.registry::<Tag>().resource().unwrap();
    assert_eq!(tags.count_books(1).unwrap(), 3);
    assert_eq!(fx.registry::<Serie>().resource().unwrap().count().unwrap(), 1);
}

// ========== COLLECTIONS ==========

#[test]
fn collection_count_does_not_load() {
    let fx = Fixture::new();
    let books = fx.registry::<Book>().collection().unwrap().all();

    assert_eq!(books.count().unwrap(), 4);
    assert!(!books.is_loaded());

    books.fetch().unwrap();
    assert!(books.is_loaded());
    assert_eq!(books.count().unwrap(), 4);
}

#[test]
fn collection_fetch_runs_query_once() {
    let fx = Fixture::new();
    let books = fx.registry::<Book>().collection().unwrap();

    assert_eq!(books.fetch().unwrap().len(), 4);
    create_book(fx.library.db(), 5, "Inferno", false);

    // Memoized: the new row is not seen
    assert_eq!(books.fetch().unwrap().len(), 4);
    // A new collection sees it
    let fresh = fx.registry::<Book>().collection().unwrap();
    assert_eq!(fresh.count().unwrap(), 5);
}

#[test]
fn collection_iterates_in_natural_order() {
    let fx = Fixture::new();
    let titles: Vec<String> = fx
        .registry::<Book>()
        .collection()
        .unwrap()
        .all()
        .into_iter()
        .map(|b| b.unwrap().title)
        .collect();

    assert_eq!(
        titles,
        vec![
            "Digital Fortress",
            "Foundation",
            "Foundation and Empire",
            "The Hitchhiker's Guide"
        ]
    );
}

#[test]
fn collection_book_filters() {
    let fx = Fixture::new();
    let registry = fx.registry::<Book>();

    let ids = |c: Collection<Book>| -> Vec<i64> {
        c.into_vec().unwrap().iter().map(|b| b.id).collect()
    };

    assert_eq!(ids(registry.collection().unwrap().by_author(1)), vec![3]);
    assert_eq!(ids(registry.collection().unwrap().by_serie(1)), vec![1, 2]);
    assert_eq!(ids(registry.collection().unwrap().by_tag(2)), vec![3]);
    assert_eq!(
        ids(registry.collection().unwrap().by_author(2).by_tag(2)),
        vec![3]
    );
    assert_eq!(
        registry.collection().unwrap().by_author(2).count().unwrap(),
        3
    );
}

#[test]
fn collection_by_book_keeps_link_order() {
    let fx = Fixture::new();
    let names: Vec<String> = fx
        .registry::<Author>()
        .collection()
        .unwrap()
        .by_book(3)
        .into_vec()
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();

    assert_eq!(names, vec!["Douglas Adams", "Isaac Asimov"]);
}

#[test]
fn collection_by_first_letter() {
    let fx = Fixture::new();
    let authors = fx
        .registry::<Author>()
        .collection()
        .unwrap()
        .by_first_letter("a")
        .into_vec()
        .unwrap();

    let ids: Vec<i64> = authors.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn collection_iteration_skips_malformed_rows() {
    let fx = Fixture::new();
    create_malformed_book(fx.library.db(), 9);
    let registry = fx.registry::<Book>();

    assert_eq!(registry.collection().unwrap().count().unwrap(), 5);
    assert!(registry.collection().unwrap().fetch().is_err());

    let items: Vec<Result<Book>> = registry.collection().unwrap().into_iter().collect();
    assert_eq!(items.len(), 5);
    assert_eq!(items.iter().filter(|b| b.is_ok()).count(), 4);

    let err = items.into_iter().find_map(|b| b.err()).unwrap();
    assert!(matches!(
        err,
        AppError::InvalidRow {
            kind: EntityKind::Book,
            id: Some(9),
            ..
        }
    ));
    assert!(err.to_string().contains("with id 9"));
}

// ========== TEXT ==========

#[test]
fn remove_accents_strips_diacritics() {
    assert_eq!(remove_accents("Élodie Ångström"), "Elodie Angstrom");
    assert_eq!(remove_accents("Œuvre complète"), "OEuvre complete");
    assert_eq!(remove_accents("Straße"), "Strasze");
    assert_eq!(remove_accents("Søren Łódź"), "Soren Lodz");
    assert_eq!(remove_accents("plain ascii"), "plain ascii");
}

#[test]
fn first_letter_folds_case_and_accents() {
    assert_eq!(first_letter("émile").as_deref(), Some("E"));
    assert_eq!(first_letter("достоевский").as_deref(), Some("Д"));
    assert_eq!(first_letter("ωmega").as_deref(), Some("Ω"));
    assert_eq!(first_letter("  adams").as_deref(), Some("A"));
    assert_eq!(first_letter("   "), None);
    assert_eq!(first_letter(""), None);
}

#[test]
fn calibre_timestamps_parse() {
    assert!(parse_calibre_timestamp("2013-01-01 10:00:00+00:00").is_some());
    assert!(parse_calibre_timestamp("2013-01-01 10:00:00.123456+02:00").is_some());
    assert!(parse_calibre_timestamp("2013-01-01T10:00:00Z").is_some());
    assert!(parse_calibre_timestamp("garbage").is_none());
}

// ========== COVERS ==========

#[test]
fn thumbnail_fit_keeps_aspect_ratio() {
    assert_eq!(DETAIL_SIZE.fit(1000, 2000), (130, 260));
    assert_eq!(DETAIL_SIZE.fit(2000, 1000), (160, 80));
    assert_eq!(LIST_SIZE.fit(600, 900), (80, 120));
    // Never enlarged
    assert_eq!(DETAIL_SIZE.fit(50, 60), (50, 60));

    for (w, h) in [(1, 5000), (5000, 1), (333, 777), (1600, 2600)] {
        let (fw, fh) = LIST_SIZE.fit(w, h);
        assert!(fw >= 1 && fw <= LIST_SIZE.width);
        assert!(fh >= 1 && fh <= LIST_SIZE.height);
    }
}

#[test]
fn thumbnail_cache_path_is_deterministic_and_unique() {
    let root = Path::new("/cache");

    assert_eq!(
        thumbnail_cache_path(root, 1, DETAIL_SIZE),
        thumbnail_cache_path(root, 1, DETAIL_SIZE)
    );
    assert_eq!(
        thumbnail_cache_path(root, 1, DETAIL_SIZE),
        PathBuf::from("/cache/160x260/1.jpg")
    );
    assert_ne!(
        thumbnail_cache_path(root, 1, DETAIL_SIZE),
        thumbnail_cache_path(root, 2, DETAIL_SIZE)
    );
    assert_ne!(
        thumbnail_cache_path(root, 1, DETAIL_SIZE),
        thumbnail_cache_path(root, 1, LIST_SIZE)
    );
    // 1x23 and 12x3 must not collide
    assert_ne!(
        thumbnail_cache_path(root, 1, ThumbnailSize::new(1, 23)),
        thumbnail_cache_path(root, 1, ThumbnailSize::new(12, 3))
    );
}

#[test]
fn cover_generates_thumbnail_within_box() {
    let fx = Fixture::new();
    let book = fx.registry::<Book>().load(1).unwrap();
    write_cover(fx.library.root(), &book, 1000, 2000);

    let mut cover = book.cover(&fx.library, Arc::new(ImageThumbnailer::default()));
    let path = cover.thumbnail_path(160, 260).unwrap().unwrap();

    assert_eq!(path, fx.dir.path().join("cache").join("160x260").join("1.jpg"));
    let img = image::open(&path).unwrap();
    assert_eq!((img.width(), img.height()), (130, 260));

    let path = cover.thumbnail_path(80, 120).unwrap().unwrap();
    let img = image::open(&path).unwrap();
    assert!(img.width() <= 80 && img.height() <= 120);
    assert_eq!(img.height(), 120);
}

#[test]
fn cover_is_generated_once() {
    let fx = Fixture::new();
    let book = fx.registry::<Book>().load(1).unwrap();
    write_cover(fx.library.root(), &book, 300, 450);
    let encoder = CountingEncoder::new();

    let mut first = book.cover(&fx.library, encoder.clone());
    let a = first.resolve(DETAIL_SIZE).unwrap().unwrap();
    let b = first.resolve(DETAIL_SIZE).unwrap().unwrap();
    assert!(a.generated);
    assert!(!b.generated);

    // A new artifact finds the cached file
    let mut second = book.cover(&fx.library, encoder.clone());
    let c = second.resolve(DETAIL_SIZE).unwrap().unwrap();
    assert!(!c.generated);

    assert_eq!(a.path, b.path);
    assert_eq!(a.path, c.path);
    assert_eq!(encoder.calls(), 1);
    assert_eq!(std::fs::read(&a.path).unwrap(), b"160x260");
}

#[test]
fn cover_without_source_yields_nothing() {
    let fx = Fixture::new();
    let book = fx.registry::<Book>().load(4).unwrap();
    let encoder = CountingEncoder::new();

    let mut cover = book.cover(&fx.library, encoder.clone());
    assert!(cover.source().is_none());
    assert_eq!(cover.thumbnail_path(160, 260).unwrap(), None);
    assert_eq!(encoder.calls(), 0);
}

#[test]
fn cover_failure_leaves_no_file() {
    let fx = Fixture::new();
    let book = fx.registry::<Book>().load(1).unwrap();
    write_cover(fx.library.root(), &book, 300, 450);

    let mut cover = book.cover(&fx.library, Arc::new(FailingEncoder));
    let err = cover.resolve(DETAIL_SIZE).unwrap_err();
    assert!(matches!(
        err,
        AppError::ArtifactGeneration {
            book_id: 1,
            width: 160,
            height: 260,
            ..
        }
    ));

    assert!(!cover.cache_path(DETAIL_SIZE).exists());
    let size_dir = fx.library.thumbnail_root().join(DETAIL_SIZE.to_string());
    let leftovers = std::fs::read_dir(&size_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn cover_write_failure_leaves_no_temp_file() {
    let fx = Fixture::new();
    let book = fx.registry::<Book>().load(1).unwrap();
    write_cover(fx.library.root(), &book, 300, 450);

    let mut cover = book.cover(&fx.library, CountingEncoder::new());
    // The final path is taken by a directory, so the rename fails
    let target = cover.cache_path(DETAIL_SIZE);
    std::fs::create_dir_all(&target).unwrap();

    assert!(matches!(
        cover.resolve(DETAIL_SIZE),
        Err(AppError::ArtifactGeneration { book_id: 1, .. })
    ));

    let entries: Vec<PathBuf> = std::fs::read_dir(target.parent().unwrap())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(entries, vec![target.clone()]);
    assert!(target.is_dir());
}

#[test]
fn write_atomic_replaces_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("file.json");

    write_atomic(&path, b"first").unwrap();
    write_atomic(&path, b"second").unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"second");
    assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
}

#[test]
fn cover_missing_source_file_is_an_error() {
    let fx = Fixture::new();
    // has_cover is set but no file was written
    let book = fx.registry::<Book>().load(2).unwrap();

    let mut cover = book.cover(&fx.library, CountingEncoder::new());
    assert!(matches!(
        cover.resolve(LIST_SIZE),
        Err(AppError::ArtifactGeneration { book_id: 2, .. })
    ));
}

#[test]
fn cover_rejects_empty_box() {
    let mut cover = CoverArtifact::new(
        1,
        Some(PathBuf::from("/nowhere/cover.jpg")),
        "/cache",
        CountingEncoder::new(),
    );
    assert!(matches!(
        cover.thumbnail_path(0, 120),
        Err(AppError::InvalidArgument(_))
    ));
}

// ========== THUMBNAIL GENERATOR ==========

#[test]
fn selection_parses_all_and_names() {
    assert_eq!(
        "all".parse::<LibrarySelection>().unwrap(),
        LibrarySelection::All
    );
    assert_eq!(
        "calibre".parse::<LibrarySelection>().unwrap(),
        LibrarySelection::Named("calibre".into())
    );
    assert!(INTERNAL_LIBRARY_KEY.parse::<LibrarySelection>().is_err());
}

#[test]
fn select_all_skips_internal_library() {
    let fx = DiskFixture::new(&["comics", "novels"]);
    let names = fx.app().select_libraries(&LibrarySelection::All).unwrap();
    assert_eq!(names, vec!["comics", "novels"]);
}

#[test]
fn generator_unknown_library_fails_before_work() {
    let fx = DiskFixture::new(&["novels"]);
    let encoder = CountingEncoder::new();
    let generator = ThumbnailGenerator::new(fx.app()).with_encoder(encoder.clone());

    let err = generator
        .run(&LibrarySelection::Named("missing".into()), &no_progress)
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));
    assert_eq!(encoder.calls(), 0);
    assert!(!fx.config.cache.dir.exists());
}

#[test]
fn generator_processes_every_library() {
    let fx = DiskFixture::new(&["comics", "novels"]);
    let generator = ThumbnailGenerator::new(fx.app());
    let calls = AtomicUsize::new(0);

    let reports = generator
        .run(&LibrarySelection::All, &|progress: Progress<'_>| {
            assert!(progress.processed <= progress.total);
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.total, 4);
        assert_eq!(report.processed, 4);
        assert_eq!(report.generated, 6);
        assert_eq!(report.without_cover, 1);
        assert!(report.failures.is_empty());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 8);

    for library in ["comics", "novels"] {
        for id in 1..=3 {
            assert!(fx.thumbnail(library, id, DETAIL_SIZE).is_file());
            assert!(fx.thumbnail(library, id, LIST_SIZE).is_file());
        }
        assert!(!fx.thumbnail(library, 4, DETAIL_SIZE).exists());
    }
}

#[test]
fn generator_second_run_hits_cache() {
    let fx = DiskFixture::new(&["novels"]);
    let encoder = CountingEncoder::new();
    let generator = ThumbnailGenerator::new(fx.app()).with_encoder(encoder.clone());
    let selection = LibrarySelection::Named("novels".into());

    generator.run(&selection, &no_progress).unwrap();
    assert_eq!(encoder.calls(), 6);

    let reports = generator.run(&selection, &no_progress).unwrap();
    assert_eq!(encoder.calls(), 6);
    assert_eq!(reports[0].generated, 0);
    assert_eq!(reports[0].cached, 6);
}

#[test]
fn generator_isolates_book_failures() {
    let fx = DiskFixture::new(&["novels"]);
    let root = fx.config.libraries["novels"].clone();
    std::fs::remove_file(root.join("Author/Foundation (1)/cover.jpg")).unwrap();

    let generator = ThumbnailGenerator::new(fx.app());
    let reports = generator
        .run(&LibrarySelection::Named("novels".into()), &no_progress)
        .unwrap();

    let report = &reports[0];
    assert_eq!(report.processed, 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].book_id, 1);
    assert_eq!(report.generated, 4);
    assert!(fx.thumbnail("novels", 2, DETAIL_SIZE).is_file());
}

#[test]
fn generator_stops_on_cancel() {
    let fx = DiskFixture::new(&["comics", "novels"]);
    let generator = ThumbnailGenerator::new(fx.app()).with_encoder(CountingEncoder::new());
    let cancel = generator.cancel_flag();

    let reports = generator
        .run(&LibrarySelection::All, &|_: Progress<'_>| cancel.cancel())
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].processed, 1);
    assert!(reports[0].cancelled);
}

#[test]
fn generator_parallel_matches_sequential() {
    let fx = DiskFixture::new(&["novels"]);
    let encoder = CountingEncoder::new();
    let generator = ThumbnailGenerator::new(fx.app())
        .with_encoder(encoder.clone())
        .with_workers(3);

    let reports = generator.run(&LibrarySelection::All, &no_progress).unwrap();
    assert_eq!(reports[0].processed, 4);
    assert_eq!(reports[0].generated, 6);
    assert_eq!(reports[0].without_cover, 1);
    assert_eq!(encoder.calls(), 6);
}

#[test]
fn generator_records_unreadable_rows() {
    for workers in [1, 3] {
        let fx = DiskFixture::new(&["novels"]);
        create_malformed_book(&fx.library_db("novels"), 9);

        let generator = ThumbnailGenerator::new(fx.app()).with_workers(workers);
        let reports = generator.run(&LibrarySelection::All, &no_progress).unwrap();

        let report = &reports[0];
        assert_eq!(report.total, 5);
        assert_eq!(report.processed, 5);
        assert_eq!(report.generated, 6);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].book_id, 9);
    }
}

#[test]
fn generator_parallel_sends_completion_last() {
    let fx = DiskFixture::new(&["novels"]);
    let generator = ThumbnailGenerator::new(fx.app())
        .with_encoder(CountingEncoder::new())
        .with_workers(3);
    let seen = Mutex::new(Vec::new());

    generator
        .run(&LibrarySelection::All, &|progress: Progress<'_>| {
            seen.lock().push(progress.processed)
        })
        .unwrap();

    let seen = seen.into_inner();
    assert_eq!(seen.last(), Some(&4));
    assert_eq!(seen.iter().filter(|&&n| n == 4).count(), 1);
    assert_eq!(seen.len(), 4);
}

#[test]
fn library_context_uses_configured_cache_root() {
    let fx = DiskFixture::new(&["novels"]);
    let library = fx.app().library("novels").unwrap();

    assert_eq!(library.name(), "novels");
    assert_eq!(
        library.thumbnail_root(),
        fx.dir.path().join("cache").join("thumbnails").join("novels")
    );
    assert!(matches!(
        fx.app().library(INTERNAL_LIBRARY_KEY),
        Err(AppError::InvalidArgument(_))
    ));
}

// ========== SEARCH ==========

#[test]
fn search_document_flattens_book() {
    let fx = Fixture::new();
    let registry = fx.registry::<Book>();

    let book = registry.load(2).unwrap();
    let doc = search::build_document(&registry, &book).unwrap();
    assert_eq!(doc.object_id, "test-2");
    assert_eq!(doc.authors, vec!["Isaac Asimov"]);
    assert_eq!(doc.serie.as_deref(), Some("Foundation"));
    assert_eq!(doc.serie_index, Some(2.0));
    assert_eq!(doc.tags, vec!["Science Fiction"]);

    let book = registry.load(4).unwrap();
    let doc = search::build_document(&registry, &book).unwrap();
    assert_eq!(doc.serie, None);
    assert_eq!(doc.serie_index, None);

    let json = serde_json::to_value(&doc).unwrap();
    assert!(json.get("objectID").is_some());
    assert!(json.get("serieIndex").is_some());
}

#[test]
fn search_index_library_writes_documents() {
    let fx = Fixture::new();
    let out = fx.dir.path().join("index");
    let mut indexer = DirectoryIndexer::new(&out);

    indexer.configure(&IndexSettings::new("books")).unwrap();
    let count = search::index_library(&fx.app, Arc::clone(&fx.library), &mut indexer).unwrap();
    assert_eq!(count, 4);

    let settings: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join("settings.json")).unwrap()).unwrap();
    assert_eq!(settings["customRanking"][0], "desc(serieIndex)");
    assert_eq!(settings["attributesToIndex"].as_array().unwrap().len(), 5);

    let lines = std::fs::read_to_string(out.join("test.ndjson")).unwrap();
    assert_eq!(lines.lines().count(), 4);
}

// ========== CONFIG ==========

#[test]
fn config_parses_libraries() {
    let config = Config::parse(
        r#"
        [cache]
        dir = "/var/cache/cops"

        [thumbnails]
        workers = 4

        [libraries]
        calibre = "/srv/calibre"
        internal = "/srv/internal"
        "#,
    )
    .unwrap();

    assert_eq!(config.thumbnails.workers, 4);
    assert_eq!(config.thumbnails.quality, 85);
    let names: Vec<&String> = config.book_libraries().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["calibre"]);
    assert_eq!(
        config.thumbnail_root("calibre"),
        PathBuf::from("/var/cache/cops/thumbnails/calibre")
    );
}

#[test]
fn default_config_parses() {
    let config = Config::parse(&Config::generate_default()).unwrap();
    assert!(config.libraries.is_empty());
}
