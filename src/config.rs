use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Library key reserved for the application's own database.
///
/// It is never treated as a book library by batch commands.
pub const INTERNAL_LIBRARY_KEY: &str = "internal";

/// Value of `--database` selecting every book library.
pub const ALL_LIBRARIES: &str = "all";

/// Calibre library browser tools.
#[derive(Parser, Debug, Clone)]
#[command(name = "cops-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "COPS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate the thumbnails for every book.
    #[command(name = "generate:thumbnails", alias = "thumbnails")]
    GenerateThumbnails {
        /// Selected database (a configured library name, or "all").
        #[arg(long, default_value = ALL_LIBRARIES)]
        database: String,
    },

    /// Export search documents for every book.
    #[command(name = "search:index")]
    SearchIndex {
        /// Selected database (a configured library name, or "all").
        #[arg(long, default_value = ALL_LIBRARIES)]
        database: String,

        /// Directory receiving the index settings and documents.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Create a default config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Thumbnail generation configuration.
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    /// Search export configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Calibre libraries, keyed by name. Each path is a directory holding `metadata.db`.
    #[serde(default)]
    pub libraries: BTreeMap<String, PathBuf>,
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory for generated artifacts.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

/// Thumbnail generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// JPEG quality (1-100).
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Number of parallel workers (1 = sequential).
    /// Keep low for NAS/network storage to avoid saturation.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            workers: default_workers(),
        }
    }
}

fn default_quality() -> u8 {
    85
}

fn default_workers() -> usize {
    1
}

/// Search export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the search index documents are pushed to.
    #[serde(default = "default_index_name")]
    pub index_name: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_name: default_index_name(),
        }
    }
}

fn default_index_name() -> String {
    "books".to_string()
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("cops-rs.toml"),
            dirs::config_dir()
                .map(|p| p.join("cops-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/cops-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Book libraries, i.e. every configured library except the internal one.
    pub fn book_libraries(&self) -> impl Iterator<Item = (&String, &PathBuf)> {
        self.libraries
            .iter()
            .filter(|(name, _)| name.as_str() != INTERNAL_LIBRARY_KEY)
    }

    /// Cache root for thumbnails of the given library.
    pub fn thumbnail_root(&self, library: &str) -> PathBuf {
        self.cache.dir.join("thumbnails").join(library)
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# cops-rs configuration

[cache]
# dir = "/var/cache/cops-rs"
dir = "data/cache"

[thumbnails]
# JPEG quality (1-100)
quality = 85
# Parallel workers (1 = sequential)
workers = 1

[search]
index_name = "books"

# Calibre libraries (directories containing metadata.db)
[libraries]
# calibre = "/mnt/nas/Calibre Library"
# comics = "/mnt/nas/Comics"
"#
        .to_string()
    }
}
