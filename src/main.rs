//! cops-rs command line entry point.

use clap::Parser;
use cops_rs::{
    config::{Cli, Command, Config},
    context::{AppContext, LibrarySelection},
    search::{self, DirectoryIndexer, IndexSettings, SearchIndexer},
    thumbnails::{Progress, ThumbnailGenerator},
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cops_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        tracing::debug!(path = %path.display(), "Loading config");
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Command::GenerateThumbnails { database } => cmd_thumbnails(config, &database),
        Command::SearchIndex { database, output } => cmd_search_index(config, &database, &output),
        Command::Init { force } => cmd_init(force),
    }
}

/// Generate the thumbnails of every book.
fn cmd_thumbnails(config: Config, database: &str) -> anyhow::Result<ExitCode> {
    let selection: LibrarySelection = database.parse()?;
    let generator = ThumbnailGenerator::new(AppContext::new(config));

    let reports = generator.run(&selection, &print_progress)?;

    let mut failed = 0;
    for report in &reports {
        println!(
            "{}: {}/{} books, {} generated, {} cached, {} without cover, {} failed",
            report.library,
            report.processed,
            report.total,
            report.generated,
            report.cached,
            report.without_cover,
            report.failures.len()
        );
        for failure in &report.failures {
            println!("  book {} ({}): {}", failure.book_id, failure.title, failure.error);
        }
        failed += report.failures.len();
    }

    if failed > 0 {
        Ok(ExitCode::from(2))
    } else {
        println!("Done !");
        Ok(ExitCode::SUCCESS)
    }
}

/// Export search documents of every book.
fn cmd_search_index(config: Config, database: &str, output: &Path) -> anyhow::Result<ExitCode> {
    let selection: LibrarySelection = database.parse()?;
    let app = AppContext::new(config);
    let names = app.select_libraries(&selection)?;

    let mut indexer = DirectoryIndexer::new(output);
    indexer.configure(&IndexSettings::new(app.config.search.index_name.clone()))?;

    for name in names {
        let library = app.library(&name)?;
        let count = search::index_library(&app, library, &mut indexer)?;
        println!("{}: {} documents", name, count);
    }

    println!("Written to {}", output.display());
    Ok(ExitCode::SUCCESS)
}

/// Create a default config file.
fn cmd_init(force: bool) -> anyhow::Result<ExitCode> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());
    println!("\nAdd your Calibre libraries under [libraries], then run:");
    println!("  cops-rs generate:thumbnails --database all");

    Ok(ExitCode::SUCCESS)
}

/// Single-line progress on stderr.
fn print_progress(progress: Progress<'_>) {
    let mut stderr = io::stderr().lock();
    let _ = write!(
        stderr,
        "\r{}: {}/{}",
        progress.library, progress.processed, progress.total
    );
    if progress.processed == progress.total {
        let _ = writeln!(stderr);
    }
    let _ = stderr.flush();
}
