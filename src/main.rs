//! `comix`: inspect comic book containers.
//!
//! ```text
//! comix info <PATH> [--json]
//! comix cover <PATH> --output <FILE> [--max-dimension <PX> | --native]
//! comix page <PATH> <INDEX> --output <FILE> [--max-dimension <PX>]
//! comix check <PATH>...
//! comix scan <DIR> [--recursive]
//! ```

mod error;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use comix_config::EngineConfig;
use comix_engine::{ComicContainer, Engine, IntegrityStatus, PageImage};
use exn::ResultExt;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Containers checked at once by `check` and `scan`.
const CHECK_CONCURRENCY: usize = 4;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON). Defaults to the per-user
    /// configuration directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show format, pages, integrity and metadata.
    Info {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Write the cover image.
    Cover {
        path: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Longest side in pixels; defaults to `cover_max_dimension`.
        #[arg(long, conflicts_with = "native")]
        max_dimension: Option<u32>,
        /// Write the cover page as stored, without thumbnailing.
        #[arg(long)]
        native: bool,
    },
    /// Write one page image.
    Page {
        path: PathBuf,
        /// 0-based page index.
        index: usize,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        max_dimension: Option<u32>,
    },
    /// Report the integrity of each container.
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Find comics under a directory and check them.
    Scan {
        root: PathBuf,
        #[arg(short, long)]
        recursive: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = EngineConfig::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let cover_max_dimension = config.cover_max_dimension;
    let engine = Engine::new(config);

    match cli.command {
        Command::Info { path, json } => {
            let container = open(&engine, &path).await?;
            if json {
                print_json(&container);
            } else {
                print_summary(&container);
            }
        },
        Command::Cover { path, output, max_dimension, native } => {
            let container = open(&engine, &path).await?;
            let max_dimension = if native { None } else { Some(max_dimension.unwrap_or(cover_max_dimension)) };
            let cover = container.cover(max_dimension).await.or_raise(|| comic_error(&path))?;
            write_image(&output, &cover).await?;
        },
        Command::Page { path, index, output, max_dimension } => {
            let container = open(&engine, &path).await?;
            let page = container.read_page(index, max_dimension).await.or_raise(|| comic_error(&path))?;
            write_image(&output, &page).await?;
        },
        Command::Check { paths } => {
            let healthy = check_all(&engine, futures::stream::iter(paths)).await;
            return Ok(exit_code(healthy));
        },
        Command::Scan { root, recursive } => {
            let found = comix_engine::scan::discover(&root, recursive).filter_map(|result| async move {
                match result {
                    Ok(path) => Some(path),
                    Err(err) => {
                        tracing::warn!(error = %(*err).to_string(), "Skipping unreadable directory");
                        None
                    },
                }
            });
            let healthy = check_all(&engine, found).await;
            return Ok(exit_code(healthy));
        },
    }
    Ok(ExitCode::SUCCESS)
}

fn comic_error(path: &Path) -> ErrorKind {
    ErrorKind::Comic(path.display().to_string())
}

async fn open(engine: &Engine, path: &Path) -> Result<ComicContainer> {
    engine.open(path).await.or_raise(|| comic_error(path))
}

/// Print one line per container and return whether every one was clean.
async fn check_all(engine: &Engine, paths: impl futures::Stream<Item = PathBuf>) -> bool {
    paths
        .map(|path| async move {
            let status = engine.check(&path).await;
            (path, status)
        })
        .buffered(CHECK_CONCURRENCY)
        .fold(true, |healthy, (path, status)| async move {
            match status {
                Ok(IntegrityStatus::Clean) => {
                    println!("clean\t{}", path.display());
                    healthy
                },
                Ok(IntegrityStatus::PartiallyCorrupted { skipped_pages, structure_damaged }) => {
                    let damage = if structure_damaged { " (index recovered)" } else { "" };
                    println!("partial\t{}\tskipped {:?}{damage}", path.display(), skipped_pages);
                    false
                },
                Ok(IntegrityStatus::Unreadable) => {
                    println!("unreadable\t{}", path.display());
                    false
                },
                Err(err) => {
                    println!("error\t{}\t{}", path.display(), *err);
                    false
                },
            }
        })
        .await
}

fn exit_code(healthy: bool) -> ExitCode {
    if healthy { ExitCode::SUCCESS } else { ExitCode::from(2) }
}

fn print_summary(container: &ComicContainer) {
    let metadata = container.metadata();
    println!("{}", container.source_path().display());
    println!("  format:    {}", container.format());
    println!("  pages:     {}", container.page_count());
    println!("  integrity: {:?}", container.integrity());
    if let Some(title) = &metadata.title {
        println!("  title:     {title}");
    }
    if let Some(series) = &metadata.series {
        println!("  series:    {series}");
    }
    if let Some(issue) = &metadata.issue_number {
        println!("  issue:     {issue}");
    }
    if let Some(year) = metadata.year {
        println!("  year:      {year}");
    }
    if !metadata.writers.is_empty() {
        println!("  writers:   {}", metadata.writers.join(", "));
    }
    println!("  source:    {:?}", metadata.source);
}

fn print_json(container: &ComicContainer) {
    let value = serde_json::json!({
        "path": container.source_path(),
        "format": container.format(),
        "page_count": container.page_count(),
        "pages": container.pages(),
        "integrity": container.integrity(),
        "metadata": container.metadata(),
    });
    println!("{value:#}");
}

async fn write_image(output: &Path, image: &PageImage) -> Result<()> {
    let output = match output.extension() {
        Some(_) => output.to_path_buf(),
        None => output.with_extension(image.format.as_str()),
    };
    tokio::fs::write(&output, &image.bytes).await.or_raise(|| ErrorKind::Output(output.display().to_string()))?;
    eprintln!("wrote {}x{} {} to {}", image.width, image.height, image.format, output.display());
    Ok(())
}
