use anyhow::Result;
use annotation_core::persist::{load_meta, load_pages, load_token_index, save_meta, save_token_index, IndexPaths, MetaFile};
use annotation_core::search::{search, SearchOptions, DEFAULT_CONTEXT_CHARS};
use annotation_core::token_index::TokenIndex;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

use std::fs;
use std::path::Path;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query the token index of a paginated document", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the token index from a pages JSON file, or from a plain text file with --plain
    Build {
        /// Input path (pages JSON array, or text when --plain is set)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Treat the input as a plain-text document without token geometry
        #[arg(long, default_value_t = false)]
        plain: bool,
    },
    /// Search a built index and print the results as JSON
    Search {
        /// Index directory
        #[arg(long)]
        index: String,
        /// Search term (case-insensitive)
        #[arg(long)]
        q: String,
        /// Chars of lead-in/lead-out context per hit
        #[arg(long, default_value_t = DEFAULT_CONTEXT_CHARS)]
        context_chars: usize,
    },
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    total_hits: usize,
    results: Vec<annotation_core::SearchResult>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, plain } => build_index(&input, &output, plain),
        Commands::Search { index, q, context_chars } => search_index(&index, &q, context_chars),
    }
}

fn build_index(input: &str, output: &str, plain: bool) -> Result<()> {
    let input_path = Path::new(input);
    let out_paths = IndexPaths::new(output);

    let index = if plain {
        TokenIndex::from_plain_text(fs::read_to_string(input_path)?)
    } else {
        let pages = load_pages(input_path)?;
        tracing::info!(pages = pages.len(), "loaded pages");
        TokenIndex::build(&pages)
    };
    if !index.missing_token_layers().is_empty() {
        tracing::warn!(pages = ?index.missing_token_layers(), "pages without token layer");
    }

    save_token_index(&out_paths, &index)?;
    let created_at = time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into());
    save_meta(&out_paths, &MetaFile::describe(&index, created_at))?;

    tracing::info!(output, chars = index.char_len(), "index build complete");
    Ok(())
}

fn search_index(dir: &str, q: &str, context_chars: usize) -> Result<()> {
    let paths = IndexPaths::new(dir);
    let meta = load_meta(&paths)?;
    let index = load_token_index(&paths)?;
    tracing::debug!(pages = meta.page_count, created_at = %meta.created_at, "index loaded");

    let results = search(q, &index, &SearchOptions { context_chars });
    let out = SearchOutput { query: q, total_hits: results.len(), results };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
