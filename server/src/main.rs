use anyhow::Result;
use annotation_core::search::DEFAULT_CONTEXT_CHARS;
use axum::Router;
use clap::Parser;
use server::{build_app, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Pages JSON of the document to annotate
    #[arg(long)]
    document: PathBuf,
    /// Directory of the annotation database
    #[arg(long, default_value = "./annotations.db")]
    db: PathBuf,
    /// Corpus the document belongs to
    #[arg(long, default_value = "default")]
    corpus_id: String,
    /// Document id used to scope stored annotations
    #[arg(long)]
    document_id: String,
    /// Chars of lead-in/lead-out context per search hit
    #[arg(long, default_value_t = DEFAULT_CONTEXT_CHARS)]
    context_chars: usize,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = ServerConfig {
        pages: args.document,
        db: args.db,
        corpus_id: args.corpus_id,
        document_id: args.document_id,
        context_chars: args.context_chars,
    };
    let app: Router = build_app(config).await?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
