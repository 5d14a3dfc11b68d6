//! Exhibit Stamp Server
//!
//! Serves a browser form that takes a batch of PDFs and a starting exhibit
//! number, stamps each PDF with an "Exhibit {N}" sticker on its first page
//! and "{N}-{page}" numbers on every page, and offers the results for
//! download.
//!
//! ## Architecture
//!
//! - `GET /` serves the form
//! - `POST /api/process` stamps a multipart batch on a blocking thread
//! - `GET /api/download/:id` hands out each stamped PDF once, then deletes it
//!
//! Stickers and stamped PDFs live in a scratch directory only until served.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use exhibit_core::{LabelFont, StampContext, DEFAULT_FONT};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod state;

use api::{handle_download, handle_health, handle_index, handle_process};
pub use state::AppState;

/// Command-line arguments for the exhibit server
#[derive(Parser, Debug)]
#[command(name = "exhibit-server")]
#[command(about = "Stamp exhibit stickers and page numbers onto PDFs")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// TrueType font for sticker labels (path or file name); falls back to a
    /// built-in bitmap font when it cannot be loaded
    #[arg(long, default_value = DEFAULT_FONT)]
    font: String,

    /// Scratch directory for stickers and stamped PDFs (default: a fresh temp dir)
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Render sticker bitmaps this many times larger than their placed size
    #[arg(long, default_value = "1")]
    oversample: u32,

    /// Batch timeout in milliseconds
    #[arg(long, default_value = "60000")]
    timeout_ms: u64,

    /// Maximum upload size per request in megabytes
    #[arg(long, default_value = "100")]
    max_upload_mb: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Build the router
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/process", post(handle_process))
        .route("/api/download/:id", get(handle_download))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Held for the lifetime of the server; dropping it removes the directory
    let mut _temp_scratch = None;
    let scratch_dir = match args.scratch_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating scratch dir {}", dir.display()))?;
            dir
        }
        None => {
            let temp = tempfile::Builder::new()
                .prefix("exhibit-stamp-")
                .tempdir()
                .context("creating scratch dir")?;
            let path = temp.path().to_path_buf();
            _temp_scratch = Some(temp);
            path
        }
    };

    let font = LabelFont::lookup(&args.font);
    let stamp = StampContext::new(font, &scratch_dir).with_oversample(args.oversample);
    info!("Sticker font: {:?}", stamp.font);

    let state = AppState::new(stamp, args.timeout_ms);
    let app = app(state, args.max_upload_mb * 1024 * 1024);

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Scratch dir: {}", scratch_dir.display());
    info!("Batch timeout: {}ms", args.timeout_ms);

    axum::serve(listener, app).await?;

    Ok(())
}
