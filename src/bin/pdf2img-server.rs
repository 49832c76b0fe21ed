//! HTTP server binary for edgequake-pdf2img.
//!
//! A thin shim over the library crate: maps flags and environment
//! variables to `ServiceConfig`, wires the pdfium engine and the storage
//! client into a `ConversionPipeline`, and serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2img::server::{cors_layer, create_router, AppState, DEFAULT_ALLOWED_ORIGINS};
use edgequake_pdf2img::{
    AzureBlobStore, BlobNaming, ConnectionString, ConversionPipeline, PdfiumEngine, ServiceConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Minimal: connection string from .env, container from the environment
  AZURE_CONTAINER_NAME=pages pdf2img-server

  # Bounded uploads and a 5 minute request deadline
  pdf2img-server --upload-concurrency 8 --request-timeout 300

  # Local storage emulator
  AZURE_STORAGE_CONNECTION_STRING=UseDevelopmentStorage=true pdf2img-server

  curl -X POST localhost:8000/convert-pdf \
       -H 'content-type: application/json' \
       -d '{"url": "https://example.com/doc.pdf"}'

PDFIUM:
  libpdfium must be installed system-wide or pointed to with
  PDFIUM_LIB_PATH=/path/to/dir/holding/libpdfium.
"#;

/// Convert remote PDFs to PNG pages in blob storage.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2img-server",
    version,
    about = "Convert remote PDFs to PNG pages in blob storage and return signed URLs",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Storage connection string (AccountName=…;AccountKey=…).
    #[arg(long, env = "AZURE_STORAGE_CONNECTION_STRING", hide_env_values = true)]
    connection_string: String,

    /// Container that receives page images.
    #[arg(long, env = "AZURE_CONTAINER_NAME")]
    container: Option<String>,

    /// Comma-separated CORS origins.
    #[arg(long, env = "PDF2IMG_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// Listen address.
    #[arg(long, env = "PDF2IMG_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port.
    #[arg(long, env = "PDF2IMG_PORT", default_value_t = 8000)]
    port: u16,

    /// Rendering DPI (36–600).
    #[arg(long, env = "PDF2IMG_DPI", default_value_t = 100,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    dpi: u32,

    /// Maximum pages per document.
    #[arg(long, env = "PDF2IMG_MAX_PAGES", default_value_t = 3000)]
    max_pages: usize,

    /// Maximum document size in bytes.
    #[arg(long, env = "PDF2IMG_MAX_BYTES", default_value_t = 100 * 1024 * 1024)]
    max_bytes: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2IMG_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Whole-request deadline in seconds. Unset waits forever.
    #[arg(long, env = "PDF2IMG_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// Maximum uploads in flight per request. Unset uploads every page at once.
    #[arg(long, env = "PDF2IMG_UPLOAD_CONCURRENCY")]
    upload_concurrency: Option<usize>,

    /// Store pages as `page<N>.png` without a per-request prefix.
    #[arg(long, env = "PDF2IMG_FLAT_NAMES")]
    flat_names: bool,

    /// Directory holding the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2IMG_VERBOSE")]
    verbose: bool,
}

impl Cli {
    fn service_config(&self) -> Result<ServiceConfig> {
        let mut builder = ServiceConfig::builder()
            .dpi(self.dpi)
            .max_pages(self.max_pages)
            .max_pdf_bytes(self.max_bytes)
            .download_timeout_secs(self.download_timeout)
            .naming(if self.flat_names {
                BlobNaming::Flat
            } else {
                BlobNaming::PerRequest
            });
        if let Some(container) = &self.container {
            builder = builder.container(container.clone());
        }
        if let Some(secs) = self.request_timeout {
            builder = builder.request_timeout_secs(secs);
        }
        if let Some(n) = self.upload_concurrency {
            builder = builder.upload_concurrency(n);
        }
        if let Some(dir) = &self.pdfium_lib_path {
            builder = builder.pdfium_lib_path(dir.clone());
        }
        builder.build().context("Invalid service configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else {
        "info,tower_http=debug"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // ── Collaborators ────────────────────────────────────────────────────
    let config = cli.service_config()?;

    let credentials = ConnectionString::parse(&cli.connection_string)
        .context("AZURE_STORAGE_CONNECTION_STRING could not be parsed")?;
    info!(
        "Storage account {} at {}",
        credentials.account_name(),
        credentials.blob_endpoint()
    );
    let store = AzureBlobStore::new(credentials).context("Failed to create storage client")?;

    if config.container.is_none() {
        warn!("AZURE_CONTAINER_NAME is not set; every upload will fail");
    }

    let engine = PdfiumEngine::bind(config.pdfium_lib_path.as_deref())
        .context("Failed to load the pdfium library")?;

    let pipeline = ConversionPipeline::new(&config, Arc::new(engine), Arc::new(store))
        .context("Failed to build conversion pipeline")?;

    // ── Router ───────────────────────────────────────────────────────────
    let cors = if cli.allowed_origins.is_empty() {
        cors_layer(DEFAULT_ALLOWED_ORIGINS)
    } else {
        cors_layer(cli.allowed_origins.as_slice())
    }
    .context("Invalid PDF2IMG_ALLOWED_ORIGINS")?;

    let app = create_router(Arc::new(AppState::new(pipeline)), cors);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("pdf2img-server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
