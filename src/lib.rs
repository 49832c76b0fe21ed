//! # edgequake-pdf2img
//!
//! Turn a PDF URL into one signed PNG URL per page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /convert-pdf {"url": …}
//!  │
//!  ├─ 1. Download  GET the URL, check status, Content-Type and size
//!  ├─ 2. Render    rasterise every page via pdfium (spawn_blocking)
//!  ├─ 3. Encode    PNG per page
//!  ├─ 4. Upload    concurrent blob writes + read-only SAS per page
//!  └─ 5. Respond   {"images": [url1, url2, …]} in page order
//! ```
//!
//! Every stage failure is fatal for the request: the caller gets either the
//! full list or a `{"detail": …}` error, never a partial list.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2img::{
//!     AzureBlobStore, ConnectionString, ConversionPipeline, ConversionRequest, PdfiumEngine,
//!     ServiceConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = ConnectionString::parse(&std::env::var("AZURE_STORAGE_CONNECTION_STRING")?)?;
//!     let config = ServiceConfig::builder().container("pages").build()?;
//!
//!     let pipeline = ConversionPipeline::new(
//!         &config,
//!         Arc::new(PdfiumEngine::bind(None)?),
//!         Arc::new(AzureBlobStore::new(conn)?),
//!     )?;
//!
//!     let request = ConversionRequest::parse("https://example.com/doc.pdf")?;
//!     for url in pipeline.convert(&request).await?.images {
//!         println!("{url}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum router and the `pdf2img-server` binary (clap + dotenvy + tracing-subscriber) |
//!
//! Disable `server` when embedding the pipeline in another service:
//! ```toml
//! edgequake-pdf2img = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod resources;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BlobNaming, ServiceConfig, ServiceConfigBuilder};
pub use convert::{ConversionPipeline, PipelineState};
pub use error::{Pdf2ImgError, Stage};
pub use model::{ConversionRequest, ConversionResult, DocumentBytes, PageImage, UploadedImageRef};
pub use pipeline::download::Downloader;
pub use pipeline::render::{PageRenderer, PageSource, PdfiumEngine, RasterEngine};
pub use pipeline::upload::UploadRelay;
pub use storage::{AzureBlobStore, BlobStore, ConnectionString, MemoryBlobStore};
