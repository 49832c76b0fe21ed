//! Configuration for the conversion pipeline.
//!
//! All pipeline behaviour is controlled through [`ServiceConfig`], built via
//! [`ServiceConfigBuilder`]. The config is read-only once built and shared
//! across every request the process handles.

use crate::error::Pdf2ImgError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default rasterisation resolution.
pub const DEFAULT_DPI: u32 = 100;

/// Default ceiling on downloaded document size: 100 MiB.
pub const DEFAULT_MAX_PDF_BYTES: u64 = 100 * 1024 * 1024;

/// Default ceiling on document page count.
pub const DEFAULT_MAX_PAGES: usize = 3000;

/// Default validity of minted access URLs: 24 hours.
pub const DEFAULT_SAS_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the conversion pipeline.
///
/// # Example
/// ```rust
/// use edgequake_pdf2img::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .dpi(150)
///     .max_pages(500)
///     .container("pages")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 150);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Rasterisation DPI. Range: 36–600. Default: 100.
    pub dpi: u32,

    /// Maximum document size in bytes. Default: 100 MiB.
    ///
    /// Checked against `Content-Length` when the server declares it and
    /// again while the body streams in, so an oversized body is rejected
    /// without being buffered in full.
    pub max_pdf_bytes: u64,

    /// Maximum number of pages. Default: 3000.
    pub max_pages: usize,

    /// `User-Agent` sent with downloads. Some origins reject the default
    /// client identity outright.
    pub user_agent: String,

    /// Download timeout in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Whole-request deadline in seconds. `None` (default) waits forever.
    pub request_timeout_secs: Option<u64>,

    /// Maximum uploads in flight per request. `None` (default) launches
    /// one upload per page at once.
    pub upload_concurrency: Option<usize>,

    /// Storage container that receives page images.
    ///
    /// Not required to build the config; a missing container fails each
    /// upload with [`Pdf2ImgError::StorageUnavailable`].
    pub container: Option<String>,

    /// Validity window of minted access URLs. Default: 24 h.
    pub sas_validity: Duration,

    /// How page objects are named in storage.
    pub naming: BlobNaming,

    /// Directory holding the pdfium shared library. `None` binds to the
    /// system library.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            max_pdf_bytes: DEFAULT_MAX_PDF_BYTES,
            max_pages: DEFAULT_MAX_PAGES,
            user_agent: "Mozilla/5.0".to_string(),
            download_timeout_secs: 120,
            request_timeout_secs: None,
            upload_concurrency: None,
            container: None,
            sas_validity: DEFAULT_SAS_VALIDITY,
            naming: BlobNaming::default(),
            pdfium_lib_path: None,
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_pdf_bytes(mut self, bytes: u64) -> Self {
        self.config.max_pdf_bytes = bytes;
        self
    }

    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = pages;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn upload_concurrency(mut self, n: usize) -> Self {
        self.config.upload_concurrency = Some(n.max(1));
        self
    }

    pub fn container(mut self, name: impl Into<String>) -> Self {
        self.config.container = Some(name.into());
        self
    }

    pub fn sas_validity(mut self, validity: Duration) -> Self {
        self.config.sas_validity = validity;
        self
    }

    pub fn naming(mut self, naming: BlobNaming) -> Self {
        self.config.naming = naming;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, Pdf2ImgError> {
        let c = &self.config;
        if !(36..=600).contains(&c.dpi) {
            return Err(Pdf2ImgError::InvalidConfig(format!(
                "DPI must be 36–600, got {}",
                c.dpi
            )));
        }
        if c.max_pdf_bytes == 0 {
            return Err(Pdf2ImgError::InvalidConfig(
                "max_pdf_bytes must be ≥ 1".into(),
            ));
        }
        if c.max_pages == 0 {
            return Err(Pdf2ImgError::InvalidConfig("max_pages must be ≥ 1".into()));
        }
        if c.sas_validity.is_zero() {
            return Err(Pdf2ImgError::InvalidConfig(
                "sas_validity must be non-zero".into(),
            ));
        }
        if matches!(c.container.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(Pdf2ImgError::InvalidConfig(
                "container name must not be blank".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Object naming scheme for uploaded pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlobNaming {
    /// `<request-id>/page<N>.png`: concurrent requests never overwrite
    /// each other's pages. (default)
    #[default]
    PerRequest,
    /// `page<N>.png`: one shared namespace; the last writer wins.
    Flat,
}

impl BlobNaming {
    /// Object name for the 1-indexed `page_number` within request `request_id`.
    pub fn object_name(&self, request_id: &str, page_number: usize) -> String {
        match self {
            BlobNaming::PerRequest => format!("{request_id}/page{page_number}.png"),
            BlobNaming::Flat => format!("page{page_number}.png"),
        }
    }
}
