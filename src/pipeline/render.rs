//! PDF rasterisation: open the document bytes and render every page to PNG.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-safe. `tokio::task::spawn_blocking` moves the work onto the
//! blocking pool so one large document cannot stall other requests sharing
//! the Tokio workers.
//!
//! ## Engine seam
//!
//! The page loop (page ceiling, ordering, encoding, error wrapping) lives in
//! [`render_pages_blocking`] and talks to the PDF library only through
//! [`RasterEngine`] / [`PageSource`]. [`PdfiumEngine`] is the production
//! engine; tests substitute their own.

use crate::config::ServiceConfig;
use crate::error::Pdf2ImgError;
use crate::model::{DocumentBytes, PageImage};
use crate::pipeline::encode::encode_png;
use crate::resources::log_resource_usage;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// PDF user space is 72 points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// An opened paginated document.
pub trait PageSource {
    /// Total number of pages.
    fn page_count(&self) -> usize;

    /// Render page `index` (0-based) at `dpi`.
    fn rasterize(&mut self, index: usize, dpi: u32) -> Result<DynamicImage, String>;
}

/// A PDF library able to open documents from memory.
///
/// The document only lives for the duration of `visit`, which lets engines
/// hand out sources that borrow from the input bytes.
pub trait RasterEngine: Send + Sync {
    /// Open `bytes` and run `visit` against the document.
    ///
    /// Fails with [`Pdf2ImgError::MalformedDocument`] when the bytes cannot
    /// be parsed; otherwise returns whatever `visit` returns.
    fn with_document(
        &self,
        bytes: &[u8],
        visit: &mut dyn FnMut(&mut dyn PageSource) -> Result<(), Pdf2ImgError>,
    ) -> Result<(), Pdf2ImgError>;
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// [`RasterEngine`] backed by pdfium. Bound once per process and shared.
pub struct PdfiumEngine {
    pdfium: Pdfium,
}

impl PdfiumEngine {
    /// Bind to pdfium in `lib_dir`, or to the system library when `None`.
    pub fn bind(lib_dir: Option<&Path>) -> Result<Self, Pdf2ImgError> {
        let bindings = match lib_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| Pdf2ImgError::PdfiumBindingFailed(format!("{:?}", e)))?;

        info!("pdfium bound");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl std::fmt::Debug for PdfiumEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumEngine").finish_non_exhaustive()
    }
}

impl RasterEngine for PdfiumEngine {
    fn with_document(
        &self,
        bytes: &[u8],
        visit: &mut dyn FnMut(&mut dyn PageSource) -> Result<(), Pdf2ImgError>,
    ) -> Result<(), Pdf2ImgError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| Pdf2ImgError::MalformedDocument {
                detail: format!("{:?}", e),
            })?;

        let mut source = PdfiumPages { document };
        visit(&mut source)
    }
}

struct PdfiumPages<'a> {
    document: PdfDocument<'a>,
}

impl PageSource for PdfiumPages<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn rasterize(&mut self, index: usize, dpi: u32) -> Result<DynamicImage, String> {
        let page_index =
            u16::try_from(index).map_err(|_| format!("page index {index} out of range"))?;
        let page = self
            .document
            .pages()
            .get(page_index)
            .map_err(|e| format!("{:?}", e))?;

        let scale = dpi as f32 / POINTS_PER_INCH;
        let width = (page.width().value * scale).round().max(1.0) as i32;
        let height = (page.height().value * scale).round().max(1.0) as i32;

        let render_config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("{:?}", e))?;

        Ok(bitmap.as_image())
    }
}

// ── Renderer ─────────────────────────────────────────────────────────────

/// Turns downloaded document bytes into an ordered list of PNG pages.
#[derive(Clone)]
pub struct PageRenderer {
    engine: Arc<dyn RasterEngine>,
    dpi: u32,
    max_pages: usize,
}

impl PageRenderer {
    pub fn new(engine: Arc<dyn RasterEngine>, config: &ServiceConfig) -> Self {
        Self {
            engine,
            dpi: config.dpi,
            max_pages: config.max_pages,
        }
    }

    /// Rasterise every page of `document` on the blocking pool.
    ///
    /// Aborts on the first failing page; no partial result is returned.
    pub async fn render(&self, document: DocumentBytes) -> Result<Vec<PageImage>, Pdf2ImgError> {
        let engine = Arc::clone(&self.engine);
        let dpi = self.dpi;
        let max_pages = self.max_pages;

        tokio::task::spawn_blocking(move || {
            render_pages_blocking(engine.as_ref(), &document.bytes, dpi, max_pages)
        })
        .await
        .map_err(|e| Pdf2ImgError::Internal(format!("Render task panicked: {}", e)))?
    }
}

impl std::fmt::Debug for PageRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRenderer")
            .field("engine", &"<dyn RasterEngine>")
            .field("dpi", &self.dpi)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

/// Blocking implementation of page rendering.
///
/// The page ceiling is checked before the first page is rasterised.
pub fn render_pages_blocking(
    engine: &dyn RasterEngine,
    bytes: &[u8],
    dpi: u32,
    max_pages: usize,
) -> Result<Vec<PageImage>, Pdf2ImgError> {
    log_resource_usage("Before Conversion");

    let mut images: Vec<PageImage> = Vec::new();
    engine.with_document(bytes, &mut |doc| {
        let page_count = doc.page_count();
        info!("PDF has {} pages.", page_count);

        if page_count > max_pages {
            return Err(Pdf2ImgError::TooManyPages {
                pages: page_count,
                max: max_pages,
            });
        }

        images.reserve(page_count);
        for index in 0..page_count {
            let page = index + 1;
            let image = doc
                .rasterize(index, dpi)
                .map_err(|detail| Pdf2ImgError::Render { page, detail })?;
            let png = encode_png(&image).map_err(|e| Pdf2ImgError::Render {
                page,
                detail: format!("PNG encoding failed: {}", e),
            })?;
            debug!(
                "Rendered page {} → {}x{} px, {} bytes",
                page,
                image.width(),
                image.height(),
                png.len()
            );
            images.push(PageImage { index, png });
        }
        Ok(())
    })?;

    log_resource_usage("After Conversion");
    Ok(images)
}
