//! Error types for the edgequake-pdf2img library.
//!
//! Every failure is fatal for the request that hit it: the caller either
//! gets the full list of page URLs or a single error, never a partial list.
//! [`Pdf2ImgError`] therefore carries two renderings of the same failure:
//!
//! * `Display`: the full diagnostic, meant for logs.
//! * [`Pdf2ImgError::detail`]: the short message returned to the HTTP
//!   caller. Internal detail (upstream bodies, parser output) stays in logs.

use std::fmt;
use thiserror::Error;

/// Pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Request,
    Download,
    Render,
    Upload,
    Orchestration,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Request => "request",
            Stage::Download => "download",
            Stage::Render => "render",
            Stage::Upload => "upload",
            Stage::Orchestration => "orchestration",
        };
        f.write_str(name)
    }
}

/// All fatal errors returned by the edgequake-pdf2img library.
#[derive(Debug, Error)]
pub enum Pdf2ImgError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The submitted URL is not an absolute HTTP/HTTPS URL.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // ── Download errors ───────────────────────────────────────────────────
    /// The remote server answered with a non-2xx status.
    #[error("Download of '{url}' failed with HTTP {status}")]
    RemoteFetch { url: String, status: u16 },

    /// The remote server did not declare a PDF content type.
    #[error("'{url}' served Content-Type '{content_type}', expected a PDF")]
    UnsupportedContentType { url: String, content_type: String },

    /// The body exceeded the configured byte ceiling.
    #[error("Payload from '{url}' exceeds {limit} bytes (saw at least {received})")]
    PayloadTooLarge {
        url: String,
        limit: u64,
        received: u64,
    },

    /// Connection reset, DNS failure, timeout, TLS failure...
    #[error("Transport error while downloading '{url}': {reason}")]
    Transport { url: String, reason: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The bytes could not be opened as a PDF document.
    #[error("Document is not a readable PDF: {detail}")]
    MalformedDocument { detail: String },

    /// Page count is above the configured ceiling. Raised before any page
    /// is rasterised.
    #[error("PDF has too many pages ({pages}). Maximum allowed is {max}.")]
    TooManyPages { pages: usize, max: usize },

    /// Rasterisation or PNG encoding failed for one page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    Render { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory holding libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Upload errors ─────────────────────────────────────────────────────
    /// Container setup failed for a reason other than "already exists".
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Writing the object failed.
    #[error("Upload of '{name}' failed: {reason}")]
    Upload { name: String, reason: String },

    /// Credentials could not be parsed or the access token could not be minted.
    #[error("Signing failed: {0}")]
    Signing(String),

    // ── Orchestration errors ──────────────────────────────────────────────
    /// The pipeline finished without producing a single image URL.
    #[error("No images were generated")]
    EmptyResult,

    /// The whole request exceeded the configured deadline.
    #[error("Conversion did not finish within {secs}s")]
    Timeout { secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2ImgError {
    /// Stage the failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Pdf2ImgError::InvalidUrl { .. } => Stage::Request,
            Pdf2ImgError::RemoteFetch { .. }
            | Pdf2ImgError::UnsupportedContentType { .. }
            | Pdf2ImgError::PayloadTooLarge { .. }
            | Pdf2ImgError::Transport { .. } => Stage::Download,
            Pdf2ImgError::MalformedDocument { .. }
            | Pdf2ImgError::TooManyPages { .. }
            | Pdf2ImgError::Render { .. }
            | Pdf2ImgError::PdfiumBindingFailed(_) => Stage::Render,
            Pdf2ImgError::StorageUnavailable(_)
            | Pdf2ImgError::Upload { .. }
            | Pdf2ImgError::Signing(_) => Stage::Upload,
            Pdf2ImgError::EmptyResult
            | Pdf2ImgError::Timeout { .. }
            | Pdf2ImgError::InvalidConfig(_)
            | Pdf2ImgError::Internal(_) => Stage::Orchestration,
        }
    }

    /// HTTP status class: 400 for download problems and oversized documents,
    /// 422 for a malformed request body, 500 otherwise. A document pdfium
    /// cannot open is a 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Pdf2ImgError::InvalidUrl { .. } => 422,
            Pdf2ImgError::RemoteFetch { .. }
            | Pdf2ImgError::UnsupportedContentType { .. }
            | Pdf2ImgError::PayloadTooLarge { .. }
            | Pdf2ImgError::Transport { .. }
            | Pdf2ImgError::TooManyPages { .. } => 400,
            _ => 500,
        }
    }

    /// `true` when the caller is at fault (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Short caller-facing message.
    pub fn detail(&self) -> String {
        match self {
            Pdf2ImgError::InvalidUrl { reason, .. } => format!("Invalid URL: {reason}"),
            Pdf2ImgError::RemoteFetch { status, .. } => {
                format!("Failed to download PDF. Status code: {status}")
            }
            Pdf2ImgError::UnsupportedContentType { content_type, .. } => {
                format!("URL does not point to a PDF file. Content-Type: {content_type}")
            }
            Pdf2ImgError::PayloadTooLarge { .. } => "PDF file is too large.".to_string(),
            Pdf2ImgError::Transport { .. } => {
                "Client error occurred while downloading PDF.".to_string()
            }
            Pdf2ImgError::TooManyPages { .. } => self.to_string(),
            Pdf2ImgError::MalformedDocument { .. }
            | Pdf2ImgError::Render { .. }
            | Pdf2ImgError::PdfiumBindingFailed(_) => {
                "Error converting PDF to images.".to_string()
            }
            Pdf2ImgError::StorageUnavailable(_)
            | Pdf2ImgError::Upload { .. }
            | Pdf2ImgError::Signing(_) => "Error uploading images.".to_string(),
            Pdf2ImgError::EmptyResult => "No images were generated.".to_string(),
            Pdf2ImgError::Timeout { .. } => "Conversion timed out.".to_string(),
            Pdf2ImgError::InvalidConfig(_) | Pdf2ImgError::Internal(_) => {
                "Unexpected error occurred.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_fetch_detail_carries_status() {
        let e = Pdf2ImgError::RemoteFetch {
            url: "https://example.com/doc.pdf".into(),
            status: 404,
        };
        assert_eq!(e.detail(), "Failed to download PDF. Status code: 404");
        assert_eq!(e.status_code(), 400);
        assert_eq!(e.stage(), Stage::Download);
    }

    #[test]
    fn content_type_detail_mentions_content_type() {
        let e = Pdf2ImgError::UnsupportedContentType {
            url: "https://example.com/".into(),
            content_type: "text/html".into(),
        };
        let detail = e.detail();
        assert!(detail.contains("Content-Type"), "got: {detail}");
        assert!(detail.contains("text/html"), "got: {detail}");
        assert!(e.is_client_error());
    }

    #[test]
    fn too_many_pages_is_client_error() {
        let e = Pdf2ImgError::TooManyPages {
            pages: 3001,
            max: 3000,
        };
        assert_eq!(e.status_code(), 400);
        assert_eq!(
            e.detail(),
            "PDF has too many pages (3001). Maximum allowed is 3000."
        );
    }

    #[test]
    fn unreadable_document_is_server_error() {
        let e = Pdf2ImgError::MalformedDocument {
            detail: "Failed to load document: FormatError".into(),
        };
        assert_eq!(e.status_code(), 500);
        assert!(!e.is_client_error());
        assert_eq!(e.detail(), "Error converting PDF to images.");
        assert_eq!(e.stage(), Stage::Render);
    }

    #[test]
    fn internal_failures_hide_diagnostics() {
        let e = Pdf2ImgError::Upload {
            name: "page1.png".into(),
            reason: "HTTP 403: <Error><Code>AuthenticationFailed</Code>".into(),
        };
        assert_eq!(e.status_code(), 500);
        assert_eq!(e.detail(), "Error uploading images.");
        assert!(e.to_string().contains("AuthenticationFailed"));
    }

    #[test]
    fn render_error_maps_to_server_error() {
        let e = Pdf2ImgError::Render {
            page: 3,
            detail: "bitmap allocation failed".into(),
        };
        assert_eq!(e.status_code(), 500);
        assert_eq!(e.stage(), Stage::Render);
        assert!(e.to_string().contains("page 3"));
    }

    #[test]
    fn empty_result_detail() {
        assert_eq!(
            Pdf2ImgError::EmptyResult.detail(),
            "No images were generated."
        );
        assert_eq!(Pdf2ImgError::EmptyResult.stage(), Stage::Orchestration);
    }
}
