//! Pipeline stages for PDF-to-image relay.
//!
//! Each submodule implements exactly one step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! download ──▶ render ──▶ encode ──▶ upload (fan-out)
//!  (reqwest)   (pdfium)    (PNG)     (blob store + SAS)
//! ```
//!
//! 1. [`download`]: fetch the URL, check status, content type and size
//! 2. [`render`]:   open the document, enforce the page ceiling, rasterise
//!    every page; runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]:   PNG-encode each rendered `DynamicImage`
//! 4. [`upload`]:   store each page and mint its signed URL

pub mod download;
pub mod encode;
pub mod render;
pub mod upload;
