//! Values that flow through the pipeline.
//!
//! Nothing here is mutated after construction: each value is produced by one
//! stage, handed to the next, and dropped.

use crate::error::Pdf2ImgError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Body of `POST /convert-pdf`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub url: Url,
}

impl ConversionRequest {
    /// Parse and validate a request URL.
    pub fn parse(url: &str) -> Result<Self, Pdf2ImgError> {
        let parsed = Url::parse(url).map_err(|e| Pdf2ImgError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let request = Self { url: parsed };
        request.validate()?;
        Ok(request)
    }

    /// Only absolute HTTP/HTTPS URLs with a host are accepted. No further
    /// semantic checks happen before the download.
    pub fn validate(&self) -> Result<(), Pdf2ImgError> {
        match self.url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Pdf2ImgError::InvalidUrl {
                    url: self.url.to_string(),
                    reason: format!("URL scheme '{other}' is not permitted"),
                })
            }
        }
        if self.url.host_str().map_or(true, str::is_empty) {
            return Err(Pdf2ImgError::InvalidUrl {
                url: self.url.to_string(),
                reason: "URL host is missing".to_string(),
            });
        }
        Ok(())
    }
}

/// Raw document bytes plus the content type declared by the origin.
#[derive(Debug, Clone)]
pub struct DocumentBytes {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl DocumentBytes {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One rasterised page, PNG-encoded.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 0-based page index; determines output position.
    pub index: usize,
    pub png: Vec<u8>,
}

impl PageImage {
    /// 1-based page number used in object names.
    pub fn page_number(&self) -> usize {
        self.index + 1
    }
}

/// Signed, time-limited URL for one stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadedImageRef(pub String);

impl UploadedImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UploadedImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response body of `POST /convert-pdf`: one URL per page, in page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub images: Vec<UploadedImageRef>,
}

impl ConversionResult {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
