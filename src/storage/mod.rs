//! Blob storage behind a narrow trait.
//!
//! The pipeline only needs three things from storage: make sure a container
//! exists, write one object, and mint a read URL for it. [`BlobStore`]
//! captures exactly that so the upload relay can be tested against
//! [`MemoryBlobStore`] and run in production against [`AzureBlobStore`].

pub mod azure;
pub mod connection;
pub mod memory;
pub mod sas;

use crate::error::Pdf2ImgError;
use async_trait::async_trait;
use std::time::Duration;

pub use azure::AzureBlobStore;
pub use connection::ConnectionString;
pub use memory::MemoryBlobStore;

/// Object storage used by the upload relay.
///
/// Implementations are shared read-only across concurrent uploads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create `container` if missing. An existing container is success.
    ///
    /// Fails with [`Pdf2ImgError::StorageUnavailable`].
    async fn ensure_container(&self, container: &str) -> Result<(), Pdf2ImgError>;

    /// Write `bytes` under `name`, replacing any existing object.
    ///
    /// Fails with [`Pdf2ImgError::Upload`].
    async fn put_object(
        &self,
        container: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), Pdf2ImgError>;

    /// Full URL granting read access to `name` for `validity` from now.
    ///
    /// Fails with [`Pdf2ImgError::Signing`].
    fn signed_url(
        &self,
        container: &str,
        name: &str,
        validity: Duration,
    ) -> Result<String, Pdf2ImgError>;
}

/// Percent-encode a blob name segment by segment, keeping `/` separators.
pub fn encode_blob_path(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
