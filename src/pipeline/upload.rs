//! Upload stage: store one page image and hand back its signed URL.
//!
//! Every call runs the same three steps against the shared [`BlobStore`]:
//! ensure the container, write the object (overwriting any previous one of
//! the same name) and mint a read-only URL. Calls share nothing but the
//! store handle, so the orchestrator can run one per page concurrently.

use crate::config::ServiceConfig;
use crate::error::Pdf2ImgError;
use crate::model::UploadedImageRef;
use crate::storage::BlobStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Content type of every stored page.
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Stores page images and mints their access URLs.
#[derive(Clone)]
pub struct UploadRelay {
    store: Arc<dyn BlobStore>,
    container: Option<String>,
    validity: Duration,
}

impl UploadRelay {
    pub fn new(store: Arc<dyn BlobStore>, config: &ServiceConfig) -> Self {
        Self {
            store,
            container: config.container.clone(),
            validity: config.sas_validity,
        }
    }

    /// Store `image_bytes` as `name` and return a URL readable for the
    /// configured validity window.
    pub async fn store(
        &self,
        image_bytes: Vec<u8>,
        name: &str,
    ) -> Result<UploadedImageRef, Pdf2ImgError> {
        let container = self.container.as_deref().ok_or_else(|| {
            Pdf2ImgError::StorageUnavailable(
                "Azure container name not found in environment variables".into(),
            )
        })?;

        self.store.ensure_container(container).await?;
        debug!("Container ready: {}", container);

        let size = image_bytes.len();
        self.store
            .put_object(container, name, image_bytes, PNG_CONTENT_TYPE)
            .await?;

        let url = self.store.signed_url(container, name, self.validity)?;
        info!("Uploaded {} ({} bytes)", name, size);
        Ok(UploadedImageRef(url))
    }
}

impl std::fmt::Debug for UploadRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRelay")
            .field("store", &"<dyn BlobStore>")
            .field("container", &self.container)
            .field("validity", &self.validity)
            .finish()
    }
}
