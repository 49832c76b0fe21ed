//! In-process blob store.
//!
//! Objects live in a map keyed by `(container, name)`. Signed URLs use the
//! `memory://` scheme and carry their expiry, so [`MemoryBlobStore::resolve`]
//! can model expiring access without a real storage account.

use crate::error::Pdf2ImgError;
use crate::storage::{encode_blob_path, BlobStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

#[derive(Debug, Default)]
struct Inner {
    containers: HashSet<String>,
    objects: HashMap<(String, String), StoredObject>,
    puts: usize,
}

/// One stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Thread-safe in-memory [`BlobStore`].
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    inner: Mutex<Inner>,
    fail_uploads: bool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every `put_object` fails with [`Pdf2ImgError::Upload`].
    pub fn failing_uploads() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    pub fn get(&self, container: &str, name: &str) -> Option<StoredObject> {
        self.lock()
            .ok()?
            .objects
            .get(&(container.to_string(), name.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.lock().map(|g| g.objects.len()).unwrap_or(0)
    }

    /// Number of successful `put_object` calls, overwrites included.
    pub fn put_count(&self) -> usize {
        self.lock().map(|g| g.puts).unwrap_or(0)
    }

    pub fn has_container(&self, container: &str) -> bool {
        self.lock()
            .map(|g| g.containers.contains(container))
            .unwrap_or(false)
    }

    /// Fetch the object behind a signed URL as of `now`.
    pub fn resolve(&self, signed_url: &str, now: DateTime<Utc>) -> Result<Vec<u8>, Pdf2ImgError> {
        let denied = |why: &str| Pdf2ImgError::Signing(format!("access denied: {why}"));

        let url = Url::parse(signed_url).map_err(|_| denied("malformed URL"))?;
        if url.scheme() != "memory" {
            return Err(denied("not a memory:// URL"));
        }
        let container = url.host_str().ok_or_else(|| denied("no container"))?;
        let name = urlencoding::decode(url.path().trim_start_matches('/'))
            .map_err(|_| denied("bad object name"))?
            .into_owned();

        let expiry = url
            .query_pairs()
            .find(|(k, _)| k == "se")
            .and_then(|(_, v)| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| denied("missing expiry"))?;
        if now > expiry {
            return Err(denied("token expired"));
        }

        self.get(container, &name)
            .map(|o| o.bytes)
            .ok_or_else(|| denied("no such object"))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, Pdf2ImgError> {
        self.inner
            .lock()
            .map_err(|_| Pdf2ImgError::Internal("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn ensure_container(&self, container: &str) -> Result<(), Pdf2ImgError> {
        self.lock()
            .map_err(|e| Pdf2ImgError::StorageUnavailable(e.to_string()))?
            .containers
            .insert(container.to_string());
        Ok(())
    }

    async fn put_object(
        &self,
        container: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), Pdf2ImgError> {
        if self.fail_uploads {
            return Err(Pdf2ImgError::Upload {
                name: name.to_string(),
                reason: "simulated upload failure".into(),
            });
        }
        let mut inner = self.lock()?;
        if !inner.containers.contains(container) {
            return Err(Pdf2ImgError::Upload {
                name: name.to_string(),
                reason: format!("container '{container}' does not exist"),
            });
        }
        inner.objects.insert(
            (container.to_string(), name.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        inner.puts += 1;
        Ok(())
    }

    fn signed_url(
        &self,
        container: &str,
        name: &str,
        validity: Duration,
    ) -> Result<String, Pdf2ImgError> {
        let validity = chrono::Duration::from_std(validity)
            .map_err(|e| Pdf2ImgError::Signing(format!("validity out of range: {e}")))?;
        let expiry = (Utc::now() + validity).to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(format!(
            "memory://{}/{}?se={}",
            container,
            encode_blob_path(name),
            urlencoding::encode(&expiry)
        ))
    }
}
