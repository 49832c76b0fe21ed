//! Pipeline orchestration: one request in, one ordered URL list out.
//!
//! ```text
//! Idle ─▶ Downloading ─▶ Rendering ─▶ Uploading(n) ─▶ Completed(n)
//!   └──────────┴─────────────┴─────────────┴──────▶ Failed(stage)
//! ```
//!
//! Download and render are strictly sequential. Uploads fan out, one task
//! per page, and are all awaited before the request completes. Uploads
//! finish in arbitrary order, so every result is placed by its page index,
//! never by arrival. The first failure at any stage drops every in-flight
//! task and fails the whole request: callers never see a partial list.

use crate::config::{BlobNaming, ServiceConfig};
use crate::error::{Pdf2ImgError, Stage};
use crate::model::{ConversionRequest, ConversionResult, PageImage, UploadedImageRef};
use crate::pipeline::download::Downloader;
use crate::pipeline::render::{PageRenderer, RasterEngine};
use crate::pipeline::upload::UploadRelay;
use crate::storage::BlobStore;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Where a single request currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Downloading,
    Rendering,
    Uploading { pages: usize },
    Completed { images: usize },
    Failed { stage: Stage },
}

impl PipelineState {
    /// `Completed` and `Failed` have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed { .. } | PipelineState::Failed { .. }
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Downloading => f.write_str("downloading"),
            PipelineState::Rendering => f.write_str("rendering"),
            PipelineState::Uploading { pages } => write!(f, "uploading ({pages} pages)"),
            PipelineState::Completed { images } => write!(f, "completed ({images} images)"),
            PipelineState::Failed { stage } => write!(f, "failed during {stage}"),
        }
    }
}

/// Download → render → upload, shared by every request the process serves.
///
/// Holds only read-only handles; each call to [`convert`](Self::convert)
/// keeps its own state on the stack.
#[derive(Debug, Clone)]
pub struct ConversionPipeline {
    downloader: Downloader,
    renderer: PageRenderer,
    relay: UploadRelay,
    naming: BlobNaming,
    upload_concurrency: Option<usize>,
    request_timeout: Option<Duration>,
}

impl ConversionPipeline {
    /// Wire the stages together from `config`, a bound PDF engine and a
    /// storage handle.
    pub fn new(
        config: &ServiceConfig,
        engine: Arc<dyn RasterEngine>,
        store: Arc<dyn BlobStore>,
    ) -> Result<Self, Pdf2ImgError> {
        Ok(Self {
            downloader: Downloader::new(config)?,
            renderer: PageRenderer::new(engine, config),
            relay: UploadRelay::new(store, config),
            naming: config.naming,
            upload_concurrency: config.upload_concurrency,
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Convert the document behind `request` and return one signed URL per
    /// page, in page order.
    ///
    /// # Errors
    /// The first stage failure, unchanged. [`Pdf2ImgError::EmptyResult`]
    /// if nothing was produced, [`Pdf2ImgError::Timeout`] if a request
    /// deadline is configured and exceeded.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, Pdf2ImgError> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let mut state = PipelineState::Idle;
        info!("[{}] Starting conversion: {}", request_id, request.url);

        let outcome = match self.request_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.run(&request_id, request, &mut state)).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Pdf2ImgError::Timeout {
                        secs: limit.as_secs(),
                    }),
                }
            }
            None => self.run(&request_id, request, &mut state).await,
        };

        match &outcome {
            Ok(result) => info!(
                "[{}] Conversion complete: {} images in {}ms",
                request_id,
                result.len(),
                started.elapsed().as_millis()
            ),
            Err(e) => {
                let failed_in = state;
                advance(&request_id, &mut state, PipelineState::Failed { stage: e.stage() });
                if e.is_client_error() {
                    warn!("[{}] Rejected while {}: {}", request_id, failed_in, e);
                } else {
                    error!("[{}] Failed while {}: {}", request_id, failed_in, e);
                }
            }
        }
        outcome
    }

    async fn run(
        &self,
        request_id: &str,
        request: &ConversionRequest,
        state: &mut PipelineState,
    ) -> Result<ConversionResult, Pdf2ImgError> {
        request.validate()?;

        // ── Step 1: Download ─────────────────────────────────────────────
        advance(request_id, state, PipelineState::Downloading);
        let document = self.downloader.fetch(&request.url).await?;

        // ── Step 2: Render ───────────────────────────────────────────────
        advance(request_id, state, PipelineState::Rendering);
        let pages = self.renderer.render(document).await?;
        if pages.is_empty() {
            return Err(Pdf2ImgError::EmptyResult);
        }

        // ── Step 3: Upload (fan-out) ─────────────────────────────────────
        advance(
            request_id,
            state,
            PipelineState::Uploading { pages: pages.len() },
        );
        let images = self.upload_all(request_id, pages).await?;
        if images.is_empty() {
            return Err(Pdf2ImgError::EmptyResult);
        }

        advance(
            request_id,
            state,
            PipelineState::Completed {
                images: images.len(),
            },
        );
        Ok(ConversionResult { images })
    }

    /// Upload every page concurrently and return URLs in page order.
    async fn upload_all(
        &self,
        request_id: &str,
        pages: Vec<PageImage>,
    ) -> Result<Vec<UploadedImageRef>, Pdf2ImgError> {
        let total = pages.len();
        let limit = self.upload_concurrency.unwrap_or(total).max(1);
        let relay = &self.relay;
        let naming = self.naming;

        let uploads = stream::iter(pages.into_iter().map(|page| {
            let name = naming.object_name(request_id, page.page_number());
            async move {
                let url = relay.store(page.png, &name).await?;
                Ok::<_, Pdf2ImgError>((page.index, url))
            }
        }))
        .buffer_unordered(limit);
        let mut uploads = std::pin::pin!(uploads);

        let mut slots: Vec<Option<UploadedImageRef>> = vec![None; total];
        while let Some((index, url)) = uploads.try_next().await? {
            debug!("[{}] Page {} uploaded", request_id, index + 1);
            match slots.get_mut(index) {
                Some(slot) => *slot = Some(url),
                None => {
                    return Err(Pdf2ImgError::Internal(format!(
                        "upload result for page {} outside 1..={}",
                        index + 1,
                        total
                    )))
                }
            }
        }

        let images: Vec<UploadedImageRef> = slots.into_iter().flatten().collect();
        if !images.is_empty() && images.len() != total {
            return Err(Pdf2ImgError::Internal(format!(
                "collected {} of {} page URLs",
                images.len(),
                total
            )));
        }
        Ok(images)
    }
}

fn advance(request_id: &str, state: &mut PipelineState, next: PipelineState) {
    debug!("[{}] {} → {}", request_id, state, next);
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::testing::FakeEngine;
    use crate::storage::MemoryBlobStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PDF_BODY: &[u8] = b"%PDF-1.7 fake body";

    fn config(builder: crate::config::ServiceConfigBuilder) -> ServiceConfig {
        builder.container("pages").build().unwrap()
    }

    async fn serve_pdf(server: &MockServer) -> ConversionRequest {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/doc.pdf");
                then.status(200)
                    .header("content-type", "application/pdf")
                    .body(PDF_BODY);
            })
            .await;
        ConversionRequest::parse(&server.url("/doc.pdf")).unwrap()
    }

    /// Wraps [`MemoryBlobStore`], delaying each write so that earlier pages
    /// finish last and tracking how many writes overlap.
    struct SlowStore {
        inner: MemoryBlobStore,
        delay_ms: fn(&str) -> u64,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowStore {
        fn new(delay_ms: fn(&str) -> u64) -> Self {
            Self {
                inner: MemoryBlobStore::new(),
                delay_ms,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BlobStore for SlowStore {
        async fn ensure_container(&self, container: &str) -> Result<(), Pdf2ImgError> {
            self.inner.ensure_container(container).await
        }

        async fn put_object(
            &self,
            container: &str,
            name: &str,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<(), Pdf2ImgError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis((self.delay_ms)(name))).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner
                .put_object(container, name, bytes, content_type)
                .await
        }

        fn signed_url(
            &self,
            container: &str,
            name: &str,
            validity: Duration,
        ) -> Result<String, Pdf2ImgError> {
            self.inner.signed_url(container, name, validity)
        }
    }

    fn page_number(name: &str) -> u64 {
        name.rsplit("page")
            .next()
            .and_then(|s| s.trim_end_matches(".png").parse().ok())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn three_page_document_yields_three_resolvable_urls() {
        let server = MockServer::start_async().await;
        let request = serve_pdf(&server).await;
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder()),
            Arc::new(FakeEngine::with_pages(3)),
            store.clone(),
        )
        .unwrap();

        let result = pipeline.convert(&request).await.unwrap();

        assert_eq!(result.len(), 3);
        for (i, url) in result.images.iter().enumerate() {
            assert!(url.as_str().contains(&format!("/page{}.png?", i + 1)));
            let png = store.resolve(url.as_str(), Utc::now()).unwrap();
            assert!(!png.is_empty());
            image::load_from_memory(&png).expect("stored bytes are a PNG");
        }
    }

    #[tokio::test]
    async fn urls_follow_page_order_not_completion_order() {
        let server = MockServer::start_async().await;
        let request = serve_pdf(&server).await;
        // Page 1 takes longest, page 5 is quickest.
        let store = Arc::new(SlowStore::new(|name| (6 - page_number(name)) * 30));
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder()),
            Arc::new(FakeEngine::with_pages(5)),
            store.clone(),
        )
        .unwrap();

        let result = pipeline.convert(&request).await.unwrap();

        let numbers: Vec<u64> = result
            .images
            .iter()
            .map(|url| {
                let path = url.as_str().split('?').next().unwrap_or_default();
                page_number(path)
            })
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert!(store.peak.load(Ordering::SeqCst) > 1, "uploads overlapped");
    }

    #[tokio::test]
    async fn upload_concurrency_bounds_in_flight_writes() {
        let server = MockServer::start_async().await;
        let request = serve_pdf(&server).await;
        let store = Arc::new(SlowStore::new(|_| 20));
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder().upload_concurrency(2)),
            Arc::new(FakeEngine::with_pages(6)),
            store.clone(),
        )
        .unwrap();

        let result = pipeline.convert(&request).await.unwrap();

        assert_eq!(result.len(), 6);
        assert!(store.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn concurrent_requests_do_not_share_object_names() {
        let server = MockServer::start_async().await;
        let request = serve_pdf(&server).await;
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder()),
            Arc::new(FakeEngine::with_pages(3)),
            store.clone(),
        )
        .unwrap();

        let (a, b) = tokio::join!(pipeline.convert(&request), pipeline.convert(&request));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.images[0], b.images[0]);
        assert_eq!(store.object_count(), 6);
    }

    #[tokio::test]
    async fn flat_naming_reuses_page_names() {
        let server = MockServer::start_async().await;
        let request = serve_pdf(&server).await;
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder().naming(BlobNaming::Flat)),
            Arc::new(FakeEngine::with_pages(2)),
            store.clone(),
        )
        .unwrap();

        pipeline.convert(&request).await.unwrap();
        pipeline.convert(&request).await.unwrap();

        assert_eq!(store.object_count(), 2);
        assert_eq!(store.put_count(), 4);
        assert!(store.get("pages", "page1.png").is_some());
    }

    #[tokio::test]
    async fn remote_404_fails_before_rendering() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.pdf");
                then.status(404);
            })
            .await;
        let engine = Arc::new(FakeEngine::with_pages(3));
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder()),
            engine.clone(),
            store.clone(),
        )
        .unwrap();

        let request = ConversionRequest::parse(&server.url("/missing.pdf")).unwrap();
        let err = pipeline.convert(&request).await.unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert_eq!(err.detail(), "Failed to download PDF. Status code: 404");
        assert_eq!(engine.rendered(), 0);
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn html_response_never_reaches_renderer() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/page");
                then.status(200)
                    .header("content-type", "text/html; charset=utf-8")
                    .body("<html></html>");
            })
            .await;
        let engine = Arc::new(FakeEngine::with_pages(3));
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline =
            ConversionPipeline::new(&config(ServiceConfig::builder()), engine.clone(), store.clone())
                .unwrap();

        let request = ConversionRequest::parse(&server.url("/page")).unwrap();
        let err = pipeline.convert(&request).await.unwrap_err();

        assert!(matches!(err, Pdf2ImgError::UnsupportedContentType { .. }));
        assert_eq!(engine.rendered(), 0);
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn too_many_pages_uploads_nothing() {
        let server = MockServer::start_async().await;
        let request = serve_pdf(&server).await;
        let engine = Arc::new(FakeEngine::with_pages(4));
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder().max_pages(3)),
            engine.clone(),
            store.clone(),
        )
        .unwrap();

        let err = pipeline.convert(&request).await.unwrap_err();

        assert!(matches!(err, Pdf2ImgError::TooManyPages { pages: 4, max: 3 }));
        assert_eq!(err.status_code(), 400);
        assert_eq!(engine.rendered(), 0);
        assert!(!store.has_container("pages"));
    }

    #[tokio::test]
    async fn malformed_document_is_server_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/broken.pdf");
                then.status(200)
                    .header("content-type", "application/pdf")
                    .body("not really a pdf");
            })
            .await;
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder()),
            Arc::new(FakeEngine::with_pages(1)),
            Arc::new(MemoryBlobStore::new()),
        )
        .unwrap();

        let request = ConversionRequest::parse(&server.url("/broken.pdf")).unwrap();
        let err = pipeline.convert(&request).await.unwrap_err();

        assert!(matches!(err, Pdf2ImgError::MalformedDocument { .. }));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.detail(), "Error converting PDF to images.");
    }

    #[tokio::test]
    async fn failed_upload_fails_whole_request() {
        let server = MockServer::start_async().await;
        let request = serve_pdf(&server).await;
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder()),
            Arc::new(FakeEngine::with_pages(3)),
            Arc::new(MemoryBlobStore::failing_uploads()),
        )
        .unwrap();

        let err = pipeline.convert(&request).await.unwrap_err();

        assert!(matches!(err, Pdf2ImgError::Upload { .. }));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn non_http_url_is_rejected_before_download() {
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder()),
            Arc::new(FakeEngine::with_pages(1)),
            store.clone(),
        )
        .unwrap();
        let request = ConversionRequest {
            url: url::Url::parse("ftp://example.com/doc.pdf").unwrap(),
        };

        let err = pipeline.convert(&request).await.unwrap_err();

        assert!(matches!(err, Pdf2ImgError::InvalidUrl { .. }));
        assert_eq!(err.status_code(), 422);
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn zero_pages_is_empty_result() {
        let server = MockServer::start_async().await;
        let request = serve_pdf(&server).await;
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder()),
            Arc::new(FakeEngine::with_pages(0)),
            Arc::new(MemoryBlobStore::new()),
        )
        .unwrap();

        let err = pipeline.convert(&request).await.unwrap_err();
        assert!(matches!(err, Pdf2ImgError::EmptyResult));
        assert_eq!(err.detail(), "No images were generated.");
    }

    #[tokio::test]
    async fn request_deadline_turns_into_timeout() {
        let server = MockServer::start_async().await;
        let request = serve_pdf(&server).await;
        let pipeline = ConversionPipeline::new(
            &config(ServiceConfig::builder().request_timeout_secs(1)),
            Arc::new(FakeEngine::with_pages(1)),
            Arc::new(SlowStore::new(|_| 3_000)),
        )
        .unwrap();

        let err = pipeline.convert(&request).await.unwrap_err();
        assert!(matches!(err, Pdf2ImgError::Timeout { secs: 1 }));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn terminal_states() {
        assert!(!PipelineState::Idle.is_terminal());
        assert!(!PipelineState::Uploading { pages: 3 }.is_terminal());
        assert!(PipelineState::Completed { images: 3 }.is_terminal());
        assert!(PipelineState::Failed {
            stage: Stage::Download
        }
        .is_terminal());
        assert_eq!(
            PipelineState::Failed {
                stage: Stage::Render
            }
            .to_string(),
            "failed during render"
        );
    }
}
