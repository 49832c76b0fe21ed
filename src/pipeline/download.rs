//! Download stage: fetch the document bytes behind a URL.
//!
//! The response is accepted only if the status is 2xx and the declared
//! `Content-Type` mentions `pdf`. The byte ceiling is enforced twice: once
//! against `Content-Length` before reading, and again while chunks stream
//! in, so an oversized body is dropped as soon as it crosses the limit.
//! There is no retry.

use crate::config::ServiceConfig;
use crate::error::Pdf2ImgError;
use crate::model::DocumentBytes;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Fetches remote documents. Cheap to clone; the inner client is pooled.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    user_agent: String,
    max_bytes: u64,
}

impl Downloader {
    /// Build a downloader from the service config.
    pub fn new(config: &ServiceConfig) -> Result<Self, Pdf2ImgError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Pdf2ImgError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_pdf_bytes,
        })
    }

    /// Download `url`, returning its bytes and declared content type.
    pub async fn fetch(&self, url: &Url) -> Result<DocumentBytes, Pdf2ImgError> {
        info!("Downloading PDF from: {}", url);

        let mut response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        info!("Response status: {}", status);
        debug!("Response headers: {:?}", response.headers());

        if !status.is_success() {
            return Err(Pdf2ImgError::RemoteFetch {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        info!("Content-Type: {}", content_type);

        if !is_pdf_content_type(&content_type) {
            return Err(Pdf2ImgError::UnsupportedContentType {
                url: url.to_string(),
                content_type,
            });
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                warn!(
                    "Declared Content-Length {} exceeds limit {}",
                    declared, self.max_bytes
                );
                return Err(Pdf2ImgError::PayloadTooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                    received: declared,
                });
            }
        }

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transport_error(url, &e))?
        {
            let received = (bytes.len() + chunk.len()) as u64;
            if received > self.max_bytes {
                warn!("Body exceeded limit {} while streaming", self.max_bytes);
                return Err(Pdf2ImgError::PayloadTooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                    received,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        info!("Downloaded {} bytes", bytes.len());

        Ok(DocumentBytes {
            bytes,
            content_type,
        })
    }
}

/// `true` when the declared content type indicates a PDF.
pub fn is_pdf_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("pdf")
}

fn transport_error(url: &Url, e: &reqwest::Error) -> Pdf2ImgError {
    warn!("Client error while downloading {}: {}", url, e);
    Pdf2ImgError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn downloader(max_bytes: u64) -> Downloader {
        let config = ServiceConfig::builder()
            .max_pdf_bytes(max_bytes)
            .download_timeout_secs(5)
            .build()
            .expect("valid config");
        Downloader::new(&config).expect("client builds")
    }

    fn url(server: &MockServer, path: &str) -> Url {
        server.url(path).parse().expect("valid URL")
    }

    /// One-shot origin that streams `chunks` with `Transfer-Encoding:
    /// chunked` and no `Content-Length`. Unless `finish` is set the body is
    /// never terminated, so a reader that keeps going only ends on timeout.
    async fn chunked_origin(chunks: usize, chunk: &'static [u8], finish: bool) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;

            let head = b"HTTP/1.1 200 OK\r\n\
                         content-type: application/pdf\r\n\
                         transfer-encoding: chunked\r\n\r\n";
            socket.write_all(head).await.expect("head");
            for _ in 0..chunks {
                let frame = [
                    format!("{:x}\r\n", chunk.len()).as_bytes(),
                    chunk,
                    &b"\r\n"[..],
                ]
                .concat();
                socket.write_all(&frame).await.expect("chunk");
                socket.flush().await.expect("flush");
            }
            if finish {
                socket.write_all(b"0\r\n\r\n").await.expect("trailer");
                socket.flush().await.expect("flush");
            }
            // Hold the connection open.
            std::future::pending::<()>().await;
        });

        format!("http://{addr}/stream.pdf").parse().expect("valid URL")
    }

    #[test]
    fn test_is_pdf_content_type() {
        assert!(is_pdf_content_type("application/pdf"));
        assert!(is_pdf_content_type("Application/PDF; charset=binary"));
        assert!(is_pdf_content_type("application/x-pdf"));
        assert!(!is_pdf_content_type("text/html"));
        assert!(!is_pdf_content_type(""));
    }

    #[tokio::test]
    async fn fetch_returns_body_and_content_type() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/doc.pdf")
                .header("user-agent", "Mozilla/5.0");
            then.status(200)
                .header("content-type", "application/pdf")
                .body(b"%PDF-1.4 fake".to_vec());
        });

        let doc = downloader(1024)
            .fetch(&url(&server, "/doc.pdf"))
            .await
            .expect("download succeeds");

        mock.assert();
        assert_eq!(doc.bytes, b"%PDF-1.4 fake");
        assert_eq!(doc.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn fetch_follows_redirects() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/old.pdf");
            then.status(302).header("location", "/new.pdf");
        });
        server.mock(|when, then| {
            when.method(GET).path("/new.pdf");
            then.status(200)
                .header("content-type", "application/pdf")
                .body(b"%PDF".to_vec());
        });

        let doc = downloader(1024)
            .fetch(&url(&server, "/old.pdf"))
            .await
            .expect("redirect followed");
        assert_eq!(doc.bytes, b"%PDF");
    }

    #[tokio::test]
    async fn non_success_status_is_remote_fetch_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/missing.pdf");
            then.status(404);
        });

        let err = downloader(1024)
            .fetch(&url(&server, "/missing.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2ImgError::RemoteFetch { status: 404, .. }));
    }

    #[tokio::test]
    async fn html_is_rejected() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/page");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html></html>");
        });

        let err = downloader(1024)
            .fetch(&url(&server, "/page"))
            .await
            .unwrap_err();
        match err {
            Pdf2ImgError::UnsupportedContentType { content_type, .. } => {
                assert_eq!(content_type, "text/html")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/big.pdf");
            then.status(200)
                .header("content-type", "application/pdf")
                .body(vec![b'x'; 4096]);
        });

        let err = downloader(1000)
            .fetch(&url(&server, "/big.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Pdf2ImgError::PayloadTooLarge { limit: 1000, .. }
        ));
    }

    #[tokio::test]
    async fn chunked_body_without_length_is_cut_off_at_limit() {
        // Three 16-byte chunks cross a 40-byte limit; the body never ends.
        let target = chunked_origin(3, &[b'x'; 16], false).await;

        let outcome = tokio::time::timeout(
            Duration::from_secs(3),
            downloader(40).fetch(&target),
        )
        .await
        .expect("reading stops once the limit is crossed");

        match outcome.unwrap_err() {
            Pdf2ImgError::PayloadTooLarge {
                limit, received, ..
            } => {
                assert_eq!(limit, 40);
                assert!(received > 40 && received <= 48, "received {received}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn chunked_body_under_limit_is_accepted() {
        let target = chunked_origin(2, b"%PDF-1.7", true).await;

        let doc = downloader(40).fetch(&target).await.expect("download succeeds");
        assert_eq!(doc.bytes, b"%PDF-1.7%PDF-1.7");
        assert_eq!(doc.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn body_at_exact_limit_is_accepted() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/edge.pdf");
            then.status(200)
                .header("content-type", "application/pdf")
                .body(vec![b'x'; 1000]);
        });

        let doc = downloader(1000)
            .fetch(&url(&server, "/edge.pdf"))
            .await
            .expect("limit is inclusive");
        assert_eq!(doc.len(), 1000);
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let target: Url = format!("http://127.0.0.1:{port}/doc.pdf").parse().unwrap();

        let err = downloader(1024).fetch(&target).await.unwrap_err();
        assert!(matches!(err, Pdf2ImgError::Transport { .. }));
    }
}
