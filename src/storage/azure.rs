//! Azure Blob Storage over plain REST.
//!
//! Two operations are needed: `Create Container` and `Put Blob`. Both are
//! authorised with Shared Key: an HMAC over a canonical rendering of the
//! request, keyed with the account key from the connection string. Read
//! URLs are service SAS tokens minted locally (see [`crate::storage::sas`]).

use crate::error::Pdf2ImgError;
use crate::storage::connection::ConnectionString;
use crate::storage::{encode_blob_path, sas, BlobStore};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// REST API version sent with every request.
pub const STORAGE_API_VERSION: &str = "2021-08-06";

/// Blob store client. One instance per process, shared read-only.
#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    client: reqwest::Client,
    credentials: ConnectionString,
}

impl AzureBlobStore {
    pub fn new(credentials: ConnectionString) -> Result<Self, Pdf2ImgError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Pdf2ImgError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(credentials, client))
    }

    /// Reuse an existing HTTP client (connection pool).
    pub fn with_client(credentials: ConnectionString, client: reqwest::Client) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Unsigned URL of `container/name`.
    pub fn blob_url(&self, container: &str, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.credentials.blob_endpoint(),
            container,
            encode_blob_path(name)
        )
    }

    fn container_url(&self, container: &str) -> String {
        format!(
            "{}/{}?restype=container",
            self.credentials.blob_endpoint(),
            container
        )
    }

    /// Build and send a Shared Key authorised request.
    async fn send(
        &self,
        method: Method,
        url: &str,
        mut headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, String> {
        let url = Url::parse(url).map_err(|e| format!("invalid URL '{url}': {e}"))?;

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        insert_header(&mut headers, "x-ms-date", &date)?;
        insert_header(&mut headers, "x-ms-version", STORAGE_API_VERSION)?;

        let authorization = self.authorization(&method, body.len(), &headers, &url)?;
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization).map_err(|e| e.to_string())?,
        );

        self.client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| e.to_string())
    }

    /// `Authorization` header value for a request with `headers` already
    /// carrying `x-ms-date` and `x-ms-version`.
    fn authorization(
        &self,
        method: &Method,
        content_length: usize,
        headers: &HeaderMap,
        url: &Url,
    ) -> Result<String, String> {
        let account = self.credentials.account_name();
        let string_to_sign =
            shared_key_string_to_sign(method, content_length, headers, url, account);
        let signature = self
            .credentials
            .sign(&string_to_sign)
            .map_err(|e| e.to_string())?;
        Ok(format!("SharedKey {account}:{signature}"))
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn ensure_container(&self, container: &str) -> Result<(), Pdf2ImgError> {
        let url = self.container_url(container);
        let response = self
            .send(Method::PUT, &url, HeaderMap::new(), Vec::new())
            .await
            .map_err(Pdf2ImgError::StorageUnavailable)?;

        let status = response.status();
        if status == StatusCode::CREATED {
            info!("Created container '{}'", container);
            return Ok(());
        }

        let code = error_code(&response);
        if status == StatusCode::CONFLICT && code.as_deref() == Some("ContainerAlreadyExists") {
            debug!("Container '{}' already exists", container);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            "Container '{}' setup failed: HTTP {} {:?}",
            container, status, code
        );
        Err(Pdf2ImgError::StorageUnavailable(format!(
            "creating container '{container}' returned HTTP {}: {}",
            status.as_u16(),
            code.unwrap_or(body)
        )))
    }

    async fn put_object(
        &self,
        container: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), Pdf2ImgError> {
        let upload_error = |reason: String| Pdf2ImgError::Upload {
            name: name.to_string(),
            reason,
        };

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "x-ms-blob-type", "BlockBlob").map_err(upload_error)?;
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type).map_err(|e| upload_error(e.to_string()))?,
        );

        let size = bytes.len();
        let url = self.blob_url(container, name);
        let response = self
            .send(Method::PUT, &url, headers, bytes)
            .await
            .map_err(upload_error)?;

        let status = response.status();
        if status == StatusCode::CREATED {
            debug!("Uploaded '{}/{}' ({} bytes)", container, name, size);
            return Ok(());
        }

        let code = error_code(&response);
        let body = response.text().await.unwrap_or_default();
        Err(upload_error(format!(
            "HTTP {}: {}",
            status.as_u16(),
            code.unwrap_or(body)
        )))
    }

    fn signed_url(
        &self,
        container: &str,
        name: &str,
        validity: Duration,
    ) -> Result<String, Pdf2ImgError> {
        let validity = chrono::Duration::from_std(validity)
            .map_err(|e| Pdf2ImgError::Signing(format!("validity out of range: {e}")))?;
        let token = sas::blob_read_token(&self.credentials, container, name, Utc::now() + validity)?;
        Ok(format!("{}?{}", self.blob_url(container, name), token))
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), String> {
    let value = HeaderValue::from_str(value).map_err(|e| e.to_string())?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

fn error_code(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Shared Key string-to-sign for service versions 2015-02-21 and later.
fn shared_key_string_to_sign(
    method: &Method,
    content_length: usize,
    headers: &HeaderMap,
    url: &Url,
    account: &str,
) -> String {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let content_length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let fields = [
        method.as_str().to_string(),
        header(reqwest::header::CONTENT_ENCODING),
        header(reqwest::header::CONTENT_LANGUAGE),
        content_length,
        String::new(), // Content-MD5
        header(CONTENT_TYPE),
        String::new(), // Date (x-ms-date is used instead)
        header(reqwest::header::IF_MODIFIED_SINCE),
        header(reqwest::header::IF_MATCH),
        header(reqwest::header::IF_NONE_MATCH),
        header(reqwest::header::IF_UNMODIFIED_SINCE),
        header(reqwest::header::RANGE),
    ];

    let mut out = fields.join("\n");
    out.push('\n');
    out.push_str(&canonicalized_headers(headers));
    out.push_str(&canonicalized_resource(url, account));
    out
}

fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.trim().to_string()))
        })
        .collect();
    ms.sort();
    ms.into_iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect()
}

fn canonicalized_resource(url: &Url, account: &str) -> String {
    let mut out = format!("/{}{}", account, url.path());

    let mut params: Vec<(String, String)> = Vec::new();
    for (key, value) in url.query_pairs() {
        let key = key.to_lowercase();
        match params.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                existing.push(',');
                existing.push_str(&value);
            }
            None => params.push((key, value.into_owned())),
        }
    }
    params.sort();
    for (key, value) in params {
        out.push_str(&format!("\n{key}:{value}"));
    }
    out
}
