//! Storage connection-string parsing.
//!
//! Accepts the `Key=Value;Key=Value` format issued by the storage portal:
//!
//! ```text
//! DefaultEndpointsProtocol=https;AccountName=acme;AccountKey=<base64>;EndpointSuffix=core.windows.net
//! ```
//!
//! `AccountName` and `AccountKey` are required; everything else has a
//! default. `BlobEndpoint` overrides the derived endpoint (emulators, custom
//! domains). `UseDevelopmentStorage=true` expands to the local emulator's
//! well-known account.

use crate::error::Pdf2ImgError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Account used by the local storage emulator.
pub const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";

/// Publicly documented key of the local storage emulator.
pub const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Parsed storage credentials plus the blob service endpoint.
#[derive(Clone)]
pub struct ConnectionString {
    account_name: String,
    account_key: Vec<u8>,
    blob_endpoint: Url,
}

impl ConnectionString {
    /// Parse a connection string, failing on any missing or unusable field.
    pub fn parse(raw: &str) -> Result<Self, Pdf2ImgError> {
        let mut fields: HashMap<&str, &str> = HashMap::new();
        for (position, segment) in raw
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
        {
            // Split on the first '=' only: base64 keys end in '='.
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                Pdf2ImgError::Signing(format!(
                    "connection string segment {} has no '='",
                    position + 1
                ))
            })?;
            fields.insert(key.trim(), value.trim());
        }

        if fields
            .get("UseDevelopmentStorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Self::development();
        }

        let account_name = required(&fields, "AccountName")?;
        let account_key = decode_key(required(&fields, "AccountKey")?)?;

        let blob_endpoint = match fields.get("BlobEndpoint") {
            Some(endpoint) => parse_endpoint(endpoint)?,
            None => {
                let protocol = fields
                    .get("DefaultEndpointsProtocol")
                    .copied()
                    .unwrap_or("https");
                let suffix = fields
                    .get("EndpointSuffix")
                    .copied()
                    .unwrap_or("core.windows.net");
                parse_endpoint(&format!("{protocol}://{account_name}.blob.{suffix}"))?
            }
        };

        Ok(Self {
            account_name: account_name.to_string(),
            account_key,
            blob_endpoint,
        })
    }

    /// Credentials of the local storage emulator.
    pub fn development() -> Result<Self, Pdf2ImgError> {
        Ok(Self {
            account_name: DEV_ACCOUNT_NAME.to_string(),
            account_key: decode_key(DEV_ACCOUNT_KEY)?,
            blob_endpoint: parse_endpoint(DEV_BLOB_ENDPOINT)?,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Blob service endpoint, without a trailing slash.
    pub fn blob_endpoint(&self) -> &str {
        self.blob_endpoint.as_str().trim_end_matches('/')
    }

    /// Base64 HMAC-SHA256 of `payload` under the account key.
    pub fn sign(&self, payload: &str) -> Result<String, Pdf2ImgError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.account_key)
            .map_err(|e| Pdf2ImgError::Signing(format!("HMAC key rejected: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("blob_endpoint", &self.blob_endpoint.as_str())
            .finish()
    }
}

fn required<'a>(fields: &HashMap<&str, &'a str>, key: &str) -> Result<&'a str, Pdf2ImgError> {
    match fields.get(key) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Pdf2ImgError::Signing(format!(
            "{key} not found in connection string"
        ))),
    }
}

fn decode_key(key: &str) -> Result<Vec<u8>, Pdf2ImgError> {
    STANDARD
        .decode(key)
        .map_err(|e| Pdf2ImgError::Signing(format!("AccountKey is not valid base64: {e}")))
}

fn parse_endpoint(endpoint: &str) -> Result<Url, Pdf2ImgError> {
    let url = Url::parse(endpoint)
        .map_err(|e| Pdf2ImgError::Signing(format!("invalid blob endpoint '{endpoint}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Pdf2ImgError::Signing(format!(
            "blob endpoint scheme '{other}' is not supported"
        ))),
    }
}
