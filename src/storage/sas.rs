//! Read-only service SAS tokens for single blobs.
//!
//! The string-to-sign follows the layout for service versions 2020-12-06
//! and later: sixteen newline-separated fields, unused ones left empty.

use crate::error::Pdf2ImgError;
use crate::storage::connection::ConnectionString;
use chrono::{DateTime, SecondsFormat, Utc};

/// Service version the token is signed for.
pub const SAS_VERSION: &str = "2021-08-06";

/// Mint a read-only SAS token for `container/blob` that expires at `expiry`.
///
/// Returns the query string without the leading `?`.
pub fn blob_read_token(
    credentials: &ConnectionString,
    container: &str,
    blob: &str,
    expiry: DateTime<Utc>,
) -> Result<String, Pdf2ImgError> {
    let expiry = expiry.to_rfc3339_opts(SecondsFormat::Secs, true);
    let string_to_sign = string_to_sign(
        "r",
        &expiry,
        &format!("/blob/{}/{}/{}", credentials.account_name(), container, blob),
    );
    let signature = credentials.sign(&string_to_sign)?;

    Ok(format!(
        "se={}&sp=r&sv={}&sr=b&sig={}",
        urlencoding::encode(&expiry),
        SAS_VERSION,
        urlencoding::encode(&signature)
    ))
}

fn string_to_sign(permissions: &str, expiry: &str, canonical_resource: &str) -> String {
    [
        permissions,
        "", // signedStart
        expiry,
        canonical_resource,
        "", // signedIdentifier
        "", // signedIP
        "", // signedProtocol
        SAS_VERSION,
        "b", // signedResource
        "", // signedSnapshotTime
        "", // signedEncryptionScope
        "", // rscc
        "", // rscd
        "", // rsce
        "", // rscl
        "", // rsct
    ]
    .join("\n")
}
