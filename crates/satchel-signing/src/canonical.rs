//! Canonical request derivation for the HTTP-signature protocol.
//!
//! A [`CanonicalRequest`] is a read-only view of one outgoing request —
//! canonical path, optional body digest, formatted date — that exists only
//! for the duration of a single sign operation. The server recomputes the
//! same view, so every byte here is wire-format.

use base64::Engine;
use chrono::{DateTime, Utc};

use satchel_core::{Result, SatchelError};
use satchel_identity::{CryptoProvider, DigestAlgorithm};

/// Path marker the canonical URL starts at
const CANONICAL_MARKER: &str = "api/mobile/";

/// Signed field names, in protocol order
const FIELD_CANONICAL_URL: &str = "vCanonicalUrl";
const FIELD_DIGEST: &str = "Digest";
const FIELD_DATE: &str = "vDate";

/// Extract the canonical URL: the first `api/mobile/.+` match,
/// percent-encoded for safe header embedding, lowercased.
///
/// A URL without the marker (or with nothing after it) cannot be signed;
/// the caller must not send such a request.
pub fn extract_canonical_url(request_url: &str) -> Result<String> {
    let start = request_url
        .find(CANONICAL_MARKER)
        .ok_or_else(|| SatchelError::NoCanonicalUrl(request_url.to_string()))?;
    let matched = &request_url[start..];
    if matched.len() == CANONICAL_MARKER.len() {
        return Err(SatchelError::NoCanonicalUrl(request_url.to_string()));
    }
    let encoded: String = url::form_urlencoded::byte_serialize(matched.as_bytes()).collect();
    Ok(encoded.to_lowercase())
}

/// Base64 SHA-256 digest of the raw body bytes
pub fn body_digest(crypto: &dyn CryptoProvider, body: &[u8]) -> Result<String> {
    let digest = crypto.digest(DigestAlgorithm::Sha256, body)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}

/// Format the signing date: `EEE, dd MMM yyyy HH:mm:ss` in the fixed
/// POSIX/UTC locale, with a literal ` GMT` suffix.
#[must_use]
pub fn signing_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// The ordered signing fields for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    canonical_url: String,
    digest: Option<String>,
    date: String,
}

impl CanonicalRequest {
    /// Canonicalize a request. The digest field is present only when a
    /// body is.
    pub fn build(
        crypto: &dyn CryptoProvider,
        request_url: &str,
        body: Option<&[u8]>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            canonical_url: extract_canonical_url(request_url)?,
            digest: body.map(|b| body_digest(crypto, b)).transpose()?,
            date: signing_date(now),
        })
    }

    /// Signed field names, space-joined in protocol order
    #[must_use]
    pub fn header_names(&self) -> String {
        let mut names = vec![FIELD_CANONICAL_URL];
        if self.digest.is_some() {
            names.push(FIELD_DIGEST);
        }
        names.push(FIELD_DATE);
        names.join(" ")
    }

    /// Signing input: the field values concatenated in the same order
    /// with no separator
    #[must_use]
    pub fn signing_input(&self) -> String {
        let mut input = self.canonical_url.clone();
        if let Some(digest) = &self.digest {
            input.push_str(digest);
        }
        input.push_str(&self.date);
        input
    }
}
