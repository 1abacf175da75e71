//! Protocol-mandated fingerprints for certificates and keys.
//!
//! The server identifies a device by digests of its identity material:
//! SHA-1 over the certificate DER, MD5 over the decoded PEM body of a key.
//! MD5/SHA-1 here are wire-format requirements of a server we cannot
//! change, not a security choice. Output is a pure function of the input
//! bytes.

use satchel_core::{Result, SatchelError};

use crate::crypto::{CryptoProvider, DigestAlgorithm};

/// SHA-1 thumbprint of a DER certificate: 20 uppercase hex pairs joined
/// by `:` (59 characters), e.g. `AB:12:...`.
pub fn certificate_fingerprint(crypto: &dyn CryptoProvider, der: &[u8]) -> Result<String> {
    let digest = crypto.digest(DigestAlgorithm::Sha1, der)?;
    let hexed = hex::encode_upper(digest);
    let groups: Vec<&str> = hexed
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
        .collect();
    Ok(groups.join(":"))
}

/// Stable key identifier used in the signature header and registration
/// payloads: the certificate thumbprint with colons removed, lowercase.
pub fn key_id(crypto: &dyn CryptoProvider, der: &[u8]) -> Result<String> {
    Ok(certificate_fingerprint(crypto, der)?
        .replace(':', "")
        .to_lowercase())
}

/// MD5 fingerprint of a PEM-encoded key (public or private): strip the
/// armor and newlines, base64-decode the body, digest, render as 32
/// lowercase hex characters with no separators.
pub fn key_fingerprint(crypto: &dyn CryptoProvider, pem: &str) -> Result<String> {
    let parsed = pem::parse(pem)
        .map_err(|e| SatchelError::DecodingFailed(format!("PEM body: {e}")))?;
    let digest = crypto.digest(DigestAlgorithm::Md5, parsed.contents())?;
    Ok(hex::encode(digest))
}
