//! The two portal signing protocols behind one `sign` contract.
//!
//! A device registers under exactly one scheme and keeps it for the life of
//! the identity, so the API client stays protocol-agnostic: it hands the
//! serialized body and target URL to whichever variant is active and
//! attaches the returned headers.

use base64::Engine;
use chrono::{DateTime, Utc};

use satchel_core::{
    Result, SignedHeaders, SigningSchemeKind, HEADER_CERTIFICATE_KEY, HEADER_SIGNATURE,
    HEADER_SIGNATURE_VALUE,
};
use satchel_identity::{
    fingerprint, CryptoProvider, DigestAlgorithm, Pkcs12Importer, PrivateKey,
    SelfSignedCertificate, StoredIdentity, BUNDLE_PASSWORD,
};

use crate::canonical::CanonicalRequest;

/// Literal algorithm token in the signature header
const ALGORITHM_TOKEN: &str = "sha256withrsa";

/// The active signing protocol, selected once at registration time
#[derive(Clone)]
pub enum SigningScheme {
    /// PKCS#12 protocol: SHA-1 over the whole body, plus the opaque
    /// server-assigned credential token
    Legacy {
        private_key: PrivateKey,
        credential_token: String,
    },
    /// Self-signed-certificate protocol: HTTP-signature style header over
    /// the canonical request
    HttpSignature {
        private_key: PrivateKey,
        key_id: String,
    },
}

impl std::fmt::Debug for SigningScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy { .. } => f.write_str("SigningScheme::Legacy"),
            Self::HttpSignature { key_id, .. } => {
                write!(f, "SigningScheme::HttpSignature(keyId={key_id})")
            }
        }
    }
}

impl SigningScheme {
    #[must_use]
    pub const fn kind(&self) -> SigningSchemeKind {
        match self {
            Self::Legacy { .. } => SigningSchemeKind::Legacy,
            Self::HttpSignature { .. } => SigningSchemeKind::HttpSignature,
        }
    }

    /// Reconstruct the scheme from persisted identity material.
    ///
    /// Corrupt material is `DecodingFailed`/`ImportFailed`; the caller must
    /// re-register, never retry.
    pub fn from_stored(crypto: &dyn CryptoProvider, stored: &StoredIdentity) -> Result<Self> {
        match stored {
            StoredIdentity::Legacy {
                pkcs12_base64,
                credential_token,
            } => {
                let identity = Pkcs12Importer::import_base64(pkcs12_base64, BUNDLE_PASSWORD)?;
                Ok(Self::Legacy {
                    private_key: identity.private_key().clone(),
                    credential_token: credential_token.clone(),
                })
            }
            StoredIdentity::SelfSigned {
                certificate_pem,
                private_key_pem,
            } => {
                let cert = SelfSignedCertificate::from_pem(certificate_pem, private_key_pem)?;
                let key_id = fingerprint::key_id(crypto, &cert.certificate_der()?)?;
                Ok(Self::HttpSignature {
                    private_key: cert.private_key().clone(),
                    key_id,
                })
            }
        }
    }

    /// Produce the transport headers for one request.
    ///
    /// Deterministic: for a fixed body, URL, instant and key, the output is
    /// byte-identical across calls.
    pub fn sign(
        &self,
        crypto: &dyn CryptoProvider,
        body: Option<&[u8]>,
        request_url: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders> {
        match self {
            Self::Legacy {
                private_key,
                credential_token,
            } => {
                // Signing input is the entire serialized body, unmodified
                let signature =
                    crypto.sign(private_key, DigestAlgorithm::Sha1, body.unwrap_or_default())?;
                let signature = base64::engine::general_purpose::STANDARD.encode(signature);
                Ok(SignedHeaders::new(vec![
                    (HEADER_SIGNATURE_VALUE.to_string(), signature),
                    (HEADER_CERTIFICATE_KEY.to_string(), credential_token.clone()),
                ]))
            }
            Self::HttpSignature {
                private_key,
                key_id,
            } => {
                let canonical = CanonicalRequest::build(crypto, request_url, body, now)?;
                let signature = crypto.sign(
                    private_key,
                    DigestAlgorithm::Sha256,
                    canonical.signing_input().as_bytes(),
                )?;
                let signature = base64::engine::general_purpose::STANDARD.encode(signature);

                // The wrapping text around the signature value is wire
                // format the server expects verbatim.
                let value = format!(
                    "keyId=\"{key_id}\",headers=\"{names}\",algorithm=\"{ALGORITHM_TOKEN}\",signature=Base64(SHA256withRSA({signature}))",
                    names = canonical.header_names(),
                );
                tracing::debug!(key_id = %key_id, "signed request");
                Ok(SignedHeaders::new(vec![(
                    HEADER_SIGNATURE.to_string(),
                    value,
                )]))
            }
        }
    }
}
