//! Certificate acquisition: PKCS#12 import and self-signed generation.
//!
//! Two interchangeable strategies produce a usable signing identity. The
//! legacy protocol ships a password-protected PKCS#12 bundle from the server;
//! the newer protocol generates a keypair locally and self-signs.

use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::x509::{X509NameBuilder, X509};
use x509_parser::prelude::FromDer;

use satchel_core::{Result, SatchelError};

use crate::crypto::{CryptoProvider, PrivateKey, PublicKey};

/// Fixed, protocol-mandated password protecting server-issued PKCS#12
/// bundles. Shared secret of the wire protocol, not a user credential.
pub const BUNDLE_PASSWORD: &str = "E1E9AF56C7394C84B15282A9F10A5934";

/// Self-signed certificate validity, in whole seconds.
///
/// Computed as seconds rather than calendar units so the window is
/// identical regardless of timezone or DST at generation time.
pub const VALIDITY_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Identity recovered from a server-issued PKCS#12 bundle.
///
/// Never partially initialized: construction fails unless both the leaf
/// certificate and its private key were extracted.
pub struct ImportedIdentity {
    private_key: PrivateKey,
    certificate_der: Vec<u8>,
    ca_chain: Vec<Vec<u8>>,
}

impl std::fmt::Debug for ImportedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ImportedIdentity(redacted)")
    }
}

impl ImportedIdentity {
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    pub fn ca_chain(&self) -> &[Vec<u8>] {
        &self.ca_chain
    }

    /// Leaf public key from the trust object
    pub fn public_key(&self) -> Result<PublicKey> {
        let cert = X509::from_der(&self.certificate_der)
            .map_err(|e| SatchelError::DecodingFailed(format!("leaf certificate: {e}")))?;
        cert.public_key()
            .map(PublicKey)
            .map_err(|_| SatchelError::NoPrivateKey)
    }
}

/// Parses password-protected PKCS#12 bundles into an [`ImportedIdentity`]
pub struct Pkcs12Importer;

impl Pkcs12Importer {
    /// Import an opaque binary bundle using the protocol-mandated password.
    ///
    /// Failure modes are distinct: a corrupt bundle or wrong password is
    /// `ImportFailed`; a bundle that parses but carries no certificate entry
    /// is `NoIdentity`; a certificate without an extractable private key is
    /// `NoPrivateKey`.
    pub fn import(bundle: &[u8], password: &str) -> Result<ImportedIdentity> {
        let pkcs12 = Pkcs12::from_der(bundle)
            .map_err(|e| SatchelError::ImportFailed(format!("bundle parse: {e}")))?;
        let parsed = pkcs12
            .parse2(password)
            .map_err(|e| SatchelError::ImportFailed(format!("bundle open: {e}")))?;

        let cert = parsed.cert.ok_or(SatchelError::NoIdentity)?;
        let private_key = parsed.pkey.ok_or(SatchelError::NoPrivateKey)?;

        let certificate_der = cert
            .to_der()
            .map_err(|e| SatchelError::DecodingFailed(format!("leaf DER: {e}")))?;
        let mut ca_chain = Vec::new();
        if let Some(stack) = parsed.ca {
            for ca in stack {
                ca_chain.push(
                    ca.to_der()
                        .map_err(|e| SatchelError::DecodingFailed(format!("chain DER: {e}")))?,
                );
            }
        }

        tracing::debug!(chain_len = ca_chain.len(), "imported PKCS#12 identity");

        Ok(ImportedIdentity {
            private_key: PrivateKey(private_key),
            certificate_der,
            ca_chain,
        })
    }

    /// Import a bundle stored as base64 (the CredentialStore representation)
    pub fn import_base64(bundle_base64: &str, password: &str) -> Result<ImportedIdentity> {
        use base64::Engine;
        let bundle = base64::engine::general_purpose::STANDARD
            .decode(bundle_base64.trim())
            .map_err(|e| SatchelError::DecodingFailed(format!("bundle base64: {e}")))?;
        Self::import(&bundle, password)
    }
}

/// A locally generated keypair with its self-signed X.509 certificate
pub struct SelfSignedCertificate {
    private_key: PrivateKey,
    certificate: X509,
}

/// Parsed certificate metadata (subject, issuer, validity in epoch seconds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: i64,
    pub not_after: i64,
}

impl SelfSignedCertificate {
    /// Generate a fresh RSA-2048 keypair and self-sign a v3 certificate.
    ///
    /// `serial` is caller-supplied; `subject` is an ordered list of
    /// (attribute-type, value) pairs appended in the given order. Validity
    /// is `[now, now + 10 years]` in whole seconds. Signed with SHA-256
    /// over the to-be-signed structure using its own key.
    pub fn generate(
        crypto: &dyn CryptoProvider,
        serial: u64,
        subject: &[(&str, &str)],
    ) -> Result<Self> {
        let private_key = crypto.generate_rsa_keypair()?;

        let build = || -> std::result::Result<X509, openssl::error::ErrorStack> {
            let mut name = X509NameBuilder::new()?;
            for (attr, value) in subject {
                name.append_entry_by_text(attr, value)?;
            }
            let name = name.build();

            let serial_bn = openssl::bn::BigNum::from_dec_str(&serial.to_string())?;
            let serial_asn1 = serial_bn.to_asn1_integer()?;

            let now = chrono::Utc::now().timestamp();
            let not_before = openssl::asn1::Asn1Time::from_unix(now)?;
            let not_after = openssl::asn1::Asn1Time::from_unix(now + VALIDITY_SECS)?;

            let mut builder = X509::builder()?;
            builder.set_version(2)?; // X.509 v3
            builder.set_serial_number(&serial_asn1)?;
            builder.set_subject_name(&name)?;
            builder.set_issuer_name(&name)?;
            builder.set_not_before(&not_before)?;
            builder.set_not_after(&not_after)?;
            builder.set_pubkey(&private_key.0)?;
            builder.sign(&private_key.0, MessageDigest::sha256())?;
            Ok(builder.build())
        };

        let certificate =
            build().map_err(|e| SatchelError::CertificateBuildFailed(e.to_string()))?;

        Ok(Self {
            private_key,
            certificate,
        })
    }

    /// Rebuild from previously exported PEM material
    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> Result<Self> {
        let certificate = X509::from_pem(certificate_pem.as_bytes())
            .map_err(|e| SatchelError::DecodingFailed(format!("certificate PEM: {e}")))?;
        let private_key = PrivateKey::from_pem(private_key_pem)?;
        Ok(Self {
            private_key,
            certificate,
        })
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// PKCS#8 PEM private key
    pub fn private_key_pem(&self) -> Result<String> {
        self.private_key.to_pem()
    }

    /// SPKI PEM public key
    pub fn public_key_pem(&self) -> Result<String> {
        self.private_key.public_key_pem()
    }

    /// PEM certificate
    pub fn certificate_pem(&self) -> Result<String> {
        let bytes = self
            .certificate
            .to_pem()
            .map_err(|e| SatchelError::DecodingFailed(format!("certificate export: {e}")))?;
        String::from_utf8(bytes).map_err(|e| SatchelError::DecodingFailed(e.to_string()))
    }

    /// DER certificate
    pub fn certificate_der(&self) -> Result<Vec<u8>> {
        self.certificate
            .to_der()
            .map_err(|e| SatchelError::DecodingFailed(format!("certificate DER: {e}")))
    }

    /// Parse back subject/issuer/validity from the DER encoding
    pub fn info(&self) -> Result<CertificateInfo> {
        let der = self.certificate_der()?;
        let (_, parsed) = x509_parser::certificate::X509Certificate::from_der(&der)
            .map_err(|e| SatchelError::DecodingFailed(format!("certificate parse: {e}")))?;
        Ok(CertificateInfo {
            subject: parsed.subject().to_string(),
            issuer: parsed.issuer().to_string(),
            not_before: parsed.validity().not_before.timestamp(),
            not_after: parsed.validity().not_after.timestamp(),
        })
    }
}
