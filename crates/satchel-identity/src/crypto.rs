//! Platform crypto primitives behind the [`CryptoProvider`] capability trait.
//!
//! The production implementation is OpenSSL-backed. The trait exists so the
//! signing and registration layers never touch a crypto library directly,
//! and so tests can substitute a failing provider.

use openssl::hash::{hash, MessageDigest};
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{Signer, Verifier};

use satchel_core::{Result, SatchelError};

/// RSA modulus size mandated by the portal protocol
pub const RSA_BITS: u32 = 2048;

/// Digest algorithms used across the two signing protocols.
///
/// SHA-1 and MD5 are legacy protocol requirements, not security choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Md5,
}

impl DigestAlgorithm {
    fn message_digest(self) -> MessageDigest {
        match self {
            Self::Sha1 => MessageDigest::sha1(),
            Self::Sha256 => MessageDigest::sha256(),
            Self::Md5 => MessageDigest::md5(),
        }
    }
}

/// Opaque handle to an RSA private key.
///
/// The key material never appears in `Debug` output and is never serialized
/// except through the explicit PEM export methods.
#[derive(Clone)]
pub struct PrivateKey(pub(crate) PKey<Private>);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(redacted)")
    }
}

impl PrivateKey {
    /// Parse a PKCS#8 PEM private key
    pub fn from_pem(pem: &str) -> Result<Self> {
        PKey::private_key_from_pem(pem.as_bytes())
            .map(Self)
            .map_err(|e| SatchelError::DecodingFailed(format!("private key PEM: {e}")))
    }

    /// Export as PKCS#8 PEM
    pub fn to_pem(&self) -> Result<String> {
        let bytes = self
            .0
            .private_key_to_pem_pkcs8()
            .map_err(|e| SatchelError::DecodingFailed(format!("private key export: {e}")))?;
        String::from_utf8(bytes).map_err(|e| SatchelError::DecodingFailed(e.to_string()))
    }

    /// Export the public half as SPKI PEM
    pub fn public_key_pem(&self) -> Result<String> {
        let bytes = self
            .0
            .public_key_to_pem()
            .map_err(|e| SatchelError::DecodingFailed(format!("public key export: {e}")))?;
        String::from_utf8(bytes).map_err(|e| SatchelError::DecodingFailed(e.to_string()))
    }
}

/// Handle to an RSA public key, used only for signature verification
#[derive(Clone)]
pub struct PublicKey(pub(crate) PKey<Public>);

impl PublicKey {
    /// Parse an SPKI PEM public key
    pub fn from_pem(pem: &str) -> Result<Self> {
        PKey::public_key_from_pem(pem.as_bytes())
            .map(Self)
            .map_err(|e| SatchelError::DecodingFailed(format!("public key PEM: {e}")))
    }
}

/// Capability interface over the platform's crypto primitives
pub trait CryptoProvider: Send + Sync {
    /// Generate a fresh RSA-2048 keypair (public exponent 65537)
    fn generate_rsa_keypair(&self) -> Result<PrivateKey>;

    /// One-shot digest
    fn digest(&self, alg: DigestAlgorithm, data: &[u8]) -> Result<Vec<u8>>;

    /// RSA signature with PKCS#1 v1.5 padding over `alg(data)`
    fn sign(&self, key: &PrivateKey, alg: DigestAlgorithm, data: &[u8]) -> Result<Vec<u8>>;

    /// Verify a PKCS#1 v1.5 signature produced by [`CryptoProvider::sign`]
    fn verify(
        &self,
        key: &PublicKey,
        alg: DigestAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool>;
}

/// OpenSSL-backed [`CryptoProvider`]
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSslCrypto;

impl CryptoProvider for OpenSslCrypto {
    fn generate_rsa_keypair(&self) -> Result<PrivateKey> {
        // Rsa::generate uses e = 65537
        let rsa = Rsa::generate(RSA_BITS)
            .map_err(|e| SatchelError::KeyGenerationFailed(e.to_string()))?;
        PKey::from_rsa(rsa)
            .map(PrivateKey)
            .map_err(|e| SatchelError::KeyGenerationFailed(e.to_string()))
    }

    fn digest(&self, alg: DigestAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        hash(alg.message_digest(), data)
            .map(|d| d.to_vec())
            .map_err(|e| SatchelError::SigningFailed(format!("digest: {e}")))
    }

    fn sign(&self, key: &PrivateKey, alg: DigestAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        let mut signer = Signer::new(alg.message_digest(), &key.0)
            .map_err(|e| SatchelError::SigningFailed(e.to_string()))?;
        signer
            .set_rsa_padding(Padding::PKCS1)
            .map_err(|e| SatchelError::SigningFailed(e.to_string()))?;
        signer
            .update(data)
            .map_err(|e| SatchelError::SigningFailed(e.to_string()))?;
        signer
            .sign_to_vec()
            .map_err(|e| SatchelError::SigningFailed(e.to_string()))
    }

    fn verify(
        &self,
        key: &PublicKey,
        alg: DigestAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        let mut verifier = Verifier::new(alg.message_digest(), &key.0)
            .map_err(|e| SatchelError::SigningFailed(e.to_string()))?;
        verifier
            .set_rsa_padding(Padding::PKCS1)
            .map_err(|e| SatchelError::SigningFailed(e.to_string()))?;
        verifier
            .update(data)
            .map_err(|e| SatchelError::SigningFailed(e.to_string()))?;
        verifier
            .verify(signature)
            .map_err(|e| SatchelError::SigningFailed(e.to_string()))
    }
}
