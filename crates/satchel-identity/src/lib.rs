//! Device identity lifecycle for the satchel portal client.
//!
//! Covers everything between "no identity" and "signing-ready":
//!
//! - **Crypto**: RSA keygen, digesting, PKCS#1 v1.5 signing behind
//!   [`CryptoProvider`]
//! - **Acquisition**: [`Pkcs12Importer`] (legacy server-issued bundles) and
//!   [`SelfSignedCertificate`] (locally generated identities)
//! - **Fingerprints**: the protocol's SHA-1 thumbprints and MD5 key
//!   fingerprints
//! - **Storage**: the [`CredentialStore`] seam plus memory/file backends

mod certificate;
mod crypto;
pub mod fingerprint;
mod store;

pub use certificate::{
    CertificateInfo, ImportedIdentity, Pkcs12Importer, SelfSignedCertificate, BUNDLE_PASSWORD,
    VALIDITY_SECS,
};
pub use crypto::{CryptoProvider, DigestAlgorithm, OpenSslCrypto, PrivateKey, PublicKey, RSA_BITS};
pub use store::{
    keys, CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredIdentity,
};
