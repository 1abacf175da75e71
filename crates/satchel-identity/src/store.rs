//! Secure key-value persistence for the device's identity material.
//!
//! The `CredentialStore` trait is the capability seam over whatever the
//! target platform offers (keychain, encrypted file, secret manager). One
//! namespace per device; registration and logout are the only writers,
//! in-flight signed requests only read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use satchel_core::{Result, SatchelError};

/// Well-known store keys (string → string, one namespace per device)
pub mod keys {
    /// Base64 PKCS#12 bundle (legacy protocol)
    pub const CERTIFICATE_BUNDLE: &str = "CertificatePfx";
    /// PEM certificate (self-signed protocol)
    pub const CERTIFICATE_PEM: &str = "CertificatePem";
    /// PKCS#8 PEM private key (self-signed protocol)
    pub const PRIVATE_KEY_PEM: &str = "CertificateKeyPem";
    /// Opaque server-assigned credential token
    pub const CREDENTIAL_TOKEN: &str = "CertificateKey";
    /// Certificate-issued timestamp, epoch seconds
    pub const CERTIFICATE_ISSUED_AT: &str = "CertificateCreated";
    /// Account display name
    pub const ACCOUNT_NAME: &str = "UserLogin";
    /// Push notification token
    pub const PUSH_TOKEN: &str = "PushToken";
    /// Resolved API base URL
    pub const BASE_URL: &str = "EndpointUrl";
}

/// Capability interface over platform secure storage
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// Destroy every key in the device's namespace
    fn remove_all(&self) -> Result<()>;
}

/// In-memory store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self
            .inner
            .read()
            .map_err(|_| SatchelError::Store("store lock poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| SatchelError::Store("store lock poisoned".into()))?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| SatchelError::Store("store lock poisoned".into()))?;
        map.remove(key);
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| SatchelError::Store("store lock poisoned".into()))?;
        map.clear();
        Ok(())
    }
}

/// File-backed store: one JSON object per device namespace.
///
/// Writes are atomic (temp file + rename) so a crash mid-write never
/// leaves a truncated credential file behind.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    inner: RwLock<HashMap<String, String>>,
}

impl FileCredentialStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| SatchelError::Store(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| SatchelError::Store(format!("parse {}: {e}", path.display())))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            inner: RwLock::new(map),
        })
    }

    fn flush(&self, map: &HashMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, raw)
            .map_err(|e| SatchelError::Store(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| SatchelError::Store(format!("rename {}: {e}", self.path.display())))
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self
            .inner
            .read()
            .map_err(|_| SatchelError::Store("store lock poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| SatchelError::Store("store lock poisoned".into()))?;
        map.insert(key.to_string(), value.to_string());
        self.flush(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| SatchelError::Store("store lock poisoned".into()))?;
        map.remove(key);
        self.flush(&map)
    }

    fn remove_all(&self) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| SatchelError::Store("store lock poisoned".into()))?;
        map.clear();
        self.flush(&map)
    }
}

/// The identity material persisted at the `Registered` transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredIdentity {
    /// Server-issued PKCS#12 bundle plus its opaque credential token
    Legacy {
        pkcs12_base64: String,
        credential_token: String,
    },
    /// Locally generated self-signed certificate
    SelfSigned {
        certificate_pem: String,
        private_key_pem: String,
    },
}

impl StoredIdentity {
    /// Persist this identity, wiping any previously stored one first.
    ///
    /// The clear and the store happen under one call so no stale credential
    /// can coexist with the new one. Callers must invoke this only once the
    /// new identity is fully parsed and usable.
    pub fn save(&self, store: &dyn CredentialStore) -> Result<()> {
        store.remove_all()?;
        match self {
            Self::Legacy {
                pkcs12_base64,
                credential_token,
            } => {
                store.set(keys::CERTIFICATE_BUNDLE, pkcs12_base64)?;
                store.set(keys::CREDENTIAL_TOKEN, credential_token)?;
            }
            Self::SelfSigned {
                certificate_pem,
                private_key_pem,
            } => {
                store.set(keys::CERTIFICATE_PEM, certificate_pem)?;
                store.set(keys::PRIVATE_KEY_PEM, private_key_pem)?;
            }
        }
        Ok(())
    }

    /// Load the stored identity, if any.
    ///
    /// A half-present identity (certificate without key, bundle without
    /// token) is `DecodingFailed` rather than `None`: the store is corrupt
    /// and the caller must re-register.
    pub fn load(store: &dyn CredentialStore) -> Result<Option<Self>> {
        if let Some(pkcs12_base64) = store.get(keys::CERTIFICATE_BUNDLE)? {
            let credential_token = store
                .get(keys::CREDENTIAL_TOKEN)?
                .ok_or_else(|| SatchelError::DecodingFailed("bundle without token".into()))?;
            return Ok(Some(Self::Legacy {
                pkcs12_base64,
                credential_token,
            }));
        }
        if let Some(certificate_pem) = store.get(keys::CERTIFICATE_PEM)? {
            let private_key_pem = store
                .get(keys::PRIVATE_KEY_PEM)?
                .ok_or_else(|| SatchelError::DecodingFailed("certificate without key".into()))?;
            return Ok(Some(Self::SelfSigned {
                certificate_pem,
                private_key_pem,
            }));
        }
        Ok(None)
    }

    /// Logout: destroy the identity and every derived credential key
    pub fn clear(store: &dyn CredentialStore) -> Result<()> {
        store.remove_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        store.set(keys::PUSH_TOKEN, "tok").unwrap();
        assert_eq!(store.get(keys::PUSH_TOKEN).unwrap().as_deref(), Some("tok"));
        store.remove(keys::PUSH_TOKEN).unwrap();
        assert_eq!(store.get(keys::PUSH_TOKEN).unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        {
            let store = FileCredentialStore::open(&path).unwrap();
            store.set(keys::BASE_URL, "https://ep1.example/").unwrap();
        }
        let store = FileCredentialStore::open(&path).unwrap();
        assert_eq!(
            store.get(keys::BASE_URL).unwrap().as_deref(),
            Some("https://ep1.example/")
        );
    }

    #[test]
    fn save_replaces_previous_identity() {
        let store = MemoryCredentialStore::new();
        store.set(keys::ACCOUNT_NAME, "old account").unwrap();
        StoredIdentity::Legacy {
            pkcs12_base64: "old".into(),
            credential_token: "old-token".into(),
        }
        .save(&store)
        .unwrap();

        StoredIdentity::SelfSigned {
            certificate_pem: "CERT".into(),
            private_key_pem: "KEY".into(),
        }
        .save(&store)
        .unwrap();

        // exactly one identity remains, the old one is gone entirely
        assert_eq!(store.get(keys::CERTIFICATE_BUNDLE).unwrap(), None);
        assert_eq!(store.get(keys::CREDENTIAL_TOKEN).unwrap(), None);
        assert_eq!(store.get(keys::ACCOUNT_NAME).unwrap(), None);
        assert!(matches!(
            StoredIdentity::load(&store).unwrap(),
            Some(StoredIdentity::SelfSigned { .. })
        ));
    }

    #[test]
    fn half_present_identity_is_corrupt() {
        let store = MemoryCredentialStore::new();
        store.set(keys::CERTIFICATE_PEM, "CERT").unwrap();
        let err = StoredIdentity::load(&store).unwrap_err();
        assert!(matches!(err, SatchelError::DecodingFailed(_)));
    }

    #[test]
    fn empty_store_loads_none() {
        let store = MemoryCredentialStore::new();
        assert_eq!(StoredIdentity::load(&store).unwrap(), None);
    }
}
