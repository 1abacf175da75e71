use thiserror::Error;

/// Result type alias for satchel operations
pub type Result<T> = std::result::Result<T, SatchelError>;

/// Errors that can occur across the identity and signing subsystem
#[derive(Error, Debug)]
pub enum SatchelError {
    /// Network path monitor reported "not satisfied" before the request started
    #[error("network not reachable")]
    NotReachable,

    /// No routing-table row matched the login token's prefix
    #[error("no endpoint URL for token prefix")]
    NoEndpointUrl,

    /// Checkin exchange completed but the response carried no `token=` marker
    #[error("no push token in checkin response")]
    NoPushToken,

    /// PKCS#12 bundle could not be parsed (wrong password or corrupt data)
    #[error("certificate import failed: {0}")]
    ImportFailed(String),

    /// Bundle parsed but contained no identity entry
    #[error("bundle contains no identity")]
    NoIdentity,

    /// Identity present but the private key could not be extracted
    #[error("no private key in identity")]
    NoPrivateKey,

    /// RSA key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Self-signed certificate construction failed
    #[error("certificate build failed: {0}")]
    CertificateBuildFailed(String),

    /// Request URL contains no `api/mobile/` segment to canonicalize
    #[error("no canonical URL in request: {0}")]
    NoCanonicalUrl(String),

    /// Digest or RSA signing operation failed
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Server returned an application-level error (distinct from transport failure)
    #[error("server error: {0}")]
    ServerError(String),

    /// Stored or received identity material could not be decoded
    #[error("decoding failed: {0}")]
    DecodingFailed(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Credential store read/write failed
    #[error("credential store error: {0}")]
    Store(String),
}

impl SatchelError {
    /// Returns true if the error is a transport failure the caller may retry.
    ///
    /// Cryptographic and protocol errors are never retryable: they mean the
    /// stored identity is unusable and the device must re-register.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReachable | Self::Http(_))
    }

    /// Returns true if the stored identity is unusable and the device
    /// must go through the registration flow again.
    #[must_use]
    pub const fn requires_reregistration(&self) -> bool {
        matches!(
            self,
            Self::ImportFailed(_)
                | Self::NoIdentity
                | Self::NoPrivateKey
                | Self::SigningFailed(_)
                | Self::DecodingFailed(_)
        )
    }
}
