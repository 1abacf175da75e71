//! Signed API client: envelope merge, reachability precheck, signing,
//! dispatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client as HttpClient;
use serde_json::{Map, Value};
use tracing::debug;

use satchel_core::{Result, SatchelError};
use satchel_identity::{CryptoProvider, OpenSslCrypto};
use satchel_signing::{EnvelopeStatics, SigningEnvelope, SigningScheme};

use crate::reachability::{AlwaysReachable, ReachabilityProbe};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// API client that wraps every outgoing call with the standard envelope
/// and the active signing scheme
#[derive(Clone)]
pub struct SignedApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: HttpClient,
    base_url: String,
    crypto: Arc<dyn CryptoProvider>,
    probe: Arc<dyn ReachabilityProbe>,
    scheme: Option<SigningScheme>,
    statics: EnvelopeStatics,
}

impl SignedApiClient {
    /// Create a builder for the given API base URL
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> SignedApiClientBuilder {
        SignedApiClientBuilder::new(base_url)
    }

    /// POST a signed request and return the raw response bytes.
    ///
    /// Protocol-specific JSON interpretation is the caller's job.
    pub async fn post(&self, path: &str, body: Option<&Map<String, Value>>) -> Result<Vec<u8>> {
        self.dispatch(path, body, true).await
    }

    /// POST without signing (pre-registration calls only)
    pub async fn post_unsigned(
        &self,
        path: &str,
        body: Option<&Map<String, Value>>,
    ) -> Result<Vec<u8>> {
        self.dispatch(path, body, false).await
    }

    async fn dispatch(
        &self,
        path: &str,
        body: Option<&Map<String, Value>>,
        sign: bool,
    ) -> Result<Vec<u8>> {
        // Advisory precheck, before touching signing material or the network
        if !self.inner.probe.is_satisfied() {
            return Err(SatchelError::NotReachable);
        }

        let url = format!(
            "{}/{}",
            self.inner.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let envelope = SigningEnvelope::new(self.inner.statics.clone());
        let body_bytes = envelope.merged_body(body)?;
        debug!(url = %url, signed = sign, "POST request");

        let mut request = self
            .inner
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Connection", "keep-alive")
            .header("Accept-Encoding", "gzip");

        if sign {
            // Never send unsigned when signing was requested: any signer
            // failure aborts the call here.
            let scheme = self
                .inner
                .scheme
                .as_ref()
                .ok_or_else(|| SatchelError::SigningFailed("no signing identity".into()))?
                .clone();
            let crypto = Arc::clone(&self.inner.crypto);
            let sign_body = body_bytes.clone();
            let sign_url = url.clone();

            // RSA signing is CPU-bound; keep it off the event loop
            let headers = tokio::task::spawn_blocking(move || {
                scheme.sign(crypto.as_ref(), Some(&sign_body), &sign_url, Utc::now())
            })
            .await
            .map_err(|e| SatchelError::SigningFailed(format!("signing task: {e}")))??;

            for (name, value) in headers.iter() {
                request = request.header(name, value);
            }
        }

        let response = request
            .body(body_bytes)
            .send()
            .await
            .map_err(|e| SatchelError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SatchelError::Http(format!("status {status} from {url}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SatchelError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Builder for configuring a [`SignedApiClient`]
pub struct SignedApiClientBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: String,
    crypto: Arc<dyn CryptoProvider>,
    probe: Arc<dyn ReachabilityProbe>,
    scheme: Option<SigningScheme>,
    statics: EnvelopeStatics,
}

impl SignedApiClientBuilder {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("satchel/{}", env!("CARGO_PKG_VERSION")),
            crypto: Arc::new(OpenSslCrypto),
            probe: Arc::new(AlwaysReachable),
            scheme: None,
            statics: EnvelopeStatics::default(),
        }
    }

    /// Set the request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent token
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Install the signing identity (selected once at registration)
    #[must_use]
    pub fn scheme(mut self, scheme: SigningScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// Substitute the crypto provider
    #[must_use]
    pub fn crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    /// Substitute the network-path probe
    #[must_use]
    pub fn reachability(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Override the static envelope tokens
    #[must_use]
    pub fn envelope_statics(mut self, statics: EnvelopeStatics) -> Self {
        self.statics = statics;
        self
    }

    /// Build the client
    #[must_use]
    pub fn build(self) -> SignedApiClient {
        let http = HttpClient::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .gzip(true)
            .build()
            .expect("Failed to build HTTP client");

        SignedApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url: self.base_url,
                crypto: self.crypto,
                probe: self.probe,
                scheme: self.scheme,
                statics: self.statics,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::FixedReachability;
    use satchel_core::{HEADER_CERTIFICATE_KEY, HEADER_SIGNATURE, HEADER_SIGNATURE_VALUE};
    use satchel_identity::{fingerprint, SelfSignedCertificate};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_signature_scheme() -> SigningScheme {
        let crypto = OpenSslCrypto;
        let cert = SelfSignedCertificate::generate(&crypto, 5, &[("CN", "client-test")]).unwrap();
        SigningScheme::HttpSignature {
            private_key: cert.private_key().clone(),
            key_id: fingerprint::key_id(&crypto, &cert.certificate_der().unwrap()).unwrap(),
        }
    }

    #[test]
    fn not_reachable_fails_before_any_network_io() {
        let client = SignedApiClient::builder("https://unused.example")
            .reachability(Arc::new(FixedReachability(false)))
            .scheme(http_signature_scheme())
            .build();

        let err = tokio_test::block_on(client.post("api/mobile/Grades", None)).unwrap_err();
        assert!(matches!(err, SatchelError::NotReachable));
    }

    #[tokio::test]
    async fn signed_post_attaches_signature_and_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/mobile/Grades"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"raw-response".to_vec()))
            .mount(&server)
            .await;

        let client = SignedApiClient::builder(server.uri())
            .scheme(http_signature_scheme())
            .build();

        let mut body = serde_json::Map::new();
        body.insert("PupilId".into(), serde_json::Value::from(7));
        let bytes = client.post("api/mobile/Grades", Some(&body)).await.unwrap();
        assert_eq!(bytes, b"raw-response");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];

        let signature = request.headers.get(HEADER_SIGNATURE).unwrap();
        assert!(signature.to_str().unwrap().starts_with("keyId=\""));

        let sent: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(sent["PupilId"], 7);
        assert!(sent.get("RequestId").is_some());
        assert_eq!(
            sent["TimeValue"].as_i64().unwrap() - sent["TimeKey"].as_i64().unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn legacy_post_attaches_both_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let crypto = OpenSslCrypto;
        let client = SignedApiClient::builder(server.uri())
            .scheme(SigningScheme::Legacy {
                private_key: crypto.generate_rsa_keypair().unwrap(),
                credential_token: "opaque-token".into(),
            })
            .build();

        client.post("Service/Grades", None).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let headers = &requests[0].headers;
        assert!(headers.get(HEADER_SIGNATURE_VALUE).is_some());
        assert_eq!(
            headers.get(HEADER_CERTIFICATE_KEY).unwrap(),
            "opaque-token"
        );
    }

    #[tokio::test]
    async fn signer_failure_aborts_before_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        // http-signature scheme but no api/mobile segment: must not hit the wire
        let client = SignedApiClient::builder(server.uri())
            .scheme(http_signature_scheme())
            .build();
        let err = client.post("plain/path", None).await.unwrap_err();
        assert!(matches!(err, SatchelError::NoCanonicalUrl(_)));

        // no identity at all: same guarantee
        let bare = SignedApiClient::builder(server.uri()).build();
        let err = bare.post("api/mobile/Grades", None).await.unwrap_err();
        assert!(matches!(err, SatchelError::SigningFailed(_)));

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsigned_post_skips_signature_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = SignedApiClient::builder(server.uri()).build();
        client.post_unsigned("routing/start", None).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get(HEADER_SIGNATURE).is_none());
        assert_eq!(
            requests[0].headers.get("Content-Type").unwrap(),
            "application/json"
        );
    }
}
