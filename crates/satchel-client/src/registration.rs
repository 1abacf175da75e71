//! Device registration: the handshake that establishes a signing identity.
//!
//! `Unregistered → EndpointResolving → PushTokenAcquiring →
//! CertificateRequesting → CertificateParsing → Registered`, with
//! `Failed` terminal from any state. Partially acquired state (push token,
//! half-built payload) is discarded on failure; a previously stored
//! identity is wiped only once the new one is fully parsed and usable.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use satchel_core::{
    RegistrationResponse, Result, RoutingRule, SatchelError, SigningSchemeKind,
};
use satchel_identity::{
    fingerprint, keys, CredentialStore, CryptoProvider, SelfSignedCertificate, StoredIdentity,
};
use satchel_signing::SigningScheme;

/// Marker preceding the push token in the register response body
const PUSH_TOKEN_MARKER: &str = "token=";

/// Fixed resources and device metadata for one registration attempt
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Routing table resource (newline-separated `prefix,baseURL` rows)
    pub routing_table_url: String,
    /// Device-checkin endpoint (yields an id/token pair)
    pub checkin_url: String,
    /// Push registration endpoint (yields the push token)
    pub push_register_url: String,
    /// Human-readable device name sent in the registration payload
    pub device_name: String,
    /// Device model identifier
    pub device_model: String,
}

/// Observable progress of the registration handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    EndpointResolving,
    PushTokenAcquiring,
    CertificateRequesting,
    CertificateParsing,
    Registered,
    Failed,
}

#[derive(Debug, Deserialize)]
struct CheckinResponse {
    android_id: u64,
    security_token: u64,
}

/// A non-2xx response is a transport failure, not a protocol answer:
/// error pages must never reach the parsers.
fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SatchelError::Http(format!("status {status} from {url}")))
    }
}

/// Orchestrates endpoint discovery, push-token acquisition, and the
/// registration handshake
pub struct RegistrationFlow {
    http: HttpClient,
    config: RegistrationConfig,
    crypto: Arc<dyn CryptoProvider>,
    store: Arc<dyn CredentialStore>,
    state: RegistrationState,
}

impl RegistrationFlow {
    pub fn new(
        config: RegistrationConfig,
        crypto: Arc<dyn CryptoProvider>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http,
            config,
            crypto,
            store,
            state: RegistrationState::Unregistered,
        }
    }

    #[must_use]
    pub const fn state(&self) -> RegistrationState {
        self.state
    }

    /// Run the full handshake for a login (token, symbol, pin) under the
    /// given protocol. On success the new identity is persisted (replacing
    /// any previous one) and a ready-to-use scheme is returned.
    pub async fn login(
        &mut self,
        token: &str,
        symbol: &str,
        pin: &str,
        kind: SigningSchemeKind,
    ) -> Result<SigningScheme> {
        match self.run_login(token, symbol, pin, kind).await {
            Ok(scheme) => {
                self.state = RegistrationState::Registered;
                Ok(scheme)
            }
            Err(e) => {
                // Partial state (push token, payload) is local and dropped
                // here; the stored identity is untouched.
                self.state = RegistrationState::Failed;
                warn!(error = %e, "registration failed");
                Err(e)
            }
        }
    }

    /// Logout: destroy the stored identity and every derived credential key
    pub fn logout(&mut self) -> Result<()> {
        self.state = RegistrationState::Unregistered;
        StoredIdentity::clear(self.store.as_ref())
    }

    async fn run_login(
        &mut self,
        token: &str,
        symbol: &str,
        pin: &str,
        kind: SigningSchemeKind,
    ) -> Result<SigningScheme> {
        let base_url = self.resolve_endpoint(token).await?;
        let push_token = self.acquire_push_token().await?;

        self.state = RegistrationState::CertificateRequesting;
        let mut payload = Map::new();
        payload.insert("DeviceName".into(), Value::String(self.config.device_name.clone()));
        payload.insert("DeviceModel".into(), Value::String(self.config.device_model.clone()));
        payload.insert("Token".into(), Value::String(token.to_string()));
        payload.insert("Pin".into(), Value::String(pin.to_string()));
        payload.insert("PushToken".into(), Value::String(push_token.clone()));

        // Self-signed protocol: the certificate exists before the server
        // ever sees it; registration only announces the public half.
        let local_cert = if kind == SigningSchemeKind::HttpSignature {
            let serial = Uuid::new_v4().as_u64_pair().0;
            let cert = SelfSignedCertificate::generate(
                self.crypto.as_ref(),
                serial,
                &[("CN", self.config.device_name.as_str()), ("O", "satchel")],
            )?;
            let public_pem = cert.public_key_pem()?;
            payload.insert(
                "PublicKey".into(),
                Value::String(public_pem.replace(['\n', '\r'], "")),
            );
            payload.insert(
                "PublicKeyThumbprint".into(),
                Value::String(fingerprint::key_fingerprint(self.crypto.as_ref(), &public_pem)?),
            );
            Some(cert)
        } else {
            None
        };

        let register_url = format!(
            "{}/{symbol}/mobile/register/new",
            base_url.trim_end_matches('/')
        );
        debug!(url = %register_url, "requesting certificate");
        let response = self
            .http
            .post(&register_url)
            .json(&Value::Object(payload))
            .send()
            .await
            .map_err(|e| SatchelError::Http(e.to_string()))?;
        let response = check_status(response, &register_url)?;
        let body = response
            .bytes()
            .await
            .map_err(|e| SatchelError::Http(e.to_string()))?;

        self.state = RegistrationState::CertificateParsing;
        let parsed: RegistrationResponse = serde_json::from_slice(&body)?;
        if parsed.is_error {
            return Err(SatchelError::ServerError(
                parsed.message.unwrap_or_default(),
            ));
        }

        // Build the new identity and prove it usable before the old one
        // is wiped: a transient failure must never destroy a valid session.
        let identity = match kind {
            SigningSchemeKind::Legacy => {
                let payload = parsed
                    .payload
                    .as_ref()
                    .ok_or_else(|| SatchelError::DecodingFailed("response without identity".into()))?;
                StoredIdentity::Legacy {
                    pkcs12_base64: payload.pkcs12_base64.clone().ok_or_else(|| {
                        SatchelError::DecodingFailed("response without certificate bundle".into())
                    })?,
                    credential_token: payload.credential_token.clone().ok_or_else(|| {
                        SatchelError::DecodingFailed("response without credential token".into())
                    })?,
                }
            }
            SigningSchemeKind::HttpSignature => {
                let cert = local_cert.as_ref().ok_or(SatchelError::NoIdentity)?;
                StoredIdentity::SelfSigned {
                    certificate_pem: cert.certificate_pem()?,
                    private_key_pem: cert.private_key_pem()?,
                }
            }
        };
        let scheme = SigningScheme::from_stored(self.crypto.as_ref(), &identity)?;

        identity.save(self.store.as_ref())?;
        self.persist_session(&base_url, &push_token, &parsed)?;
        debug!(scheme = ?scheme, "device registered");
        Ok(scheme)
    }

    async fn resolve_endpoint(&mut self, token: &str) -> Result<String> {
        self.state = RegistrationState::EndpointResolving;
        debug!(url = %self.config.routing_table_url, "fetching routing table");
        let response = self
            .http
            .get(&self.config.routing_table_url)
            .send()
            .await
            .map_err(|e| SatchelError::Http(e.to_string()))?;
        let table = check_status(response, &self.config.routing_table_url)?
            .text()
            .await
            .map_err(|e| SatchelError::Http(e.to_string()))?;

        let rules = RoutingRule::parse_table(&table);
        RoutingRule::resolve(&rules, token)
            .map(ToString::to_string)
            .ok_or(SatchelError::NoEndpointUrl)
    }

    async fn acquire_push_token(&mut self) -> Result<String> {
        self.state = RegistrationState::PushTokenAcquiring;

        let response = self
            .http
            .post(&self.config.checkin_url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| SatchelError::Http(e.to_string()))?;
        let checkin: CheckinResponse = check_status(response, &self.config.checkin_url)?
            .json()
            .await
            .map_err(|e| SatchelError::DecodingFailed(format!("checkin response: {e}")))?;

        let response = self
            .http
            .post(&self.config.push_register_url)
            .form(&[
                ("device", checkin.android_id.to_string()),
                ("security_token", checkin.security_token.to_string()),
                ("app", "satchel".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SatchelError::Http(e.to_string()))?;
        let body = check_status(response, &self.config.push_register_url)?
            .text()
            .await
            .map_err(|e| SatchelError::Http(e.to_string()))?;

        // Everything after the marker, to end of body, is the token
        let start = body.find(PUSH_TOKEN_MARKER).ok_or(SatchelError::NoPushToken)?;
        let token = body[start + PUSH_TOKEN_MARKER.len()..].trim_end();
        if token.is_empty() {
            return Err(SatchelError::NoPushToken);
        }
        debug!("acquired push token");
        Ok(token.to_string())
    }

    fn persist_session(
        &self,
        base_url: &str,
        push_token: &str,
        parsed: &RegistrationResponse,
    ) -> Result<()> {
        let store = self.store.as_ref();
        store.set(keys::BASE_URL, base_url)?;
        store.set(keys::PUSH_TOKEN, push_token)?;
        if let Some(payload) = &parsed.payload {
            if let Some(issued_at) = payload.issued_at {
                store.set(keys::CERTIFICATE_ISSUED_AT, &issued_at.to_string())?;
            }
            if let Some(name) = &payload.display_name {
                store.set(keys::ACCOUNT_NAME, name)?;
            }
        }
        Ok(())
    }
}
