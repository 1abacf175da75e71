//! Shared protocol types for the identity and signing subsystem.

use serde::{Deserialize, Serialize};

/// Header carrying the base64 signature in the legacy (PKCS#12) protocol
pub const HEADER_SIGNATURE_VALUE: &str = "RequestSignatureValue";

/// Header carrying the opaque server-assigned credential token (legacy protocol)
pub const HEADER_CERTIFICATE_KEY: &str = "RequestCertificateKey";

/// Header carrying the `keyId=...` signature string in the newer protocol
pub const HEADER_SIGNATURE: &str = "Signature";

/// Which signing protocol the device registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningSchemeKind {
    /// Server-issued PKCS#12 identity, SHA-1 body signature
    Legacy,
    /// Locally generated self-signed certificate, HTTP-signature style headers
    HttpSignature,
}

/// Ordered header name/value pairs produced by a signer.
///
/// Immutable once built; order is preserved so tests can assert the exact
/// wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignedHeaders {
    pairs: Vec<(String, String)>,
}

impl SignedHeaders {
    #[must_use]
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Look up a header value by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over the pairs in assembly order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// One row of the endpoint routing table: `<token-prefix>,<baseURL>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    /// Login-token prefix this rule matches
    pub prefix: String,
    /// API base URL for matching tokens
    pub base_url: String,
}

impl RoutingRule {
    /// Parse a routing table (UTF-8 text, one `prefix,baseURL` record per line).
    ///
    /// Blank lines and lines without a comma are skipped.
    #[must_use]
    pub fn parse_table(text: &str) -> Vec<Self> {
        text.lines()
            .filter_map(|line| {
                let (prefix, base_url) = line.trim().split_once(',')?;
                if prefix.is_empty() || base_url.is_empty() {
                    return None;
                }
                Some(Self {
                    prefix: prefix.to_string(),
                    base_url: base_url.to_string(),
                })
            })
            .collect()
    }

    /// Select the base URL for a login token by prefix match
    #[must_use]
    pub fn resolve<'a>(rules: &'a [Self], token: &str) -> Option<&'a str> {
        rules
            .iter()
            .find(|r| token.starts_with(&r.prefix))
            .map(|r| r.base_url.as_str())
    }
}

/// Registration response envelope returned by the portal server
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationResponse {
    /// Application-level error flag (distinct from transport failure)
    #[serde(rename = "IsError")]
    pub is_error: bool,

    /// Error message, present when `IsError` is true
    #[serde(rename = "Message", default)]
    pub message: Option<String>,

    /// Issued certificate/identity data on success
    #[serde(rename = "TokenCert", default)]
    pub payload: Option<RegistrationPayload>,
}

/// Identity material issued (or confirmed) by the server at registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationPayload {
    /// Base64 PKCS#12 bundle (legacy protocol) — absent on the self-signed path
    #[serde(rename = "CertyfikatPfx", default)]
    pub pkcs12_base64: Option<String>,

    /// Server-assigned opaque credential token (legacy protocol)
    #[serde(rename = "CertyfikatKlucz", default)]
    pub credential_token: Option<String>,

    /// Certificate-issued timestamp, epoch seconds
    #[serde(rename = "CertyfikatDataUtworzenia", default)]
    pub issued_at: Option<i64>,

    /// Account display name shown in the portal
    #[serde(rename = "UzytkownikNazwa", default)]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_table_parses_and_resolves() {
        let rules = RoutingRule::parse_table("ABC,https://ep1.example/\nXYZ,https://ep2.example/\n\nbroken-line\n");
        assert_eq!(rules.len(), 2);
        assert_eq!(
            RoutingRule::resolve(&rules, "ABC1234"),
            Some("https://ep1.example/")
        );
        assert_eq!(RoutingRule::resolve(&rules, "ZZZ9999"), None);
    }

    #[test]
    fn signed_headers_preserve_order() {
        let headers = SignedHeaders::new(vec![
            ("RequestSignatureValue".into(), "abc".into()),
            ("RequestCertificateKey".into(), "key".into()),
        ]);
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["RequestSignatureValue", "RequestCertificateKey"]);
        assert_eq!(headers.get("RequestCertificateKey"), Some("key"));
        assert_eq!(headers.get("Missing"), None);
    }

    #[test]
    fn registration_response_decodes_error_shape() {
        let resp: RegistrationResponse =
            serde_json::from_str(r#"{"IsError": true, "Message": "bad pin"}"#).unwrap();
        assert!(resp.is_error);
        assert_eq!(resp.message.as_deref(), Some("bad pin"));
        assert!(resp.payload.is_none());
    }
}
