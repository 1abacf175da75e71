//! Per-request envelope merged into every outgoing body.
//!
//! The server rejects bodies without the standard fields: a fresh request
//! id, two epoch-derived timestamps, and the static client-version tokens.
//! Caller fields win on key collision.

use serde_json::{Map, Value};
use uuid::Uuid;

use satchel_core::Result;

/// Static client-version tokens carried in every envelope
#[derive(Debug, Clone)]
pub struct EnvelopeStatics {
    pub app_name: String,
    pub app_version: String,
}

impl Default for EnvelopeStatics {
    fn default() -> Self {
        Self {
            app_name: "satchel".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The standard fields of one request. Created fresh per request, never
/// reused.
#[derive(Debug, Clone)]
pub struct SigningEnvelope {
    request_id: String,
    time_key: i64,
    time_value: i64,
    statics: EnvelopeStatics,
}

impl SigningEnvelope {
    /// Fresh envelope: random request id, timestamps from the current epoch
    #[must_use]
    pub fn new(statics: EnvelopeStatics) -> Self {
        Self::at(statics, Uuid::new_v4().to_string(), chrono::Utc::now().timestamp())
    }

    /// Envelope pinned to a given id and epoch (tests, replays of the
    /// determinism property)
    #[must_use]
    pub fn at(statics: EnvelopeStatics, request_id: String, epoch: i64) -> Self {
        Self {
            request_id,
            time_key: epoch - 1,
            time_value: epoch,
            statics,
        }
    }

    /// Merge the caller body on top of the envelope and serialize.
    ///
    /// Envelope fields go in first; caller fields overwrite on collision.
    pub fn merged_body(&self, caller: Option<&Map<String, Value>>) -> Result<Vec<u8>> {
        let mut merged = Map::new();
        merged.insert("RequestId".into(), Value::String(self.request_id.clone()));
        merged.insert("TimeKey".into(), Value::from(self.time_key));
        merged.insert("TimeValue".into(), Value::from(self.time_value));
        merged.insert(
            "AppName".into(),
            Value::String(self.statics.app_name.clone()),
        );
        merged.insert(
            "AppVersion".into(),
            Value::String(self.statics.app_version.clone()),
        );

        if let Some(caller) = caller {
            for (key, value) in caller {
                merged.insert(key.clone(), value.clone());
            }
        }

        Ok(serde_json::to_vec(&Value::Object(merged))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Map<String, Value> {
        match serde_json::from_slice(bytes).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn envelope_carries_standard_fields() {
        let env = SigningEnvelope::at(EnvelopeStatics::default(), "req-1".into(), 1_700_000_000);
        let body = parse(&env.merged_body(None).unwrap());

        assert_eq!(body["RequestId"], "req-1");
        assert_eq!(body["TimeKey"], 1_699_999_999i64);
        assert_eq!(body["TimeValue"], 1_700_000_000i64);
        assert_eq!(body["AppName"], "satchel");
    }

    #[test]
    fn caller_fields_win_on_collision() {
        let env = SigningEnvelope::at(EnvelopeStatics::default(), "req-2".into(), 100);
        let mut caller = Map::new();
        caller.insert("TimeValue".into(), Value::from(42));
        caller.insert("Pupil".into(), Value::String("jan".into()));

        let body = parse(&env.merged_body(Some(&caller)).unwrap());
        assert_eq!(body["TimeValue"], 42);
        assert_eq!(body["TimeKey"], 99);
        assert_eq!(body["Pupil"], "jan");
    }

    #[test]
    fn fresh_envelopes_never_share_request_ids() {
        let a = SigningEnvelope::new(EnvelopeStatics::default());
        let b = SigningEnvelope::new(EnvelopeStatics::default());
        assert_ne!(a.request_id, b.request_id);
    }
}
