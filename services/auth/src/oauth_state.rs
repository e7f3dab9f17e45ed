//! Signed OAuth `state` envelope
//!
//! The state parameter carries the whole flow context through the identity
//! provider, so no server-side session is needed between the login redirect
//! and the callback. Wire format:
//!
//! ```text
//! base64url(json payload) "." base64url(HMAC-SHA256(secret, payload segment))
//! ```
//!
//! The payload is readable by anyone holding the state; it is signed, not
//! encrypted.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateError {
    #[error("state is not valid base64url: {0}")]
    Encoding(String),

    #[error("state payload is malformed: {0}")]
    Malformed(String),

    #[error("state payload is missing `{0}`")]
    MissingField(&'static str),

    #[error("state signature does not match")]
    BadSignature,

    #[error("state expired")]
    Expired,
}

/// Which login flow a state belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    Primary,
    Partner,
}

/// Context remembered for a partner login between redirect and callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerContext {
    pub org_id: i64,
    pub org_prefix: String,
    pub origin_domain: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowContext {
    Primary,
    Partner(PartnerContext),
}

impl FlowContext {
    pub fn flow(&self) -> Flow {
        match self {
            FlowContext::Primary => Flow::Primary,
            FlowContext::Partner(_) => Flow::Partner,
        }
    }
}

/// A decoded, verified and unexpired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthState {
    pub context: FlowContext,
    pub issued_at: DateTime<Utc>,
    /// Single-use marker, consumed at the callback
    pub nonce: String,
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatePayload {
    flow: Flow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    org_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    org_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    callback_url: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<String, String>,
}

impl StatePayload {
    fn into_state(self) -> Result<OAuthState, StateError> {
        let timestamp = self.timestamp.ok_or(StateError::MissingField("timestamp"))?;
        let issued_at = DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| StateError::Malformed("timestamp out of range".to_string()))?;
        let nonce = self
            .nonce
            .filter(|nonce| !nonce.is_empty())
            .ok_or(StateError::MissingField("nonce"))?;

        let context = match self.flow {
            Flow::Primary => FlowContext::Primary,
            Flow::Partner => FlowContext::Partner(PartnerContext {
                org_id: self.org_id.ok_or(StateError::MissingField("org_id"))?,
                org_prefix: self
                    .org_prefix
                    .ok_or(StateError::MissingField("org_prefix"))?,
                origin_domain: self
                    .origin_domain
                    .filter(|domain| !domain.is_empty())
                    .ok_or(StateError::MissingField("origin_domain"))?,
                callback_url: self
                    .callback_url
                    .ok_or(StateError::MissingField("callback_url"))?,
            }),
        };

        Ok(OAuthState {
            context,
            issued_at,
            nonce,
            extra: self.extra,
        })
    }
}

/// Encodes and verifies state envelopes with a server-wide secret
#[derive(Clone)]
pub struct StateCodec {
    secret: Vec<u8>,
    ttl: Duration,
}

impl StateCodec {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// How long a state stays acceptable after issuance
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh state for `context`
    pub fn encode(
        &self,
        context: &FlowContext,
        extra: BTreeMap<String, String>,
    ) -> Result<String, StateError> {
        self.encode_at(context, extra, Utc::now())
    }

    pub fn encode_at(
        &self,
        context: &FlowContext,
        extra: BTreeMap<String, String>,
        issued_at: DateTime<Utc>,
    ) -> Result<String, StateError> {
        let mut payload = StatePayload {
            flow: context.flow(),
            org_id: None,
            org_prefix: None,
            origin_domain: None,
            callback_url: None,
            timestamp: Some(issued_at.timestamp()),
            nonce: Some(URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>())),
            extra,
        };
        if let FlowContext::Partner(partner) = context {
            payload.org_id = Some(partner.org_id);
            payload.org_prefix = Some(partner.org_prefix.clone());
            payload.origin_domain = Some(partner.origin_domain.clone());
            payload.callback_url = Some(partner.callback_url.clone());
        }

        let json = serde_json::to_vec(&payload).map_err(|e| StateError::Malformed(e.to_string()))?;
        self.seal(&json)
    }

    /// Verify and decode a state received at the callback
    pub fn decode(&self, state: &str, now: DateTime<Utc>) -> Result<OAuthState, StateError> {
        let (payload_segment, signature_segment) = state
            .trim()
            .split_once('.')
            .ok_or_else(|| StateError::Malformed("missing signature segment".to_string()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_segment)
            .map_err(|e| StateError::Encoding(e.to_string()))?;
        self.mac(payload_segment.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| StateError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload_segment)
            .map_err(|e| StateError::Encoding(e.to_string()))?;
        let payload: StatePayload =
            serde_json::from_slice(&json).map_err(|e| StateError::Malformed(e.to_string()))?;
        let state = payload.into_state()?;

        // whole seconds on both sides; the payload carries no sub-second part
        if now.timestamp() - state.issued_at.timestamp() > self.ttl.num_seconds() {
            return Err(StateError::Expired);
        }

        Ok(state)
    }

    fn seal(&self, json: &[u8]) -> Result<String, StateError> {
        let payload_segment = URL_SAFE_NO_PAD.encode(json);
        let signature = self.mac(payload_segment.as_bytes())?.finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            payload_segment,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    fn mac(&self, message: &[u8]) -> Result<HmacSha256, StateError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .map_err(|e| StateError::Encoding(e.to_string()))?;
        mac.update(message);
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn codec() -> StateCodec {
        StateCodec::new(SECRET, 600)
    }

    fn acme() -> FlowContext {
        FlowContext::Partner(PartnerContext {
            org_id: 7,
            org_prefix: "acme".to_string(),
            origin_domain: "shop.acme.com".to_string(),
            callback_url: "https://acme.com/done".to_string(),
        })
    }

    #[test]
    fn partner_state_round_trips() {
        let mut extra = BTreeMap::new();
        extra.insert("return_to".to_string(), "/cart".to_string());

        let now = Utc::now();
        let token = codec().encode_at(&acme(), extra.clone(), now).unwrap();
        let state = codec().decode(&token, now + Duration::seconds(30)).unwrap();

        assert_eq!(state.context, acme());
        assert_eq!(state.extra, extra);
        assert_eq!(state.issued_at.timestamp(), now.timestamp());
        assert!(!state.nonce.is_empty());
    }

    #[test]
    fn each_state_gets_its_own_nonce() {
        let a = codec().encode(&FlowContext::Primary, BTreeMap::new()).unwrap();
        let b = codec().encode(&FlowContext::Primary, BTreeMap::new()).unwrap();
        let now = Utc::now();
        assert_ne!(
            codec().decode(&a, now).unwrap().nonce,
            codec().decode(&b, now).unwrap().nonce
        );
    }

    #[test]
    fn states_expire_after_ten_minutes() {
        let issued = Utc::now();
        let token = codec().encode_at(&acme(), BTreeMap::new(), issued).unwrap();

        assert!(codec().decode(&token, issued + Duration::seconds(600)).is_ok());
        assert_eq!(
            codec().decode(&token, issued + Duration::seconds(601)),
            Err(StateError::Expired)
        );
    }

    #[test]
    fn sub_second_issue_time_keeps_the_full_window() {
        let issued = DateTime::from_timestamp(1_700_000_000, 900_000_000).unwrap();
        let token = codec().encode_at(&acme(), BTreeMap::new(), issued).unwrap();

        assert!(codec().decode(&token, issued + Duration::milliseconds(599_500)).is_ok());
        assert!(codec().decode(&token, issued + Duration::milliseconds(600_050)).is_ok());
        assert_eq!(
            codec().decode(&token, issued + Duration::seconds(601)),
            Err(StateError::Expired)
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = codec().encode(&acme(), BTreeMap::new()).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged = serde_json::json!({
            "flow": "partner",
            "org_id": 8,
            "org_prefix": "other",
            "origin_domain": "evil.com",
            "callback_url": "https://evil.com/steal",
            "timestamp": Utc::now().timestamp(),
            "nonce": "n",
        });
        let forged_segment = URL_SAFE_NO_PAD.encode(forged.to_string());
        let forged_token = format!("{}.{}", forged_segment, signature);

        assert_eq!(
            codec().decode(&forged_token, Utc::now()),
            Err(StateError::BadSignature)
        );
    }

    #[test]
    fn other_secrets_do_not_verify() {
        let token = codec().encode(&acme(), BTreeMap::new()).unwrap();
        let other = StateCodec::new("ffffffffffffffffffffffffffffffff", 600);
        assert_eq!(
            other.decode(&token, Utc::now()),
            Err(StateError::BadSignature)
        );
    }

    #[test]
    fn missing_fields_are_rejected_even_when_signed() {
        let payload = serde_json::json!({
            "flow": "partner",
            "org_id": 7,
            "org_prefix": "acme",
            "callback_url": "https://acme.com/done",
            "timestamp": Utc::now().timestamp(),
            "nonce": "abc",
        });
        let token = codec().seal(payload.to_string().as_bytes()).unwrap();
        assert_eq!(
            codec().decode(&token, Utc::now()),
            Err(StateError::MissingField("origin_domain"))
        );

        let payload = serde_json::json!({ "flow": "primary", "nonce": "abc" });
        let token = codec().seal(payload.to_string().as_bytes()).unwrap();
        assert_eq!(
            codec().decode(&token, Utc::now()),
            Err(StateError::MissingField("timestamp"))
        );
    }

    #[test]
    fn garbage_is_rejected() {
        let now = Utc::now();
        assert!(matches!(
            codec().decode("no-dot-here", now),
            Err(StateError::Malformed(_))
        ));
        assert!(matches!(
            codec().decode("abc.!!!", now),
            Err(StateError::Encoding(_))
        ));
        assert!(codec().decode("", now).is_err());

        let token = codec().seal(b"not json").unwrap();
        assert!(matches!(
            codec().decode(&token, now),
            Err(StateError::Malformed(_))
        ));
    }
}
