//! Inbound webhook handling: authenticity, replay protection and
//! idempotency for Close event deliveries.

mod dedupe;
pub mod signature;
mod triggers;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::state::StaticState;

pub use dedupe::{ProcessedEventLog, DEFAULT_DEDUPE_CAPACITY};
pub use signature::SignatureScheme;
pub use triggers::{event_filters, supported_actions, EventFilter, TriggerAction, TriggerObject};

pub const TIMESTAMP_HEADER: &str = "close-sig-timestamp";
pub const SIGNATURE_HEADER: &str = "close-sig-hash";
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Every variant is terminal for the delivery; none is worth retrying.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing required header `{0}`")]
    MissingHeader(&'static str),
    #[error("webhook signature does not match the payload")]
    InvalidSignature,
    #[error("invalid signature timestamp `{0}`")]
    InvalidTimestamp(String),
    #[error("webhook timestamp is {skew_secs}s away from now (tolerance {tolerance_secs}s)")]
    StaleTimestamp { skew_secs: i64, tolerance_secs: u64 },
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl WebhookError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::MissingHeader(_) | Self::InvalidSignature | Self::InvalidTimestamp(_) => {
                "authentication"
            }
            Self::StaleTimestamp { .. } => "replay",
            Self::MalformedPayload(_) => "payload",
        }
    }
}

#[derive(Clone, Debug)]
pub struct WebhookSettings {
    pub scheme: SignatureScheme,
    pub tolerance_secs: u64,
    pub idempotency: bool,
    pub dedupe_capacity: usize,
    pub enrich_metadata: bool,
    pub webhook_url: Option<String>,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            scheme: SignatureScheme::Concatenated,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            idempotency: true,
            dedupe_capacity: DEFAULT_DEDUPE_CAPACITY,
            enrich_metadata: false,
            webhook_url: None,
        }
    }
}

/// One inbound request as received by the host. Header names are matched
/// case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct InboundDelivery {
    headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl InboundDelivery {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { headers: BTreeMap::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeliveryOutcome {
    Accepted(Vec<Value>),
    Duplicate { event_id: String },
}

impl DeliveryOutcome {
    pub fn events(&self) -> &[Value] {
        match self {
            Self::Accepted(events) => events,
            Self::Duplicate { .. } => &[],
        }
    }
}

pub struct WebhookVerifier {
    signature_key: Option<SecretString>,
    settings: WebhookSettings,
    processed: ProcessedEventLog,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("signature_key", &self.signature_key.as_ref().map(|_| "<redacted>"))
            .field("settings", &self.settings)
            .field("processed", &self.processed.len())
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(signature_key: Option<SecretString>, settings: WebhookSettings) -> Self {
        let processed = ProcessedEventLog::with_capacity(settings.dedupe_capacity);
        let signature_key =
            signature_key.filter(|key| !key.expose_secret().trim().is_empty());
        Self { signature_key, settings, processed }
    }

    /// Restores the signature key and processed ids a host persisted.
    pub fn from_state(state: &StaticState, settings: WebhookSettings) -> Self {
        let mut verifier =
            Self::new(state.signature_key.clone().map(SecretString::from), settings);
        verifier.processed = ProcessedEventLog::from_ids(
            state.processed_event_ids.iter().cloned(),
            verifier.settings.dedupe_capacity,
        );
        verifier
    }

    /// Writes the processed id log back for persistence.
    pub fn store_state(&self, state: &mut StaticState) {
        state.processed_event_ids = self.processed.ids();
    }

    /// Replaces the key deliveries are checked against. A blank key turns
    /// verification off.
    pub fn set_signature_key(&mut self, signature_key: Option<SecretString>) {
        self.signature_key = signature_key.filter(|key| !key.expose_secret().trim().is_empty());
    }

    pub fn settings(&self) -> &WebhookSettings {
        &self.settings
    }

    pub fn has_signature_key(&self) -> bool {
        self.signature_key.is_some()
    }

    pub fn processed(&self) -> &ProcessedEventLog {
        &self.processed
    }

    /// Verifies and normalizes one delivery. Nothing is recorded in the
    /// idempotency log unless every check passes.
    pub fn process(
        &mut self,
        delivery: &InboundDelivery,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome, WebhookError> {
        let verified = match &self.signature_key {
            Some(key) => {
                self.authenticate(key.expose_secret(), delivery, now)?;
                true
            }
            None => false,
        };

        let payload: Value = serde_json::from_slice(&delivery.body)
            .map_err(|error| WebhookError::MalformedPayload(error.to_string()))?;
        let Value::Object(envelope) = payload else {
            return Err(WebhookError::MalformedPayload(
                "expected a JSON object body".to_string(),
            ));
        };

        let event = event_object(&envelope)?;
        let event_id = event_id(&envelope, &event);

        if self.settings.idempotency {
            match &event_id {
                Some(id) if self.processed.contains(id) => {
                    debug!(
                        event_name = "webhook.delivery.duplicate",
                        event_id = %id,
                        "dropping already processed webhook event"
                    );
                    return Ok(DeliveryOutcome::Duplicate { event_id: id.clone() });
                }
                Some(id) => {
                    self.processed.record(id.clone());
                }
                None => debug!(
                    event_name = "webhook.delivery.no_event_id",
                    "webhook event carries no id; idempotency skipped"
                ),
            }
        }

        let mut normalized = event;
        if let Some(subscription_id) = envelope.get("subscription_id").filter(|v| !v.is_null()) {
            normalized.entry("subscription_id").or_insert_with(|| subscription_id.clone());
        }
        if self.settings.enrich_metadata {
            normalized.insert(
                "_delivery".to_string(),
                json!({
                    "received_at": now.to_rfc3339(),
                    "webhook_url": self.settings.webhook_url,
                    "signature_verified": verified,
                }),
            );
        }

        let object_type = normalized.get("object_type").and_then(Value::as_str).unwrap_or("");
        let action = normalized.get("action").and_then(Value::as_str).unwrap_or("");
        debug!(
            event_name = "webhook.delivery.accepted",
            event_id = event_id.as_deref().unwrap_or(""),
            object_type,
            action,
            signature_verified = verified,
            "webhook event accepted"
        );
        Ok(DeliveryOutcome::Accepted(vec![Value::Object(normalized)]))
    }

    fn authenticate(
        &self,
        key: &str,
        delivery: &InboundDelivery,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let timestamp =
            delivery.header(TIMESTAMP_HEADER).ok_or(WebhookError::MissingHeader(TIMESTAMP_HEADER))?;
        let received =
            delivery.header(SIGNATURE_HEADER).ok_or(WebhookError::MissingHeader(SIGNATURE_HEADER))?;

        if !signature::verify(key, self.settings.scheme, timestamp, &delivery.body, received) {
            warn!(
                event_name = "webhook.delivery.rejected",
                reason = "signature_mismatch",
                scheme = self.settings.scheme.as_str(),
                "webhook signature verification failed"
            );
            return Err(WebhookError::InvalidSignature);
        }

        let sent_at = parse_unix_seconds(timestamp)
            .ok_or_else(|| WebhookError::InvalidTimestamp(timestamp.trim().to_string()))?;
        let skew_secs = now.timestamp() - sent_at;
        if skew_secs.unsigned_abs() > self.settings.tolerance_secs {
            warn!(
                event_name = "webhook.delivery.rejected",
                reason = "stale_timestamp",
                skew_secs,
                "webhook timestamp outside tolerance"
            );
            return Err(WebhookError::StaleTimestamp {
                skew_secs,
                tolerance_secs: self.settings.tolerance_secs,
            });
        }

        Ok(())
    }
}

fn parse_unix_seconds(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Some(seconds);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite())
        .map(|seconds| seconds.floor() as i64)
}

/// Close wraps the event as `{subscription_id, event: {...}}`; bare event
/// objects are accepted as-is.
fn event_object(envelope: &Map<String, Value>) -> Result<Map<String, Value>, WebhookError> {
    match envelope.get("event") {
        Some(Value::Object(event)) => Ok(event.clone()),
        Some(other) if !other.is_null() => Err(WebhookError::MalformedPayload(
            "`event` must be a JSON object".to_string(),
        )),
        _ => Ok(envelope.clone()),
    }
}

fn event_id(envelope: &Map<String, Value>, event: &Map<String, Value>) -> Option<String> {
    [event.get("id"), envelope.get("id")].into_iter().flatten().find_map(|value| match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use secrecy::SecretString;
    use serde_json::json;

    use super::{
        signature, DeliveryOutcome, InboundDelivery, SignatureScheme, WebhookError,
        WebhookSettings, WebhookVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER,
    };
    use crate::domain::state::StaticState;

    const KEY: &str = "9f8e7d6c5b4a39281706f5e4d3c2b1a0";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time")
    }

    fn body(event_id: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "subscription_id": "whsub_1",
            "event": {
                "id": event_id,
                "object_type": "lead",
                "action": "updated",
                "lead_id": "lead_1",
                "data": {"name": "Acme"},
                "previous_data": {"name": "Acme Inc"},
            }
        }))
        .expect("body")
    }

    fn signed(body: Vec<u8>, sent_at: DateTime<Utc>) -> InboundDelivery {
        let timestamp = sent_at.timestamp().to_string();
        let hash = signature::sign(KEY, SignatureScheme::Concatenated, &timestamp, &body);
        InboundDelivery::new(body)
            .with_header("Close-Sig-Timestamp", timestamp)
            .with_header(SIGNATURE_HEADER, hash)
    }

    fn verifier(settings: WebhookSettings) -> WebhookVerifier {
        WebhookVerifier::new(Some(SecretString::from(KEY.to_string())), settings)
    }

    #[test]
    fn valid_delivery_yields_the_event() {
        let mut verifier = verifier(WebhookSettings::default());
        let outcome = verifier.process(&signed(body("ev_1"), now()), now()).expect("accepted");

        let events = outcome.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["id"], "ev_1");
        assert_eq!(events[0]["subscription_id"], "whsub_1");
        assert!(events[0].get("_delivery").is_none());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let mut verifier = verifier(WebhookSettings::default());
        let mut delivery = signed(body("ev_1"), now());
        delivery.body = body("ev_2");

        assert_eq!(verifier.process(&delivery, now()), Err(WebhookError::InvalidSignature));
        assert!(verifier.processed().is_empty());
    }

    #[test]
    fn missing_headers_are_fatal() {
        let mut verifier = verifier(WebhookSettings::default());
        let delivery = InboundDelivery::new(body("ev_1")).with_header(SIGNATURE_HEADER, "00");
        assert_eq!(
            verifier.process(&delivery, now()),
            Err(WebhookError::MissingHeader(TIMESTAMP_HEADER))
        );

        let delivery = InboundDelivery::new(body("ev_1")).with_header(TIMESTAMP_HEADER, "1");
        assert_eq!(
            verifier.process(&delivery, now()),
            Err(WebhookError::MissingHeader(SIGNATURE_HEADER))
        );
    }

    #[test]
    fn replayed_event_id_produces_no_output() {
        let mut verifier = verifier(WebhookSettings::default());
        let delivery = signed(body("ev_1"), now());

        assert!(matches!(verifier.process(&delivery, now()), Ok(DeliveryOutcome::Accepted(_))));
        let replay = verifier.process(&delivery, now()).expect("duplicate is not an error");
        assert_eq!(replay, DeliveryOutcome::Duplicate { event_id: "ev_1".to_string() });
        assert!(replay.events().is_empty());
    }

    #[test]
    fn timestamp_tolerance_boundaries() {
        let mut verifier = verifier(WebhookSettings::default());

        let fresh = signed(body("ev_fresh"), now() - Duration::seconds(299));
        assert!(verifier.process(&fresh, now()).is_ok());

        let stale = signed(body("ev_stale"), now() - Duration::seconds(301));
        assert!(matches!(
            verifier.process(&stale, now()),
            Err(WebhookError::StaleTimestamp { skew_secs: 301, .. })
        ));

        let future = signed(body("ev_future"), now() + Duration::seconds(301));
        assert!(matches!(verifier.process(&future, now()), Err(WebhookError::StaleTimestamp { .. })));
    }

    #[test]
    fn dot_separated_scheme_must_match_the_sender() {
        let settings =
            WebhookSettings { scheme: SignatureScheme::DotSeparated, ..WebhookSettings::default() };
        let mut verifier = verifier(settings);

        let concatenated = signed(body("ev_1"), now());
        assert_eq!(verifier.process(&concatenated, now()), Err(WebhookError::InvalidSignature));

        let payload = body("ev_1");
        let timestamp = now().timestamp().to_string();
        let hash = signature::sign(KEY, SignatureScheme::DotSeparated, &timestamp, &payload);
        let dotted = InboundDelivery::new(payload)
            .with_header(TIMESTAMP_HEADER, timestamp)
            .with_header(SIGNATURE_HEADER, hash);
        assert!(verifier.process(&dotted, now()).is_ok());
    }

    #[test]
    fn enrichment_adds_delivery_metadata() {
        let settings = WebhookSettings {
            enrich_metadata: true,
            webhook_url: Some("https://hooks.example.test/close".to_string()),
            ..WebhookSettings::default()
        };
        let mut verifier = verifier(settings);
        let outcome = verifier.process(&signed(body("ev_1"), now()), now()).expect("accepted");

        let delivery = &outcome.events()[0]["_delivery"];
        assert_eq!(delivery["signature_verified"], true);
        assert_eq!(delivery["webhook_url"], "https://hooks.example.test/close");
        assert_eq!(delivery["received_at"], now().to_rfc3339());
    }

    #[test]
    fn without_key_deliveries_pass_unverified() {
        let settings = WebhookSettings { enrich_metadata: true, ..WebhookSettings::default() };
        let mut verifier = WebhookVerifier::new(None, settings);
        let outcome =
            verifier.process(&InboundDelivery::new(body("ev_1")), now()).expect("accepted");
        assert_eq!(outcome.events()[0]["_delivery"]["signature_verified"], false);
    }

    #[test]
    fn malformed_payloads_are_rejected_after_authentication() {
        let mut verifier = WebhookVerifier::new(None, WebhookSettings::default());
        assert!(matches!(
            verifier.process(&InboundDelivery::new(b"not json".to_vec()), now()),
            Err(WebhookError::MalformedPayload(_))
        ));
        assert!(matches!(
            verifier.process(&InboundDelivery::new(b"[1,2]".to_vec()), now()),
            Err(WebhookError::MalformedPayload(_))
        ));
    }

    #[test]
    fn processed_ids_round_trip_through_state() {
        let mut state = StaticState {
            signature_key: Some(KEY.to_string()),
            processed_event_ids: vec!["ev_old".to_string()],
            ..StaticState::default()
        };
        let mut verifier = WebhookVerifier::from_state(&state, WebhookSettings::default());
        assert!(verifier.has_signature_key());

        let replay = verifier.process(&signed(body("ev_old"), now()), now()).expect("processed");
        assert!(replay.events().is_empty());
        verifier.process(&signed(body("ev_new"), now()), now()).expect("processed");

        verifier.store_state(&mut state);
        assert_eq!(state.processed_event_ids, vec!["ev_old".to_string(), "ev_new".to_string()]);
    }

    #[test]
    fn replacing_the_key_changes_what_verifies() {
        let mut verifier = WebhookVerifier::new(None, WebhookSettings::default());
        verifier.set_signature_key(Some(SecretString::from(KEY.to_string())));
        assert!(verifier.has_signature_key());
        assert!(matches!(
            verifier.process(&InboundDelivery::new(body("ev_forged")), now()),
            Err(WebhookError::MissingHeader(TIMESTAMP_HEADER))
        ));
        assert!(verifier.process(&signed(body("ev_1"), now()), now()).is_ok());

        verifier.set_signature_key(Some(SecretString::from("  ".to_string())));
        assert!(!verifier.has_signature_key());
    }

    #[test]
    fn idempotency_can_be_disabled() {
        let settings = WebhookSettings { idempotency: false, ..WebhookSettings::default() };
        let mut verifier = verifier(settings);
        let delivery = signed(body("ev_1"), now());

        assert_eq!(verifier.process(&delivery, now()).expect("first").events().len(), 1);
        assert_eq!(verifier.process(&delivery, now()).expect("second").events().len(), 1);
    }
}
