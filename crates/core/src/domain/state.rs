use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subscription returned by the CRM when a webhook is registered.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: String,
    pub signature_key: String,
    #[serde(default)]
    pub events: Vec<Value>,
}

impl std::fmt::Debug for WebhookSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSubscription")
            .field("id", &self.id)
            .field("signature_key", &"<redacted>")
            .field("events", &self.events)
            .finish()
    }
}

/// Per-workflow state owned and persisted by the host.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticState {
    #[serde(default)]
    pub webhook_id: Option<String>,
    #[serde(default)]
    pub signature_key: Option<String>,
    #[serde(default)]
    pub processed_event_ids: Vec<String>,
    #[serde(default)]
    pub last_polled_timestamp: Option<DateTime<Utc>>,
    /// Ids already emitted whose creation time equals the poll cursor.
    #[serde(default)]
    pub polled_ids_at_cursor: Vec<String>,
}

impl StaticState {
    pub fn is_subscribed(&self) -> bool {
        self.webhook_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }

    pub fn record_subscription(&mut self, subscription: &WebhookSubscription) {
        self.webhook_id = Some(subscription.id.clone());
        self.signature_key = Some(subscription.signature_key.clone());
    }

    pub fn clear_subscription(&mut self) {
        self.webhook_id = None;
        self.signature_key = None;
    }
}

impl std::fmt::Debug for StaticState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticState")
            .field("webhook_id", &self.webhook_id)
            .field("signature_key", &self.signature_key.as_ref().map(|_| "<redacted>"))
            .field("processed_event_ids", &self.processed_event_ids.len())
            .field("last_polled_timestamp", &self.last_polled_timestamp)
            .field("polled_ids_at_cursor", &self.polled_ids_at_cursor.len())
            .finish()
    }
}
