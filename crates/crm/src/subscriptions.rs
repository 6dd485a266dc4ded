use std::sync::Arc;

use closelink_core::domain::call::HttpCallSpec;
use closelink_core::domain::state::{StaticState, WebhookSubscription};
use closelink_core::errors::{CrmError, ErrorKind};
use closelink_core::webhook::{event_filters, TriggerAction, TriggerObject};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::transport::CrmTransport;

/// Registers and removes the CRM-side webhook for one workflow. The
/// subscription id and signature key live in the host's [`StaticState`].
#[derive(Clone)]
pub struct SubscriptionManager {
    transport: Arc<dyn CrmTransport>,
}

impl SubscriptionManager {
    pub fn new(transport: Arc<dyn CrmTransport>) -> Self {
        Self { transport }
    }

    /// True only when an id is stored and the CRM still knows it. Any
    /// failure reads as "not subscribed" so the host re-creates it.
    pub async fn check_exists(&self, state: &StaticState) -> bool {
        let Some(webhook_id) = state.webhook_id.as_deref().filter(|id| !id.trim().is_empty())
        else {
            return false;
        };

        let call = HttpCallSpec::get("/webhook/{id}/").with_path_param("id", webhook_id);
        match self.transport.execute(&call).await {
            Ok(_) => true,
            Err(error) => {
                info!(
                    event_name = "crm.webhook.check_failed",
                    webhook_id,
                    kind = error.kind_str(),
                    "stored webhook subscription could not be confirmed"
                );
                false
            }
        }
    }

    pub async fn create(
        &self,
        state: &mut StaticState,
        target_url: &str,
        object: TriggerObject,
        actions: &[TriggerAction],
    ) -> Result<WebhookSubscription, CrmError> {
        let target_url = target_url.trim();
        if target_url.is_empty() {
            return Err(CrmError::LocalValidation(
                "a public webhook URL is required to subscribe".to_string(),
            ));
        }
        let events = event_filters(object, actions)?;

        let mut body = Map::new();
        body.insert("url".to_string(), json!(target_url));
        body.insert("events".to_string(), json!(events));
        let call = HttpCallSpec::post("/webhook/").with_body(body);
        let response = self.transport.execute(&call).await?;

        let subscription = subscription_from_response(&response)?;
        state.record_subscription(&subscription);
        info!(
            event_name = "crm.webhook.subscribed",
            webhook_id = %subscription.id,
            trigger = object.as_str(),
            event_filters = events.len(),
            "webhook subscription created"
        );
        Ok(subscription)
    }

    /// Removes the CRM-side subscription. Local state is cleared when the
    /// CRM confirms or no longer knows the id; other failures keep it so
    /// the host can retry.
    pub async fn delete(&self, state: &mut StaticState) -> Result<(), CrmError> {
        let Some(webhook_id) = state.webhook_id.clone().filter(|id| !id.trim().is_empty()) else {
            state.clear_subscription();
            return Ok(());
        };

        let call = HttpCallSpec::delete("/webhook/{id}/").with_path_param("id", &webhook_id);
        match self.transport.execute(&call).await {
            Ok(_) => {
                state.clear_subscription();
                info!(
                    event_name = "crm.webhook.unsubscribed",
                    webhook_id = %webhook_id,
                    "webhook subscription deleted"
                );
                Ok(())
            }
            Err(CrmError::Remote(envelope)) if envelope.kind == ErrorKind::NotFound => {
                state.clear_subscription();
                info!(
                    event_name = "crm.webhook.already_gone",
                    webhook_id = %webhook_id,
                    "webhook subscription no longer exists; local state cleared"
                );
                Ok(())
            }
            Err(error) => {
                warn!(
                    event_name = "crm.webhook.unsubscribe_failed",
                    webhook_id = %webhook_id,
                    kind = error.kind_str(),
                    error = %error,
                    "webhook subscription could not be deleted; local state kept"
                );
                Err(error)
            }
        }
    }
}

fn subscription_from_response(response: &Value) -> Result<WebhookSubscription, CrmError> {
    let text = |key: &str| {
        response
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let id = text("id")
        .ok_or_else(|| CrmError::InvalidSubscription("response has no `id`".to_string()))?;
    let signature_key = text("signature_key").ok_or_else(|| {
        CrmError::InvalidSubscription("response has no `signature_key`".to_string())
    })?;
    let events = match response.get("events") {
        Some(Value::Array(events)) => events.clone(),
        _ => Vec::new(),
    };

    Ok(WebhookSubscription { id, signature_key, events })
}
