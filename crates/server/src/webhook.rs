use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use closelink_core::config::AppConfig;
use closelink_core::webhook::{
    DeliveryOutcome, InboundDelivery, WebhookError, WebhookVerifier, SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::bootstrap::signature_key;
use crate::state_file::StateFile;

pub const WEBHOOK_PATH: &str = "/webhooks/close";

#[derive(Clone)]
pub struct WebhookState {
    verifier: Arc<Mutex<WebhookVerifier>>,
    config: Arc<AppConfig>,
    state_file: Option<StateFile>,
}

impl WebhookState {
    pub fn new(
        verifier: Arc<Mutex<WebhookVerifier>>,
        config: Arc<AppConfig>,
        state_file: Option<StateFile>,
    ) -> Self {
        Self { verifier, config, state_file }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route(WEBHOOK_PATH, post(receive)).with_state(state)
}

pub async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let delivery = delivery_from(&headers, body);
    let mut verifier = state.verifier.lock().await;

    // The subscription may have been re-created since startup; its current
    // key is the one Close signs with.
    if let Some(file) = &state.state_file {
        match file.load().await {
            Ok(stored) => verifier
                .set_signature_key(signature_key(&state.config, stored.signature_key.as_deref())),
            Err(load_error) => {
                error!(
                    event_name = "webhook.receiver.state_unavailable",
                    error = %load_error,
                    "webhook state could not be read; delivery left for retry"
                );
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "webhook state is unavailable" })),
                );
            }
        }
    }

    match verifier.process(&delivery, Utc::now()) {
        Ok(DeliveryOutcome::Accepted(events)) => {
            if let Some(file) = &state.state_file {
                persist_processed_ids(file, &verifier).await;
            }
            info!(
                event_name = "webhook.receiver.accepted",
                events = events.len(),
                "webhook delivery accepted"
            );
            (StatusCode::OK, Json(json!({ "events": events })))
        }
        Ok(DeliveryOutcome::Duplicate { event_id }) => {
            info!(
                event_name = "webhook.receiver.duplicate",
                event_id = %event_id,
                "duplicate webhook delivery acknowledged"
            );
            (StatusCode::OK, Json(json!({ "events": [], "duplicate": event_id })))
        }
        Err(rejection) => {
            warn!(
                event_name = "webhook.receiver.rejected",
                error_class = rejection.error_class(),
                error = %rejection,
                "webhook delivery rejected"
            );
            (status_for(&rejection), Json(json!({ "error": rejection.to_string() })))
        }
    }
}

/// Re-reads the file so fields written by the CLI are kept.
async fn persist_processed_ids(file: &StateFile, verifier: &WebhookVerifier) {
    let saved = match file.load().await {
        Ok(mut stored) => {
            verifier.store_state(&mut stored);
            file.save(&stored).await
        }
        Err(load_error) => Err(load_error),
    };
    if let Err(save_error) = saved {
        warn!(
            event_name = "webhook.receiver.state_not_saved",
            error = %save_error,
            "processed event ids were not persisted"
        );
    }
}

fn delivery_from(headers: &HeaderMap, body: Bytes) -> InboundDelivery {
    let mut delivery = InboundDelivery::new(body.to_vec());
    for name in [TIMESTAMP_HEADER, SIGNATURE_HEADER] {
        if let Some(value) = headers.get(name).and_then(|value| value.to_str().ok()) {
            delivery.insert_header(name, value);
        }
    }
    delivery
}

fn status_for(error: &WebhookError) -> StatusCode {
    match error {
        WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        WebhookError::MissingHeader(_)
        | WebhookError::InvalidSignature
        | WebhookError::InvalidTimestamp(_)
        | WebhookError::StaleTimestamp { .. } => StatusCode::UNAUTHORIZED,
    }
}
