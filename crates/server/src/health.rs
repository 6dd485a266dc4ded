use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use closelink_core::webhook::WebhookVerifier;
use serde::Serialize;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct HealthState {
    verifier: Arc<Mutex<WebhookVerifier>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub webhook: HealthCheck,
    pub checked_at: String,
}

pub fn router(verifier: Arc<Mutex<WebhookVerifier>>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { verifier })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let webhook = webhook_check(&state.verifier).await;

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "closelink-server accepting deliveries".to_string(),
        },
        webhook,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

async fn webhook_check(verifier: &Mutex<WebhookVerifier>) -> HealthCheck {
    let verifier = verifier.lock().await;
    let processed = verifier.processed().len();
    if verifier.has_signature_key() {
        HealthCheck {
            status: "verifying",
            detail: format!(
                "signatures checked with the {} scheme; {processed} event ids remembered",
                verifier.settings().scheme.as_str()
            ),
        }
    } else {
        HealthCheck {
            status: "unverified",
            detail: format!("no signature key configured; {processed} event ids remembered"),
        }
    }
}
