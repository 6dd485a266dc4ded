use std::sync::Arc;

use closelink_core::config::{AppConfig, ConfigError, LoadOptions};
use closelink_core::webhook::WebhookVerifier;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::state_file::{StateFile, StateFileError};

pub struct Application {
    pub config: AppConfig,
    pub verifier: Arc<Mutex<WebhookVerifier>>,
    pub state_file: Option<StateFile>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    StateFile(#[from] StateFileError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Builds the receiver's verifier. With a state file, the processed ids and
/// the subscription's signature key come from it; a configured key wins.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let state_file = config.webhook.state_path.clone().map(StateFile::new);
    let settings = config.webhook.settings();

    let verifier = match &state_file {
        Some(file) => {
            let stored = file.load().await?;
            let mut verifier = WebhookVerifier::from_state(&stored, settings);
            verifier.set_signature_key(signature_key(&config, stored.signature_key.as_deref()));
            info!(
                event_name = "system.bootstrap.webhook_state_loaded",
                state_path = %file.path().display(),
                processed_event_ids = verifier.processed().len(),
                "webhook state loaded"
            );
            verifier
        }
        None => WebhookVerifier::new(config.webhook.signature_key.clone(), settings),
    };

    if verifier.has_signature_key() {
        info!(
            event_name = "system.bootstrap.webhook_verification",
            scheme = config.webhook.scheme.as_str(),
            tolerance_secs = config.webhook.tolerance_secs,
            "webhook signature verification enabled"
        );
    } else {
        warn!(
            event_name = "system.bootstrap.webhook_unverified",
            "no webhook signature key configured; deliveries are accepted without verification"
        );
    }

    Ok(Application { config, verifier: Arc::new(Mutex::new(verifier)), state_file })
}

/// Configured key first, then the key the subscription stored.
pub fn signature_key(config: &AppConfig, stored: Option<&str>) -> Option<SecretString> {
    config
        .webhook
        .signature_key
        .clone()
        .or_else(|| stored.map(|key| SecretString::from(key.to_string())))
}
