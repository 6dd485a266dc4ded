use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use closelink_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = redact_secret(config.close.api_key.expose_secret());
    let signature_key =
        if config.webhook.signature_key.is_some() { "<redacted>" } else { "<unset>" };

    let state_path = optional(
        config.webhook.state_path.as_ref().map(|path| path.display().to_string()),
    );

    let fields: [(&str, &str, &str); 19] = [
        ("close.api_key", "CLOSELINK_CLOSE_API_KEY", &api_key),
        ("close.base_url", "CLOSELINK_CLOSE_BASE_URL", &config.close.base_url),
        (
            "close.timeout_secs",
            "CLOSELINK_CLOSE_TIMEOUT_SECS",
            &optional(config.close.timeout_secs.map(|secs| secs.to_string())),
        ),
        ("webhook.signature_key", "CLOSELINK_WEBHOOK_SIGNATURE_KEY", signature_key),
        ("webhook.scheme", "CLOSELINK_WEBHOOK_SCHEME", config.webhook.scheme.as_str()),
        (
            "webhook.tolerance_secs",
            "CLOSELINK_WEBHOOK_TOLERANCE_SECS",
            &config.webhook.tolerance_secs.to_string(),
        ),
        (
            "webhook.idempotency",
            "CLOSELINK_WEBHOOK_IDEMPOTENCY",
            &config.webhook.idempotency.to_string(),
        ),
        (
            "webhook.dedupe_capacity",
            "CLOSELINK_WEBHOOK_DEDUPE_CAPACITY",
            &config.webhook.dedupe_capacity.to_string(),
        ),
        (
            "webhook.enrich_metadata",
            "CLOSELINK_WEBHOOK_ENRICH_METADATA",
            &config.webhook.enrich_metadata.to_string(),
        ),
        (
            "webhook.public_url",
            "CLOSELINK_WEBHOOK_PUBLIC_URL",
            config.webhook.public_url.as_deref().unwrap_or("<unset>"),
        ),
        ("webhook.state_path", "CLOSELINK_WEBHOOK_STATE_PATH", &state_path),
        (
            "cache.custom_field_ttl_secs",
            "CLOSELINK_CACHE_CUSTOM_FIELD_TTL_SECS",
            &config.cache.custom_field_ttl_secs.to_string(),
        ),
        (
            "cache.user_ttl_secs",
            "CLOSELINK_CACHE_USER_TTL_SECS",
            &config.cache.user_ttl_secs.to_string(),
        ),
        (
            "cache.max_capacity",
            "CLOSELINK_CACHE_MAX_CAPACITY",
            &config.cache.max_capacity.to_string(),
        ),
        ("server.bind_address", "CLOSELINK_SERVER_BIND_ADDRESS", &config.server.bind_address),
        ("server.port", "CLOSELINK_SERVER_PORT", &config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            "CLOSELINK_SERVER_GRACEFUL_SHUTDOWN_SECS",
            &config.server.graceful_shutdown_secs.to_string(),
        ),
        ("logging.level", "CLOSELINK_LOGGING_LEVEL", &config.logging.level),
        ("logging.format", "CLOSELINK_LOGGING_FORMAT", &format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_key, value) in fields {
        lines.push(render_line(
            key_path,
            value,
            field_source(
                key_path,
                Some(env_key),
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        ));
    }

    lines.join("\n")
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "<unset>".to_string())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("closelink.toml"), PathBuf::from("config/closelink.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Close API keys start with `api_`; only that prefix is ever shown.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('_') {
        return format!("{prefix}_***");
    }

    "<redacted>".to_string()
}
