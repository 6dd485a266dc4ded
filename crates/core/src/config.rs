use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::webhook::{SignatureScheme, WebhookSettings};

pub const DEFAULT_BASE_URL: &str = "https://api.close.com/api/v1";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub close: CloseConfig,
    pub webhook: WebhookConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CloseConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub signature_key: Option<SecretString>,
    pub scheme: SignatureScheme,
    pub tolerance_secs: u64,
    pub idempotency: bool,
    pub dedupe_capacity: usize,
    pub enrich_metadata: bool,
    pub public_url: Option<String>,
    /// Subscription state file written by `closelink webhook subscribe`.
    /// The receiver reads its signature key and processed ids from it.
    pub state_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub custom_field_ttl_secs: u64,
    pub user_ttl_secs: u64,
    pub max_capacity: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub signature_key: Option<String>,
    pub webhook_public_url: Option<String>,
    pub webhook_state_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            close: CloseConfig {
                api_key: String::new().into(),
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout_secs: None,
            },
            webhook: WebhookConfig {
                signature_key: None,
                scheme: SignatureScheme::Concatenated,
                tolerance_secs: crate::webhook::DEFAULT_TOLERANCE_SECS,
                idempotency: true,
                dedupe_capacity: crate::webhook::DEFAULT_DEDUPE_CAPACITY,
                enrich_metadata: false,
                public_url: None,
                state_path: None,
            },
            cache: CacheConfig {
                custom_field_ttl_secs: 600,
                user_ttl_secs: 900,
                max_capacity: 256,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl CloseConfig {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.expose_secret().trim().is_empty()
    }
}

impl WebhookConfig {
    /// Verifier settings; the receiver URL is the configured public URL.
    pub fn settings(&self) -> WebhookSettings {
        WebhookSettings {
            scheme: self.scheme,
            tolerance_secs: self.tolerance_secs,
            idempotency: self.idempotency,
            dedupe_capacity: self.dedupe_capacity,
            enrich_metadata: self.enrich_metadata,
            webhook_url: self.public_url.clone(),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("closelink.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(close) = patch.close {
            if let Some(api_key_value) = close.api_key {
                self.close.api_key = secret_value(api_key_value);
            }
            if let Some(base_url) = close.base_url {
                self.close.base_url = base_url;
            }
            if let Some(timeout_secs) = close.timeout_secs {
                self.close.timeout_secs = Some(timeout_secs);
            }
        }

        if let Some(webhook) = patch.webhook {
            if let Some(signature_key_value) = webhook.signature_key {
                self.webhook.signature_key = Some(secret_value(signature_key_value));
            }
            if let Some(scheme) = webhook.scheme {
                self.webhook.scheme = scheme;
            }
            if let Some(tolerance_secs) = webhook.tolerance_secs {
                self.webhook.tolerance_secs = tolerance_secs;
            }
            if let Some(idempotency) = webhook.idempotency {
                self.webhook.idempotency = idempotency;
            }
            if let Some(dedupe_capacity) = webhook.dedupe_capacity {
                self.webhook.dedupe_capacity = dedupe_capacity;
            }
            if let Some(enrich_metadata) = webhook.enrich_metadata {
                self.webhook.enrich_metadata = enrich_metadata;
            }
            if let Some(public_url) = webhook.public_url {
                self.webhook.public_url = Some(public_url);
            }
            if let Some(state_path) = webhook.state_path {
                self.webhook.state_path = Some(PathBuf::from(state_path));
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(custom_field_ttl_secs) = cache.custom_field_ttl_secs {
                self.cache.custom_field_ttl_secs = custom_field_ttl_secs;
            }
            if let Some(user_ttl_secs) = cache.user_ttl_secs {
                self.cache.user_ttl_secs = user_ttl_secs;
            }
            if let Some(max_capacity) = cache.max_capacity {
                self.cache.max_capacity = max_capacity;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format.parse()?;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CLOSELINK_CLOSE_API_KEY") {
            self.close.api_key = secret_value(value);
        }
        if let Some(value) = read_env("CLOSELINK_CLOSE_BASE_URL") {
            self.close.base_url = value;
        }
        if let Some(value) = read_env("CLOSELINK_CLOSE_TIMEOUT_SECS") {
            self.close.timeout_secs = Some(parse_u64("CLOSELINK_CLOSE_TIMEOUT_SECS", &value)?);
        }

        if let Some(value) = read_env("CLOSELINK_WEBHOOK_SIGNATURE_KEY") {
            self.webhook.signature_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CLOSELINK_WEBHOOK_SCHEME") {
            self.webhook.scheme = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "CLOSELINK_WEBHOOK_SCHEME".to_string(),
                value: value.clone(),
            })?;
        }
        if let Some(value) = read_env("CLOSELINK_WEBHOOK_TOLERANCE_SECS") {
            self.webhook.tolerance_secs = parse_u64("CLOSELINK_WEBHOOK_TOLERANCE_SECS", &value)?;
        }
        if let Some(value) = read_env("CLOSELINK_WEBHOOK_IDEMPOTENCY") {
            self.webhook.idempotency = parse_bool("CLOSELINK_WEBHOOK_IDEMPOTENCY", &value)?;
        }
        if let Some(value) = read_env("CLOSELINK_WEBHOOK_DEDUPE_CAPACITY") {
            self.webhook.dedupe_capacity =
                parse_usize("CLOSELINK_WEBHOOK_DEDUPE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("CLOSELINK_WEBHOOK_ENRICH_METADATA") {
            self.webhook.enrich_metadata = parse_bool("CLOSELINK_WEBHOOK_ENRICH_METADATA", &value)?;
        }
        if let Some(value) = read_env("CLOSELINK_WEBHOOK_PUBLIC_URL") {
            self.webhook.public_url = Some(value);
        }
        if let Some(value) = read_env("CLOSELINK_WEBHOOK_STATE_PATH") {
            self.webhook.state_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("CLOSELINK_CACHE_CUSTOM_FIELD_TTL_SECS") {
            self.cache.custom_field_ttl_secs =
                parse_u64("CLOSELINK_CACHE_CUSTOM_FIELD_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("CLOSELINK_CACHE_USER_TTL_SECS") {
            self.cache.user_ttl_secs = parse_u64("CLOSELINK_CACHE_USER_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("CLOSELINK_CACHE_MAX_CAPACITY") {
            self.cache.max_capacity = parse_u64("CLOSELINK_CACHE_MAX_CAPACITY", &value)?;
        }

        if let Some(value) = read_env("CLOSELINK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CLOSELINK_SERVER_PORT") {
            self.server.port = parse_u16("CLOSELINK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CLOSELINK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CLOSELINK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CLOSELINK_LOGGING_LEVEL").or_else(|| read_env("CLOSELINK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLOSELINK_LOGGING_FORMAT").or_else(|| read_env("CLOSELINK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_key) = overrides.api_key {
            self.close.api_key = secret_value(api_key);
        }
        if let Some(base_url) = overrides.base_url {
            self.close.base_url = base_url;
        }
        if let Some(signature_key) = overrides.signature_key {
            self.webhook.signature_key = Some(secret_value(signature_key));
        }
        if let Some(public_url) = overrides.webhook_public_url {
            self.webhook.public_url = Some(public_url);
        }
        if let Some(state_path) = overrides.webhook_state_path {
            self.webhook.state_path = Some(state_path);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_close(&self.close)?;
        validate_webhook(&self.webhook)?;
        validate_cache(&self.cache)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("closelink.toml"), PathBuf::from("config/closelink.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_close(close: &CloseConfig) -> Result<(), ConfigError> {
    if !is_http_url(&close.base_url) {
        return Err(ConfigError::Validation(
            "close.base_url must start with http:// or https://".to_string(),
        ));
    }

    if let Some(timeout_secs) = close.timeout_secs {
        if timeout_secs == 0 || timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "close.timeout_secs must be in range 1..=300".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_webhook(webhook: &WebhookConfig) -> Result<(), ConfigError> {
    if webhook.tolerance_secs == 0 {
        return Err(ConfigError::Validation(
            "webhook.tolerance_secs must be greater than zero".to_string(),
        ));
    }

    if webhook.dedupe_capacity == 0 {
        return Err(ConfigError::Validation(
            "webhook.dedupe_capacity must be greater than zero".to_string(),
        ));
    }

    if let Some(public_url) = &webhook.public_url {
        if !is_http_url(public_url) {
            return Err(ConfigError::Validation(
                "webhook.public_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.custom_field_ttl_secs == 0 || cache.user_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "cache.custom_field_ttl_secs and cache.user_ttl_secs must be greater than zero"
                .to_string(),
        ));
    }

    if cache.max_capacity == 0 {
        return Err(ConfigError::Validation(
            "cache.max_capacity must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    close: Option<ClosePatch>,
    webhook: Option<WebhookPatch>,
    cache: Option<CachePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ClosePatch {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPatch {
    signature_key: Option<String>,
    scheme: Option<SignatureScheme>,
    tolerance_secs: Option<u64>,
    idempotency: Option<bool>,
    dedupe_capacity: Option<usize>,
    enrich_metadata: Option<bool>,
    public_url: Option<String>,
    state_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    custom_field_ttl_secs: Option<u64>,
    user_ttl_secs: Option<u64>,
    max_capacity: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<String>,
}
