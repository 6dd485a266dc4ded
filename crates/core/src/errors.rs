use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Classification of a failed CRM call. Local validation failures are not
/// part of this set because they never produce an HTTP status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthError,
    PermissionError,
    NotFound,
    RateLimited,
    ServerError,
    ValidationError,
    Unknown,
}

impl ErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::ValidationError,
            401 => Self::AuthError,
            403 => Self::PermissionError,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthError => "auth_error",
            Self::PermissionError => "permission_error",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::ValidationError => "validation_error",
            Self::Unknown => "unknown",
        }
    }
}

/// Request context echoed into 400 diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct RequestEcho<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub body: Option<&'a Value>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    pub description: Option<String>,
    pub raw_status: Option<u16>,
}

impl ErrorEnvelope {
    /// Builds the envelope for a non-2xx response. `fallback` is the
    /// transport-level text (usually the canonical reason phrase).
    pub fn from_response(
        status: u16,
        body: Option<&Value>,
        request: RequestEcho<'_>,
        fallback: &str,
    ) -> Self {
        let kind = ErrorKind::from_status(status);
        let upstream = body.and_then(upstream_message);

        let (message, description) = match kind {
            ErrorKind::ValidationError => {
                let detail = body
                    .and_then(validation_detail)
                    .or_else(|| upstream.clone())
                    .unwrap_or_else(|| fallback.to_string());
                let echoed_body = request
                    .body
                    .map(Value::to_string)
                    .unwrap_or_else(|| "<none>".to_string());
                (
                    format!(
                        "the CRM rejected the request ({} {}): {detail}",
                        request.method, request.path
                    ),
                    Some(format!(
                        "{} {} with body {echoed_body}",
                        request.method, request.path
                    )),
                )
            }
            ErrorKind::AuthError => (
                "authentication failed: invalid or expired API key".to_string(),
                upstream,
            ),
            ErrorKind::PermissionError => (
                "the API key is not permitted to perform this operation".to_string(),
                upstream,
            ),
            ErrorKind::NotFound => (
                format!("the requested resource was not found: {}", request.path),
                upstream,
            ),
            ErrorKind::RateLimited => (
                "the CRM rate limit was exceeded; retry later".to_string(),
                upstream,
            ),
            ErrorKind::ServerError => {
                ("the CRM encountered an internal server error".to_string(), upstream)
            }
            ErrorKind::Unknown => {
                let detail = upstream.unwrap_or_else(|| {
                    if fallback.trim().is_empty() {
                        "no error detail returned".to_string()
                    } else {
                        fallback.to_string()
                    }
                });
                (format!("the CRM returned status {status}: {detail}"), None)
            }
        };

        Self { kind, message, description, raw_status: Some(status) }
    }

    /// A call that never received a response.
    pub fn network(source: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            message: "the CRM could not be reached".to_string(),
            description: Some(source.to_string()),
            raw_status: None,
        }
    }
}

fn upstream_message(body: &Value) -> Option<String> {
    ["error", "message"].iter().find_map(|key| match body.get(*key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Some(Value::Object(map)) if !map.is_empty() => Some(Value::Object(map.clone()).to_string()),
        _ => None,
    })
}

fn validation_detail(body: &Value) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(message) = upstream_message(body) {
        parts.push(message);
    }
    if let Some(Value::Object(fields)) = body.get("field-errors") {
        for (field, error) in fields {
            let text = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
            parts.push(format!("{field}: {text}"));
        }
    }
    if let Some(Value::Array(errors)) = body.get("errors") {
        parts.extend(
            errors
                .iter()
                .map(|error| error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string())),
        );
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CrmError {
    #[error("{0}")]
    LocalValidation(String),
    #[error("the Close credential has no API key configured")]
    MissingCredential,
    #[error(transparent)]
    Remote(#[from] ErrorEnvelope),
    #[error("could not decode CRM response: {0}")]
    Decode(String),
    #[error("webhook subscription is unusable: {0}")]
    InvalidSubscription(String),
    #[error("could not build the HTTP client: {0}")]
    Client(String),
}

impl CrmError {
    pub fn missing_parameter(name: &str) -> Self {
        Self::LocalValidation(format!("missing required parameter `{name}`"))
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::LocalValidation(_) => "local_validation_error",
            Self::MissingCredential => "auth_error",
            Self::Remote(envelope) => envelope.kind.as_str(),
            Self::Decode(_) | Self::InvalidSubscription(_) | Self::Client(_) => "unknown",
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Remote(envelope) => envelope.description.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote(envelope) => envelope.raw_status,
            _ => None,
        }
    }

    /// Error-shaped output record used when the host continues past
    /// per-item failures.
    pub fn to_error_record(&self) -> Value {
        let mut record = Map::new();
        record.insert("error".to_string(), json!(self.to_string()));
        record.insert("kind".to_string(), json!(self.kind_str()));
        if let Some(description) = self.description() {
            record.insert("description".to_string(), json!(description));
        }
        if let Some(status) = self.status() {
            record.insert("status".to_string(), json!(status));
        }
        Value::Object(record)
    }
}
