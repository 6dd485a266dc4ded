use std::time::Duration;

use async_trait::async_trait;
use closelink_core::config::CloseConfig;
use closelink_core::domain::call::{HttpCallSpec, HttpMethod};
use closelink_core::domain::directory::WorkspaceKey;
use closelink_core::errors::{CrmError, ErrorEnvelope, RequestEcho};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Executes one call against the CRM and returns the decoded JSON body.
#[async_trait]
pub trait CrmTransport: Send + Sync {
    async fn execute(&self, call: &HttpCallSpec) -> Result<Value, CrmError>;
}

/// reqwest-backed client for the Close REST API.
#[derive(Clone)]
pub struct CloseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl std::fmt::Debug for CloseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl CloseClient {
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, CrmError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|error| CrmError::Client(error.to_string()))?;
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();

        Ok(Self { http, base_url, api_key })
    }

    pub fn from_config(config: &CloseConfig) -> Result<Self, CrmError> {
        Self::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn workspace_key(&self) -> WorkspaceKey {
        WorkspaceKey::from_api_key(&self.api_key)
    }

    /// Credential check: `GET /me/` returns the authenticated user.
    pub async fn verify_credential(&self) -> Result<Value, CrmError> {
        self.execute(&HttpCallSpec::get("/me/")).await
    }

    fn url_for(&self, call: &HttpCallSpec) -> String {
        if call.path.starts_with('/') {
            format!("{}{}", self.base_url, call.path)
        } else {
            format!("{}/{}", self.base_url, call.path)
        }
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl CrmTransport for CloseClient {
    async fn execute(&self, call: &HttpCallSpec) -> Result<Value, CrmError> {
        let api_key = self.api_key.expose_secret();
        if api_key.trim().is_empty() {
            return Err(CrmError::MissingCredential);
        }

        let body = call.wire_body();
        let mut request = self
            .http
            .request(reqwest_method(call.method), self.url_for(call))
            .basic_auth(api_key, Some(""))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        debug!(
            event_name = "crm.request.sent",
            method = call.method.as_str(),
            path = %call.path_template,
            query_params = call.query.len(),
            "sending CRM request"
        );

        let response = request.send().await.map_err(|error| {
            warn!(
                event_name = "crm.request.unreachable",
                method = call.method.as_str(),
                path = %call.path_template,
                error = %error,
                "CRM request failed before a response was received"
            );
            CrmError::Remote(ErrorEnvelope::network(error))
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| CrmError::Remote(ErrorEnvelope::network(error)))?;

        if status.is_success() {
            debug!(
                event_name = "crm.request.completed",
                method = call.method.as_str(),
                path = %call.path_template,
                status = status.as_u16(),
                "CRM request completed"
            );
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(json!({}));
            }
            return serde_json::from_slice(&bytes)
                .map_err(|error| CrmError::Decode(error.to_string()));
        }

        let parsed: Option<Value> = serde_json::from_slice(&bytes).ok();
        let envelope = ErrorEnvelope::from_response(
            status.as_u16(),
            parsed.as_ref(),
            RequestEcho { method: call.method.as_str(), path: &call.path, body: body.as_ref() },
            status.canonical_reason().unwrap_or("unexpected response"),
        );
        warn!(
            event_name = "crm.request.failed",
            method = call.method.as_str(),
            path = %call.path_template,
            status = status.as_u16(),
            kind = envelope.kind.as_str(),
            "CRM request returned an error status"
        );
        Err(CrmError::Remote(envelope))
    }
}
