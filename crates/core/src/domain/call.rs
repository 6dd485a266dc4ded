use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// PUT and PATCH are rejected by the CRM without a body, even an empty one.
    pub fn requires_body(&self) -> bool {
        matches!(self, Self::Put | Self::Patch)
    }

    pub fn allows_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single HTTP request derived from an operation. The credential is not
/// part of the call; the transport attaches it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HttpCallSpec {
    pub method: HttpMethod,
    pub path_template: String,
    pub path: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Map<String, Value>>,
}

impl HttpCallSpec {
    pub fn new(method: HttpMethod, path_template: &str) -> Self {
        Self {
            method,
            path_template: path_template.to_string(),
            path: path_template.to_string(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(path_template: &str) -> Self {
        Self::new(HttpMethod::Get, path_template)
    }

    pub fn post(path_template: &str) -> Self {
        Self::new(HttpMethod::Post, path_template)
    }

    pub fn put(path_template: &str) -> Self {
        Self::new(HttpMethod::Put, path_template)
    }

    pub fn delete(path_template: &str) -> Self {
        Self::new(HttpMethod::Delete, path_template)
    }

    /// Substitutes `{name}` in the path template.
    pub fn with_path_param(mut self, name: &str, value: &str) -> Self {
        self.path = self.path.replace(&format!("{{{name}}}"), &encode_path_segment(value));
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = Some(body);
        self
    }

    /// Body that goes on the wire for this method, if any.
    pub fn wire_body(&self) -> Option<Value> {
        if !self.method.allows_body() {
            return None;
        }
        match &self.body {
            Some(body) => Some(Value::Object(body.clone())),
            None if self.method.requires_body() => Some(Value::Object(Map::new())),
            None => None,
        }
    }
}

fn encode_path_segment(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('/', "%2F")
        .replace('?', "%3F")
        .replace('#', "%23")
        .replace(' ', "%20")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLimit {
    /// Walk every page with the given page size.
    All { page_size: u32 },
    /// Fetch a single page of at most this many records.
    Max(u32),
}

impl PageLimit {
    pub fn all() -> Self {
        Self::All { page_size: DEFAULT_PAGE_SIZE }
    }
}

/// What the router hands to the executor.
#[derive(Clone, Debug, PartialEq)]
pub enum CallPlan {
    Single(HttpCallSpec),
    Paginate { call: HttpCallSpec, limit: PageLimit },
    /// Nothing to ask the CRM; the result is an empty list.
    Empty,
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::{HttpCallSpec, HttpMethod};

    #[test]
    fn put_without_body_sends_empty_object() {
        let call = HttpCallSpec::put("/lead/{id}/").with_path_param("id", "lead_1");

        assert_eq!(call.path, "/lead/lead_1/");
        assert_eq!(call.path_template, "/lead/{id}/");
        assert_eq!(call.wire_body(), Some(json!({})));
    }

    #[test]
    fn get_and_delete_never_send_a_body() {
        let mut body = Map::new();
        body.insert("ignored".to_string(), json!(true));

        assert_eq!(HttpCallSpec::get("/lead/").with_body(body.clone()).wire_body(), None);
        assert_eq!(HttpCallSpec::delete("/lead/x/").with_body(body).wire_body(), None);
        assert_eq!(HttpCallSpec::post("/lead/").wire_body(), None);
        assert!(HttpMethod::Patch.requires_body());
    }

    #[test]
    fn path_params_are_escaped() {
        let call = HttpCallSpec::get("/lead/{id}/").with_path_param("id", "a/b c");
        assert_eq!(call.path, "/lead/a%2Fb%20c/");
    }
}
