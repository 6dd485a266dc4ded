//! In-memory transports for unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use closelink_core::domain::call::HttpCallSpec;
use closelink_core::errors::CrmError;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::transport::CrmTransport;

/// Replays queued results in order and records every call it receives.
/// Once the script runs out it answers `{}`.
#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    responses: VecDeque<Result<Value, CrmError>>,
    calls: Vec<HttpCallSpec>,
}

impl ScriptedTransport {
    pub fn with_responses(responses: Vec<Result<Value, CrmError>>) -> Self {
        Self { state: Mutex::new(ScriptedState { responses: responses.into(), calls: Vec::new() }) }
    }

    pub async fn calls(&self) -> Vec<HttpCallSpec> {
        self.state.lock().await.calls.clone()
    }
}

#[async_trait]
impl CrmTransport for ScriptedTransport {
    async fn execute(&self, call: &HttpCallSpec) -> Result<Value, CrmError> {
        let mut state = self.state.lock().await;
        state.calls.push(call.clone());
        state.responses.pop_front().unwrap_or_else(|| Ok(json!({})))
    }
}

/// List endpoint holding `total` records `{"n": index}`, honouring
/// `_skip` and `_limit` and reporting `has_more` like the CRM does.
pub struct PagedBackend {
    total: usize,
    calls: Mutex<Vec<HttpCallSpec>>,
}

impl PagedBackend {
    pub fn new(total: usize) -> Self {
        Self { total, calls: Mutex::new(Vec::new()) }
    }

    pub async fn requests(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn calls(&self) -> Vec<HttpCallSpec> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CrmTransport for PagedBackend {
    async fn execute(&self, call: &HttpCallSpec) -> Result<Value, CrmError> {
        self.calls.lock().await.push(call.clone());

        let read = |key: &str, default: usize| {
            call.query.get(key).and_then(|value| value.parse::<usize>().ok()).unwrap_or(default)
        };
        let skip = read("_skip", 0).min(self.total);
        let limit = read("_limit", 100);
        let end = (skip + limit).min(self.total);
        let data: Vec<Value> = (skip..end).map(|n| json!({ "n": n })).collect();

        Ok(json!({ "data": data, "has_more": end < self.total }))
    }
}
