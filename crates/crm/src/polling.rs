use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use closelink_core::domain::call::{HttpCallSpec, PageLimit};
use closelink_core::domain::operation::Resource;
use closelink_core::domain::state::StaticState;
use closelink_core::errors::CrmError;
use closelink_core::webhook::TriggerObject;
use serde_json::Value;
use tracing::{debug, info};

use crate::pagination::paginate;
use crate::router::ResourceSpec;
use crate::transport::CrmTransport;

const CREATED_AFTER_PARAM: &str = "date_created__gte";

/// Trigger fallback for hosts without a public URL: each cycle lists the
/// records created since the previous one.
#[derive(Clone)]
pub struct Poller {
    transport: Arc<dyn CrmTransport>,
}

impl Poller {
    pub fn new(transport: Arc<dyn CrmTransport>) -> Self {
        Self { transport }
    }

    /// Runs one cycle. The first cycle only records `now` and emits nothing.
    /// Later cycles return records created at or after the cursor that were
    /// not emitted before, then move the cursor to the newest `date_created`
    /// seen. A failed cycle leaves the state untouched.
    pub async fn poll(
        &self,
        state: &mut StaticState,
        object: TriggerObject,
        now: DateTime<Utc>,
    ) -> Result<Vec<Value>, CrmError> {
        let Some(since) = state.last_polled_timestamp else {
            state.last_polled_timestamp = Some(now);
            state.polled_ids_at_cursor.clear();
            debug!(
                event_name = "crm.poll.seeded",
                trigger = object.as_str(),
                "first poll cycle recorded its starting point"
            );
            return Ok(Vec::new());
        };

        let call = list_call(object)?
            .with_query(CREATED_AFTER_PARAM, since.to_rfc3339_opts(SecondsFormat::Micros, true));
        let fetched = paginate(self.transport.as_ref(), &call, PageLimit::all()).await?;

        let cursor = fetched
            .iter()
            .filter_map(created_at)
            .filter(|created| *created >= since)
            .max()
            .unwrap_or(since);

        let mut records = Vec::with_capacity(fetched.len());
        let mut ids_at_cursor = Vec::new();
        for record in fetched {
            let created = created_at(&record);
            let id = record_id(&record);
            if created == Some(cursor) {
                if let Some(id) = &id {
                    if !ids_at_cursor.contains(id) {
                        ids_at_cursor.push(id.clone());
                    }
                }
            }
            let already_emitted = match created {
                Some(created) if created < since => true,
                Some(created) if created == since => {
                    id.as_ref().is_some_and(|id| state.polled_ids_at_cursor.contains(id))
                }
                _ => false,
            };
            if !already_emitted {
                records.push(record);
            }
        }

        if cursor == since {
            for id in std::mem::take(&mut state.polled_ids_at_cursor) {
                if !ids_at_cursor.contains(&id) {
                    ids_at_cursor.push(id);
                }
            }
        }
        state.last_polled_timestamp = Some(cursor);
        state.polled_ids_at_cursor = ids_at_cursor;

        info!(
            event_name = "crm.poll.completed",
            trigger = object.as_str(),
            records = records.len(),
            cursor = %cursor.to_rfc3339_opts(SecondsFormat::Micros, true),
            "poll cycle completed"
        );
        Ok(records)
    }

    /// Latest record of the kind, for hosts that show a sample event while
    /// a workflow is being built.
    pub async fn sample(&self, object: TriggerObject) -> Result<Vec<Value>, CrmError> {
        paginate(self.transport.as_ref(), &list_call(object)?, PageLimit::Max(1)).await
    }
}

fn list_call(object: TriggerObject) -> Result<HttpCallSpec, CrmError> {
    let resource = resource_for(object);
    let spec = ResourceSpec::for_resource(resource).ok_or_else(|| {
        CrmError::LocalValidation(format!("`{}` cannot be polled", object.as_str()))
    })?;
    Ok(HttpCallSpec::get(spec.path))
}

fn created_at(record: &Value) -> Option<DateTime<Utc>> {
    let raw = record.get("date_created")?.as_str()?;
    DateTime::parse_from_rfc3339(raw.trim()).ok().map(|created| created.with_timezone(&Utc))
}

fn record_id(record: &Value) -> Option<String> {
    record.get("id").and_then(Value::as_str).map(str::to_string)
}

fn resource_for(object: TriggerObject) -> Resource {
    match object {
        TriggerObject::Lead => Resource::Lead,
        TriggerObject::Contact => Resource::Contact,
        TriggerObject::Opportunity => Resource::Opportunity,
        TriggerObject::Task => Resource::Task,
        TriggerObject::Note => Resource::Note,
        TriggerObject::Call => Resource::Call,
        TriggerObject::Email => Resource::Email,
        TriggerObject::Sms => Resource::Sms,
        TriggerObject::Meeting => Resource::Meeting,
        TriggerObject::CustomActivity => Resource::CustomActivity,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use closelink_core::domain::call::HttpCallSpec;
    use closelink_core::domain::state::StaticState;
    use closelink_core::errors::{CrmError, ErrorEnvelope, RequestEcho};
    use closelink_core::webhook::TriggerObject;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::Poller;
    use crate::testing::ScriptedTransport;
    use crate::transport::CrmTransport;

    #[tokio::test]
    async fn first_cycle_seeds_the_timestamp_without_fetching() {
        let transport = Arc::new(ScriptedTransport::default());
        let poller = Poller::new(transport.clone());
        let mut state = StaticState::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let records = poller.poll(&mut state, TriggerObject::Lead, now).await.expect("poll");

        assert!(records.is_empty());
        assert_eq!(state.last_polled_timestamp, Some(now));
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn later_cycles_filter_by_creation_time_and_advance_to_newest_record() {
        let transport = Arc::new(ScriptedTransport::with_responses(vec![Ok(json!({
            "data": [
                {"id": "acti_1", "date_created": "2026-03-01T12:01:00.250000+00:00"},
                {"id": "acti_2", "date_created": "2026-03-01T12:03:10.500000+00:00"}
            ],
            "has_more": false
        }))]));
        let poller = Poller::new(transport.clone());
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let now = since + Duration::minutes(5);
        let mut state = StaticState { last_polled_timestamp: Some(since), ..StaticState::default() };

        let records = poller.poll(&mut state, TriggerObject::Note, now).await.expect("poll");

        assert_eq!(records.len(), 2);
        let newest = Utc.with_ymd_and_hms(2026, 3, 1, 12, 3, 10).unwrap() + Duration::milliseconds(500);
        assert_eq!(state.last_polled_timestamp, Some(newest));
        assert_eq!(state.polled_ids_at_cursor, vec!["acti_2".to_string()]);
        let calls = transport.calls().await;
        assert_eq!(calls[0].path, "/activity/note/");
        assert_eq!(
            calls[0].query.get("date_created__gte").map(String::as_str),
            Some("2026-03-01T12:00:00.000000Z")
        );
    }

    #[tokio::test]
    async fn empty_cycle_keeps_the_cursor() {
        let transport =
            Arc::new(ScriptedTransport::with_responses(vec![Ok(json!({"data": [], "has_more": false}))]));
        let poller = Poller::new(transport);
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut state = StaticState {
            last_polled_timestamp: Some(since),
            polled_ids_at_cursor: vec!["lead_a".to_string()],
            ..StaticState::default()
        };

        let records =
            poller.poll(&mut state, TriggerObject::Lead, since + Duration::hours(1)).await.expect("poll");

        assert!(records.is_empty());
        assert_eq!(state.last_polled_timestamp, Some(since));
        assert_eq!(state.polled_ids_at_cursor, vec!["lead_a".to_string()]);
    }

    /// Lead list that honours `date_created__gte` the way the CRM does.
    struct CreatedSinceBackend {
        leads: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl CrmTransport for CreatedSinceBackend {
        async fn execute(&self, call: &HttpCallSpec) -> Result<Value, CrmError> {
            let since = call
                .query
                .get("date_created__gte")
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|since| since.with_timezone(&Utc));
            let data: Vec<Value> = self
                .leads
                .lock()
                .await
                .iter()
                .filter(|lead| match (since, super::created_at(*lead)) {
                    (Some(since), Some(created)) => created >= since,
                    _ => true,
                })
                .cloned()
                .collect();
            Ok(json!({ "data": data, "has_more": false }))
        }
    }

    #[tokio::test]
    async fn records_are_emitted_once_across_cycles() {
        let backend = Arc::new(CreatedSinceBackend {
            leads: Mutex::new(vec![
                json!({"id": "lead_a", "date_created": "2026-03-01T12:05:00.200000+00:00"}),
                json!({"id": "lead_b", "date_created": "2026-03-01T12:05:00.200000+00:00"}),
            ]),
        });
        let poller = Poller::new(backend.clone());
        let seeded_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut state =
            StaticState { last_polled_timestamp: Some(seeded_at), ..StaticState::default() };

        let first = poller
            .poll(&mut state, TriggerObject::Lead, seeded_at + Duration::minutes(5))
            .await
            .expect("first cycle");
        backend
            .leads
            .lock()
            .await
            .push(json!({"id": "lead_c", "date_created": "2026-03-01T12:07:30.000000+00:00"}));
        let second = poller
            .poll(&mut state, TriggerObject::Lead, seeded_at + Duration::minutes(10))
            .await
            .expect("second cycle");
        let third = poller
            .poll(&mut state, TriggerObject::Lead, seeded_at + Duration::minutes(15))
            .await
            .expect("third cycle");

        let ids = |records: &[Value]| -> Vec<String> {
            records.iter().filter_map(|record| record["id"].as_str().map(str::to_string)).collect()
        };
        assert_eq!(ids(first.as_slice()), vec!["lead_a", "lead_b"]);
        assert_eq!(ids(second.as_slice()), vec!["lead_c"]);
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn records_sharing_the_cursor_instant_are_not_repeated() {
        let backend = Arc::new(CreatedSinceBackend {
            leads: Mutex::new(vec![json!({"id": "lead_a", "date_created": "2026-03-01T12:05:00+00:00"})]),
        });
        let poller = Poller::new(backend.clone());
        let seeded_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut state =
            StaticState { last_polled_timestamp: Some(seeded_at), ..StaticState::default() };

        let first = poller.poll(&mut state, TriggerObject::Lead, seeded_at).await.expect("first");
        backend
            .leads
            .lock()
            .await
            .push(json!({"id": "lead_b", "date_created": "2026-03-01T12:05:00+00:00"}));
        let second = poller.poll(&mut state, TriggerObject::Lead, seeded_at).await.expect("second");

        assert_eq!(first.len(), 1);
        assert_eq!(second, vec![json!({"id": "lead_b", "date_created": "2026-03-01T12:05:00+00:00"})]);
        assert_eq!(state.polled_ids_at_cursor, vec!["lead_a".to_string(), "lead_b".to_string()]);
    }

    #[tokio::test]
    async fn failed_cycle_keeps_the_previous_timestamp() {
        let failure = CrmError::Remote(ErrorEnvelope::from_response(
            500,
            None,
            RequestEcho { method: "GET", path: "/lead/", body: None },
            "Internal Server Error",
        ));
        let transport = Arc::new(ScriptedTransport::with_responses(vec![Err(failure)]));
        let poller = Poller::new(transport);
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut state = StaticState { last_polled_timestamp: Some(since), ..StaticState::default() };

        let result = poller.poll(&mut state, TriggerObject::Lead, since + Duration::hours(1)).await;

        assert!(result.is_err());
        assert_eq!(state.last_polled_timestamp, Some(since));
    }

    #[tokio::test]
    async fn sample_requests_a_single_record() {
        let transport = Arc::new(ScriptedTransport::with_responses(vec![Ok(json!({
            "data": [{"id": "task_1"}, {"id": "task_2"}],
            "has_more": true
        }))]));
        let poller = Poller::new(transport.clone());

        let records = poller.sample(TriggerObject::Task).await.expect("sample");

        assert_eq!(records.len(), 1);
        assert_eq!(transport.calls().await[0].query.get("_limit").map(String::as_str), Some("1"));
    }
}
