use std::sync::Arc;

use closelink_core::domain::call::{CallPlan, HttpMethod};
use closelink_core::domain::operation::OperationRequest;
use closelink_core::errors::CrmError;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::pagination::{paginate, Page};
use crate::router::route;
use crate::transport::CrmTransport;

/// Runs routed operations against a transport and normalizes the output
/// into a flat list of records.
#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn CrmTransport>,
}

impl Executor {
    pub fn new(transport: Arc<dyn CrmTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn CrmTransport> {
        self.transport.clone()
    }

    pub async fn run(&self, request: &OperationRequest) -> Result<Vec<Value>, CrmError> {
        let plan = route(request)?;
        let records = self.run_plan(&plan).await?;

        info!(
            event_name = "crm.operation.completed",
            resource = request.resource.as_str(),
            operation = request.operation.as_str(),
            records = records.len(),
            "operation completed"
        );
        Ok(records)
    }

    pub async fn run_plan(&self, plan: &CallPlan) -> Result<Vec<Value>, CrmError> {
        match plan {
            CallPlan::Empty => Ok(Vec::new()),
            CallPlan::Paginate { call, limit } => {
                paginate(self.transport.as_ref(), call, *limit).await
            }
            CallPlan::Single(call) => {
                let response = self.transport.execute(call).await?;
                if call.method == HttpMethod::Delete && is_empty_object(&response) {
                    return Ok(vec![json!({ "success": true })]);
                }
                Ok(Page::from_response(response).records)
            }
        }
    }

    /// Runs each request in order. With `continue_on_fail`, a failing item
    /// yields an error record in its place; otherwise the first failure
    /// aborts the batch.
    pub async fn run_batch(
        &self,
        requests: &[OperationRequest],
        continue_on_fail: bool,
    ) -> Result<Vec<Value>, CrmError> {
        let mut output = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            match self.run(request).await {
                Ok(records) => output.extend(records),
                Err(error) if continue_on_fail => {
                    warn!(
                        event_name = "crm.operation.item_failed",
                        item = index,
                        resource = request.resource.as_str(),
                        operation = request.operation.as_str(),
                        kind = error.kind_str(),
                        error = %error,
                        "operation failed; continuing with next item"
                    );
                    output.push(error.to_error_record());
                }
                Err(error) => return Err(error),
            }
        }
        Ok(output)
    }
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use closelink_core::domain::operation::{Operation, OperationRequest, Resource};
    use closelink_core::errors::{CrmError, ErrorEnvelope, RequestEcho};
    use serde_json::json;

    use super::Executor;
    use crate::testing::ScriptedTransport;

    fn not_found() -> CrmError {
        CrmError::Remote(ErrorEnvelope::from_response(
            404,
            None,
            RequestEcho { method: "GET", path: "/lead/missing/", body: None },
            "Not Found",
        ))
    }

    #[tokio::test]
    async fn local_validation_never_reaches_the_transport() {
        let transport = Arc::new(ScriptedTransport::default());
        let executor = Executor::new(transport.clone());

        let result = executor
            .run(&OperationRequest::new(Resource::Lead, Operation::Update, json!({"leadId": ""})))
            .await;

        assert!(matches!(result, Err(CrmError::LocalValidation(_))));
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn find_without_criteria_returns_empty_without_network() {
        let transport = Arc::new(ScriptedTransport::default());
        let executor = Executor::new(transport.clone());

        let records = executor
            .run(&OperationRequest::new(Resource::Contact, Operation::Find, json!({})))
            .await
            .expect("records");

        assert!(records.is_empty());
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn single_calls_return_the_record_and_deletes_report_success() {
        let transport = Arc::new(ScriptedTransport::with_responses(vec![
            Ok(json!({"id": "lead_1", "display_name": "Acme"})),
            Ok(json!({})),
        ]));
        let executor = Executor::new(transport.clone());

        let records = executor
            .run(&OperationRequest::new(Resource::Lead, Operation::Get, json!({"leadId": "lead_1"})))
            .await
            .expect("get");
        assert_eq!(records, vec![json!({"id": "lead_1", "display_name": "Acme"})]);

        let records = executor
            .run(&OperationRequest::new(Resource::Lead, Operation::Delete, json!({"leadId": "lead_1"})))
            .await
            .expect("delete");
        assert_eq!(records, vec![json!({"success": true})]);
    }

    #[tokio::test]
    async fn batch_continues_past_failures_when_asked() {
        let transport = Arc::new(ScriptedTransport::with_responses(vec![
            Ok(json!({"id": "lead_1"})),
            Err(not_found()),
            Ok(json!({"id": "lead_3"})),
        ]));
        let executor = Executor::new(transport.clone());
        let requests: Vec<OperationRequest> = ["lead_1", "lead_2", "", "lead_3"]
            .into_iter()
            .map(|id| OperationRequest::new(Resource::Lead, Operation::Get, json!({"leadId": id})))
            .collect();

        let output = executor.run_batch(&requests, true).await.expect("batch");

        assert_eq!(output.len(), 4);
        assert_eq!(output[0]["id"], "lead_1");
        assert_eq!(output[1]["kind"], "not_found");
        assert_eq!(output[1]["status"], 404);
        assert_eq!(output[2]["kind"], "local_validation_error");
        assert_eq!(output[3]["id"], "lead_3");
        assert_eq!(transport.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn batch_aborts_on_first_failure_by_default() {
        let transport = Arc::new(ScriptedTransport::with_responses(vec![Err(not_found())]));
        let executor = Executor::new(transport.clone());
        let requests = vec![
            OperationRequest::new(Resource::Lead, Operation::Get, json!({"leadId": "lead_1"})),
            OperationRequest::new(Resource::Lead, Operation::Get, json!({"leadId": "lead_2"})),
        ];

        let result = executor.run_batch(&requests, false).await;

        assert_eq!(result, Err(not_found()));
        assert_eq!(transport.calls().await.len(), 1);
    }
}
