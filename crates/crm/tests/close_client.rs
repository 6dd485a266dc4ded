use std::sync::Arc;

use closelink_core::domain::call::HttpCallSpec;
use closelink_core::domain::operation::{Operation, OperationRequest, Resource};
use closelink_core::errors::{CrmError, ErrorKind};
use closelink_crm::{CloseClient, CrmTransport, Executor};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> CloseClient {
    CloseClient::new(SecretString::from("api_test".to_string()), server.uri(), None)
        .expect("client")
}

fn remote_kind(result: Result<serde_json::Value, CrmError>) -> (ErrorKind, String) {
    match result {
        Err(CrmError::Remote(envelope)) => (envelope.kind, envelope.message),
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn requests_carry_basic_auth_with_the_key_as_username() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/"))
        .and(header("authorization", "Basic YXBpX3Rlc3Q6"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "user_1"})))
        .expect(1)
        .mount(&server)
        .await;

    let me = client(&server).verify_credential().await.expect("credential");

    assert_eq!(me["id"], "user_1");
}

#[tokio::test]
async fn non_success_statuses_are_classified() {
    let server = MockServer::start().await;
    let cases = [
        (400, ErrorKind::ValidationError),
        (401, ErrorKind::AuthError),
        (403, ErrorKind::PermissionError),
        (404, ErrorKind::NotFound),
        (429, ErrorKind::RateLimited),
        (500, ErrorKind::ServerError),
        (418, ErrorKind::Unknown),
    ];
    for (status, _) in cases {
        Mock::given(method("GET"))
            .and(path(format!("/status/{status}/")))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({"error": "upstream detail"})),
            )
            .mount(&server)
            .await;
    }

    let client = client(&server);
    for (status, expected) in cases {
        let call = HttpCallSpec::get(&format!("/status/{status}/"));
        let (kind, message) = remote_kind(client.execute(&call).await);
        assert_eq!(kind, expected, "status {status}");
        assert!(!message.trim().is_empty(), "status {status} has an empty message");
    }
}

#[tokio::test]
async fn validation_errors_echo_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lead/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "field-errors": {"name": "This field is required."}
        })))
        .mount(&server)
        .await;

    let mut body = serde_json::Map::new();
    body.insert("description".to_string(), json!("no name"));
    let result = client(&server).execute(&HttpCallSpec::post("/lead/").with_body(body)).await;

    match result {
        Err(CrmError::Remote(envelope)) => {
            assert!(envelope.message.contains("name: This field is required."));
            let description = envelope.description.expect("description");
            assert!(description.contains("POST /lead/"));
            assert!(description.contains("no name"));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn put_without_fields_sends_an_empty_object_and_empty_bodies_decode() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/lead/lead_1/"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let call = HttpCallSpec::put("/lead/{id}/").with_path_param("id", "lead_1");
    let response = client(&server).execute(&call).await.expect("response");

    assert_eq!(response, json!({}));
}

#[tokio::test]
async fn unreachable_host_is_an_unknown_remote_error() {
    let client = CloseClient::new(
        SecretString::from("api_test".to_string()),
        "http://127.0.0.1:1",
        Some(std::time::Duration::from_secs(2)),
    )
    .expect("client");

    let (kind, message) = remote_kind(client.execute(&HttpCallSpec::get("/me/")).await);

    assert_eq!(kind, ErrorKind::Unknown);
    assert!(message.contains("could not be reached"));
}

#[tokio::test]
async fn executor_walks_pages_through_the_real_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lead/"))
        .and(query_param("_skip", "0"))
        .and(query_param("query", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "lead_1"}, {"id": "lead_2"}],
            "has_more": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lead/"))
        .and(query_param("_skip", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "lead_3"}],
            "has_more": false
        })))
        .mount(&server)
        .await;

    let executor = Executor::new(Arc::new(client(&server)));
    let records = executor
        .run(&OperationRequest::new(
            Resource::Lead,
            Operation::Find,
            json!({"returnAll": true, "filters": {"query": "acme"}}),
        ))
        .await
        .expect("records");

    let ids: Vec<&str> = records.iter().filter_map(|record| record["id"].as_str()).collect();
    assert_eq!(ids, vec!["lead_1", "lead_2", "lead_3"]);
}
