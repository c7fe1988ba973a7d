//! REST client behavior: verbs, auth header, status mapping

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use chrono::Utc;
use ledgersync_core::domain::{
    EntityKind, OperationId, OperationRequest, RecordId, SyncOperation,
};
use ledgersync_core::ports::IRemoteApi;
use ledgersync_remote::RemoteError;

use crate::common::{setup_remote_mock, unreachable_api, TEST_TOKEN};

#[tokio::test]
async fn test_get_sends_bearer_token() {
    let (server, api) = setup_remote_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/crm/customers"))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "C1"}])))
        .expect(1)
        .mount(&server)
        .await;

    let value = api.get("/api/crm/customers").await.unwrap();
    assert_eq!(value, json!([{"id": "C1"}]));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let (server, api) = setup_remote_mock().await;
    let body = json!({"name": "Acme Traders", "state_code": "29"});
    Mock::given(method("POST"))
        .and(path("/api/crm/customers"))
        .and(body_json(&body))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "C9"})))
        .expect(1)
        .mount(&server)
        .await;

    let created = api.post("/api/crm/customers", &body).await.unwrap();
    assert_eq!(created["id"], "C9");
}

#[tokio::test]
async fn test_put_and_delete() {
    let (server, api) = setup_remote_mock().await;
    Mock::given(method("PUT"))
        .and(path("/api/inventory/items/INV-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"qty": 40})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/inventory/items/INV-7"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let updated = api
        .put("/api/inventory/items/INV-7", &json!({"qty": 40}))
        .await
        .unwrap();
    assert_eq!(updated["qty"], 40);

    let deleted = api.delete("/api/inventory/items/INV-7").await.unwrap();
    assert!(deleted.is_null());
}

#[tokio::test]
async fn test_error_statuses_map_to_remote_error() {
    let (server, api) = setup_remote_mock().await;
    Mock::given(method("POST"))
        .and(path("/api/sales/invoices"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate invoice number"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sales/invoices"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = api
        .post("/api/sales/invoices", &json!({"number": "INV/24-25/001"}))
        .await
        .unwrap_err();
    let remote = err.downcast_ref::<RemoteError>().expect("typed error");
    assert_eq!(remote.code(), "conflict");
    assert!(remote.to_string().contains("duplicate invoice number"));

    let err = api.get("/api/sales/invoices").await.unwrap_err();
    let remote = err.downcast_ref::<RemoteError>().expect("typed error");
    assert!(matches!(remote, RemoteError::ServerError(_)));
    assert!(remote.is_retryable());
}

#[tokio::test]
async fn test_too_many_requests_reads_retry_after() {
    let (server, api) = setup_remote_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/crm/customers"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = api.get("/api/crm/customers").await.unwrap_err();
    match err.downcast_ref::<RemoteError>() {
        Some(RemoteError::TooManyRequests { retry_after }) => {
            assert_eq!(retry_after.as_secs(), 7)
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_body_is_invalid_response() {
    let (server, api) = setup_remote_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/reports/gstr1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = api.get("/api/reports/gstr1").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RemoteError>(),
        Some(RemoteError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let api = unreachable_api();

    let err = api.get("/api/crm/customers").await.unwrap_err();
    let remote = err.downcast_ref::<RemoteError>().expect("typed error");
    assert!(matches!(remote, RemoteError::NetworkError(_)));
    assert_eq!(remote.code(), "network");
}

#[tokio::test]
async fn test_record_ids_reach_the_backend_as_one_segment() {
    let (server, api) = setup_remote_mock().await;
    let cases = [
        ("INV#7", "/api/sales/invoices/INV%237"),
        ("A?force=true", "/api/sales/invoices/A%3Fforce%3Dtrue"),
        ("GST/2024-25/001", "/api/sales/invoices/GST%2F2024-25%2F001"),
    ];
    for (_, expected) in &cases {
        Mock::given(method("DELETE"))
            .and(path(*expected))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
    }

    for (i, (id, _)) in cases.iter().enumerate() {
        let op = SyncOperation::from_request(
            OperationId::new(i as i64 + 1),
            OperationRequest::delete(
                EntityKind::Sale,
                "/api/sales/invoices",
                RecordId::new(*id).unwrap(),
            ),
            Utc::now(),
        );
        api.delete(&op.resource_path()).await.unwrap();
    }

    let received = server.received_requests().await.expect("recording enabled");
    let seen: Vec<_> = received
        .iter()
        .map(|r| (r.url.path().to_string(), r.url.query().map(str::to_string)))
        .collect();
    assert_eq!(
        seen,
        cases
            .iter()
            .map(|(_, expected)| (expected.to_string(), None))
            .collect::<Vec<_>>()
    );
}
