use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{ClinicBackend, RestClient};

fn client_for(server: &MockServer, token: Option<&str>) -> RestClient {
    let mut config = AppConfig::default().with_base_url(server.uri());
    config.api_token = token.map(str::to_string);
    RestClient::new(&config).expect("client should build")
}

#[tokio::test]
async fn get_decodes_json_body_and_sends_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/patients"))
        .and(header("authorization", "Bearer portal-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "pId": "6", "name": "Tanuj Kulal" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("portal-token"));
    let body = client.get("/patients").await.expect("request should succeed");

    assert_eq!(body["data"][0]["pId"], "6");
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/doctors/9"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such doctor"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client.get("/doctors/9").await.expect_err("404 must fail");

    assert!(err.to_string().contains("Resource not found"));
}

#[tokio::test]
async fn empty_body_decodes_to_null() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/appointments/101/status"))
        .and(query_param("status", "Completed"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let body = client
        .put("/appointments/101/status?status=Completed", None)
        .await
        .expect("204 should succeed");

    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn unparsable_body_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    assert!(client.get("/appointments").await.is_err());
}

#[tokio::test]
async fn put_sends_json_body() {
    let server = MockServer::start().await;
    let record = json!({ "apId": 101, "status": "Cancelled", "patientId": "6" });

    Mock::given(method("PUT"))
        .and(path("/appointments/101"))
        .and(body_json(record.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(record.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let body = client
        .put("/appointments/101", Some(record.clone()))
        .await
        .expect("put should succeed");

    assert_eq!(body, record);
}

#[tokio::test]
async fn trailing_slash_is_trimmed_from_base_url() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = AppConfig::default().with_base_url(format!("{}/", server.uri()));
    let client = RestClient::new(&config).expect("client should build");

    assert_eq!(client.get("/doctors").await.expect("request should succeed"), json!([]));
}
