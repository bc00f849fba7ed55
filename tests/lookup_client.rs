mod common;

use common::recording_client;
use lookup_bot::lookup::{LookupOutcome, NO_DATA_MESSAGE};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NUMBER: &str = "9876543210";

const RECORD_BODY: &str = r#"[{
    "name": "Ravi Kumar",
    "mobile": "9876543210",
    "father_name": "Suresh Kumar",
    "address": "12 Main Road!!Delhi",
    "circle": "DL",
    "id_number": "ABCD1234"
}]"#;

#[tokio::test]
async fn test_lookup_formats_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info"))
        .and(query_param("mobile", NUMBER))
        .and(query_param("api_key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RECORD_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let (client, sleeper) = recording_client(&server.uri());
    let outcome = client.lookup(NUMBER).await;

    let LookupOutcome::Found { text, records } = outcome else {
        panic!("expected records, got {:?}", outcome);
    };
    assert_eq!(records, 1);
    assert!(text.contains("Name: Ravi Kumar"));
    assert!(text.contains("Address: 12 Main Road, Delhi"));
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_lookup_accepts_success_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "data": {"name": "Asha", "mobile": NUMBER}
        })))
        .mount(&server)
        .await;

    let (client, _) = recording_client(&server.uri());
    let outcome = client.lookup(NUMBER).await;

    assert!(matches!(outcome, LookupOutcome::Found { records: 1, .. }));
    assert!(outcome.text().contains("Name: Asha"));
    assert!(outcome.text().contains("Father's Name: N/A"));
}

#[tokio::test]
async fn test_lookup_passes_plain_text_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Owner: Ravi, Circle: Delhi"))
        .mount(&server)
        .await;

    let (client, _) = recording_client(&server.uri());
    let outcome = client.lookup(NUMBER).await;

    assert_eq!(
        outcome,
        LookupOutcome::Text("Owner: Ravi, Circle: Delhi".to_string())
    );
}

#[tokio::test]
async fn test_lookup_empty_results_are_no_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let (client, _) = recording_client(&server.uri());
    let outcome = client.lookup(NUMBER).await;

    assert_eq!(outcome, LookupOutcome::NoData);
    assert_eq!(outcome.text(), NO_DATA_MESSAGE);
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let (client, sleeper) = recording_client(&server.uri());
    let outcome = client.lookup(NUMBER).await;

    assert_eq!(outcome, LookupOutcome::AuthFailed);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_rate_limit_backs_off_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RECORD_BODY))
        .mount(&server)
        .await;

    let (client, sleeper) = recording_client(&server.uri());
    let outcome = client.lookup(NUMBER).await;

    assert!(matches!(outcome, LookupOutcome::Found { records: 1, .. }));
    // retry_delay_ms is 10; first attempt waits 10 * 2^1
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(20)]);
}

#[tokio::test]
async fn test_persistent_rate_limit_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let (client, sleeper) = recording_client(&server.uri());
    let outcome = client.lookup(NUMBER).await;

    assert_eq!(
        outcome,
        LookupOutcome::Failed(
            "Request failed after 3 attempts. Last error: API returned HTTP 429".to_string()
        )
    );
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(20), Duration::from_millis(40)]
    );
}

#[tokio::test]
async fn test_server_errors_fail_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let (client, sleeper) = recording_client(&server.uri());
    let outcome = client.lookup(NUMBER).await;

    assert_eq!(
        outcome,
        LookupOutcome::Failed("API returned HTTP 500".to_string())
    );
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_server_error_recovers_on_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RECORD_BODY))
        .mount(&server)
        .await;

    let (client, _) = recording_client(&server.uri());
    assert!(client.lookup(NUMBER).await.has_result());
}

#[tokio::test]
async fn test_connection_errors_back_off_linearly() {
    // Reserve a port, then free it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, sleeper) = recording_client(&format!("http://{}", addr));
    let outcome = client.lookup(NUMBER).await;

    let LookupOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.starts_with("Request failed after 3 attempts. Last error: "));
    let detail = message.trim_start_matches("Request failed after 3 attempts. Last error: ");
    assert!(detail.chars().count() <= 100);
    assert!(!message.contains("test-key"));
    assert!(!message.contains(NUMBER));
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(10), Duration::from_millis(20)]
    );
}
