//! Integration tests for the Shiftclock HTTP client

use serde_json::json;
use shiftclock_http::types::LoginRequest;
use shiftclock_http::{ApiClient, ClientError};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_client_builder_requires_base_url() {
    let result = ApiClient::builder().build();
    assert!(matches!(result, Err(ClientError::Configuration(_))));
}

#[tokio::test]
async fn test_client_builder_trims_trailing_slash() {
    let client = ApiClient::new("http://localhost:8080/").unwrap();
    assert_eq!(client.base_url(), "http://localhost:8080");
}

#[tokio::test]
async fn test_login_decodes_camel_case_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "admin@x.com", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {
                "id": "u-1",
                "email": "admin@x.com",
                "name": "Ada Admin",
                "role": "super_admin",
                "companyId": "c-9"
            },
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
            "expiresIn": 3600
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(mock_server.uri()).unwrap();
    let response = client
        .login(&LoginRequest::new("admin@x.com", "secret"))
        .await
        .unwrap();

    assert_eq!(response.user.id, "u-1");
    assert_eq!(response.user.company_id.as_deref(), Some("c-9"));
    assert_eq!(response.access_token, "access-1");
    assert_eq!(response.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(response.expires_in, 3600);
}

#[tokio::test]
async fn test_login_maps_401_to_authentication_failed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(mock_server.uri()).unwrap();
    let err = client
        .login(&LoginRequest::new("employee@x.com", "nope"))
        .await
        .unwrap_err();

    match err {
        ClientError::AuthenticationFailed(message) => assert_eq!(message, "bad credentials"),
        other => panic!("Expected AuthenticationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_refresh_without_rotation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "access-2",
            "expiresIn": 900
        })))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(mock_server.uri()).unwrap();
    let response = client.refresh("refresh-1").await.unwrap();

    assert_eq!(response.access_token, "access-2");
    assert_eq!(response.refresh_token, None);
    assert_eq!(response.expires_in, 900);
}

#[tokio::test]
async fn test_refresh_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(mock_server.uri()).unwrap();
    let err = client.refresh("refresh-1").await.unwrap_err();
    assert!(matches!(err, ClientError::ServerError { status: 503, .. }));
}

#[tokio::test]
async fn test_logout_accepts_empty_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(mock_server.uri()).unwrap();
    client.logout(Some("refresh-1")).await.unwrap();
}

#[tokio::test]
async fn test_logout_without_refresh_token_sends_empty_object() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(mock_server.uri()).unwrap();
    client.logout(None).await.unwrap();
}

#[tokio::test]
async fn test_malformed_body_is_not_a_network_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(mock_server.uri()).unwrap();
    let err = client.refresh("refresh-1").await.unwrap_err();
    assert!(matches!(err, ClientError::Serialization(_)));
    assert!(!err.is_network());
}

#[tokio::test]
async fn test_connection_refused_is_a_network_error() {
    let client = ApiClient::new("http://127.0.0.1:1").unwrap();
    let err = client.refresh("refresh-1").await.unwrap_err();
    assert!(err.is_network(), "expected network error, got {err:?}");
    assert_eq!(err.status(), None);
}
