// Error handling tests

use axum::http::StatusCode;
use axum::response::IntoResponse;
use exampro_shim::error::ShimError;
use http_body_util::BodyExt;

async fn envelope(error: ShimError) -> (StatusCode, serde_json::Value) {
    let response = error.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[test]
fn test_error_display_messages() {
    let errors = vec![
        ShimError::Config("bad port".to_string()),
        ShimError::Upstream("origin down".to_string()),
        ShimError::Cache("Vary header contains *".to_string()),
        ShimError::InvalidRequest("missing functionName".to_string()),
        ShimError::Grading("thread exited".to_string()),
        ShimError::Internal("oops".to_string()),
    ];

    for error in errors {
        let display = format!("{}", error);
        assert!(!display.is_empty(), "Error should have display message");
    }
}

#[tokio::test]
async fn test_invalid_request_envelope() {
    let (status, body) = envelope(ShimError::InvalidRequest("missing field `functionName`".into())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("functionName"));
}

#[tokio::test]
async fn test_upstream_error_is_bad_gateway() {
    let (status, body) = envelope(ShimError::Upstream("connection refused".into())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["type"], "upstream_error");
}

#[tokio::test]
async fn test_grading_error_is_internal() {
    let (status, body) = envelope(ShimError::Grading("thread exited".into())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["type"], "grading_error");
}

#[test]
fn test_json_error_conversion() {
    let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
    let error: ShimError = parse.unwrap_err().into();

    assert!(matches!(error, ShimError::Json(_)));
    assert_eq!(error.status_and_type().0, StatusCode::BAD_REQUEST);
}
