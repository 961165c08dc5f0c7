/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use nimbus_client::test_connection::TestConnection;
use nimbus_client::{
    Client, Config, ConnectorError, DynConnector, ExceptionKind, RequestContext, RetryConfig,
    SdkBody, SdkError,
};
use nimbus_credentials::Credentials;
use std::time::Duration;

fn test_client(conn: TestConnection<&'static str>) -> Client {
    let config = Config::builder()
        .region("us-east-1")
        .connector(DynConnector::new(conn))
        .credentials_provider(Credentials::from_keys("access_key", "secret_key", None))
        .retry_config(RetryConfig::default().with_static_base(|| 1.0))
        .build()
        .expect("valid test config");
    Client::new(config)
}

fn test_request(body: &str) -> http::Request<SdkBody> {
    http::Request::builder()
        .method("POST")
        .uri("/")
        .body(SdkBody::from(body))
        .expect("valid request")
}

fn context() -> RequestContext {
    RequestContext::new("test-service", "TestOperation")
}

#[tokio::test]
async fn signed_request_reaches_the_wire() {
    let conn = TestConnection::new(vec![(
        test_request("request body"),
        http::Response::builder()
            .status(200)
            .body("response body")
            .unwrap(),
    )]);
    let client = test_client(conn.clone());

    let mut result = client.dispatch(test_request("request body"), context());
    assert!(!result.is_resolved());
    let response = result.resolve().await.expect("successful dispatch");
    assert_eq!(http::StatusCode::OK, response.status());
    assert_eq!(b"response body", response.body().as_ref());

    assert_eq!(1, conn.num_calls());
    let requests = conn.requests();
    let sent = &requests[0].actual;
    assert_eq!(
        "https://test-service.us-east-1.amazonaws.com/",
        sent.uri().to_string()
    );
    assert_eq!(
        "test-service.us-east-1.amazonaws.com",
        sent.headers()["host"].to_str().unwrap()
    );
    assert!(sent.headers().contains_key("x-amz-date"));
    let authorization = sent.headers()["authorization"].to_str().unwrap();
    assert!(
        authorization.starts_with("AWS4-HMAC-SHA256 Credential=access_key/"),
        "unexpected authorization header: {}",
        authorization
    );
    assert!(authorization.contains("/us-east-1/test-service/aws4_request"));
    assert!(authorization.contains("SignedHeaders="));
    assert!(authorization.contains("Signature="));
}

#[tokio::test]
async fn anonymous_credentials_skip_signing() {
    let conn = TestConnection::new(vec![(
        test_request(""),
        http::Response::builder().status(200).body("").unwrap(),
    )]);
    let config = Config::builder()
        .region("us-east-1")
        .connector(DynConnector::new(conn.clone()))
        .credentials_provider(Credentials::anonymous())
        .build()
        .unwrap();
    let client = Client::new(config);

    let mut result = client.dispatch(test_request(""), context());
    result.resolve().await.expect("anonymous dispatch succeeds");
    let requests = conn.requests();
    assert!(!requests[0].actual.headers().contains_key("authorization"));
}

#[tokio::test(start_paused = true)]
async fn server_errors_are_retried_until_success() {
    let error_body = "<Error><Code>InternalFailure</Code><Message>try again</Message></Error>";
    let conn = TestConnection::new(vec![
        (
            test_request("request body"),
            http::Response::builder()
                .status(503)
                .body(error_body)
                .unwrap(),
        ),
        (
            test_request("request body"),
            http::Response::builder()
                .status(200)
                .body("response body")
                .unwrap(),
        ),
    ]);
    let client = test_client(conn.clone());

    let mut result = client.dispatch(test_request("request body"), context());
    let response = result.resolve().await.expect("second attempt succeeds");
    assert_eq!(http::StatusCode::OK, response.status());
    assert_eq!(2, conn.num_calls());
    conn.assert_drained();
}

#[tokio::test(start_paused = true)]
async fn throttling_code_in_a_400_is_retried() {
    let conn = TestConnection::new(vec![
        (
            test_request("{}"),
            http::Response::builder()
                .status(400)
                .body(r#"{"__type":"RequestLimitExceeded","message":"slow down"}"#)
                .unwrap(),
        ),
        (
            test_request("{}"),
            http::Response::builder().status(200).body("ok").unwrap(),
        ),
    ]);
    let client = test_client(conn.clone());

    let mut result = client.dispatch(test_request("{}"), context());
    result.resolve().await.expect("retried past the throttle");
    assert_eq!(2, conn.num_calls());
}

#[tokio::test(start_paused = true)]
async fn retries_exhaust_and_surface_the_server_error() {
    let error_body = "<Error><Code>InternalFailure</Code><Message>down</Message></Error>";
    let error_response = || {
        http::Response::builder()
            .status(503)
            .body(error_body)
            .unwrap()
    };
    let conn = TestConnection::new(vec![
        (test_request(""), error_response()),
        (test_request(""), error_response()),
        (test_request(""), error_response()),
    ]);
    let client = test_client(conn.clone());

    let mut result = client.dispatch(test_request(""), context());
    let err = result.resolve().await.unwrap_err();
    match err {
        SdkError::Server { error, status } => {
            assert_eq!(Some("InternalFailure"), error.code());
            assert_eq!(&http::StatusCode::SERVICE_UNAVAILABLE, status);
        }
        other => panic!("expected a server error, got {:?}", other),
    }
    assert_eq!(3, conn.num_calls());
    conn.assert_drained();
}

#[tokio::test]
async fn mapped_error_codes_surface_as_typed_kinds() {
    let conn = TestConnection::new(vec![(
        test_request("{}"),
        http::Response::builder()
            .status(400)
            .body(r#"{"__type":"com.amazon.svc#ResourceNotFoundException","message":"no such table"}"#)
            .unwrap(),
    )]);
    let client = test_client(conn.clone());

    let context = context().map_exception(
        "ResourceNotFoundException",
        ExceptionKind::ResourceNotFound,
    );
    let mut result = client.dispatch(test_request("{}"), context);
    let err = result.resolve().await.unwrap_err();
    match err {
        SdkError::Client {
            error,
            status,
            kind,
        } => {
            assert_eq!(Some("ResourceNotFoundException"), error.code());
            assert_eq!(Some("no such table"), error.message());
            assert_eq!(&http::StatusCode::BAD_REQUEST, status);
            assert_eq!(&ExceptionKind::ResourceNotFound, kind);
        }
        other => panic!("expected a client error, got {:?}", other),
    }
    // a non-throttling 4xx is not retried
    assert_eq!(1, conn.num_calls());
}

#[tokio::test]
async fn unmapped_codes_fall_back_to_unmodeled() {
    let conn = TestConnection::new(vec![(
        test_request("{}"),
        http::Response::builder()
            .status(400)
            .body(r#"{"__type":"RandomError"}"#)
            .unwrap(),
    )]);
    let client = test_client(conn.clone());

    let mut result = client.dispatch(test_request("{}"), context());
    let err = result.resolve().await.unwrap_err();
    assert!(matches!(
        err,
        SdkError::Client {
            kind: ExceptionKind::Unmodeled,
            ..
        }
    ));
}

#[tokio::test]
async fn unrecognized_bodies_are_distinct_from_client_errors() {
    let conn = TestConnection::new(vec![(
        test_request(""),
        http::Response::builder()
            .status(400)
            .body("this is invalid")
            .unwrap(),
    )]);
    let client = test_client(conn.clone());

    let mut result = client.dispatch(test_request(""), context());
    let err = result.resolve().await.unwrap_err();
    match err {
        SdkError::UnparsableResponse { status, body } => {
            assert_eq!(&http::StatusCode::BAD_REQUEST, status);
            assert_eq!(b"this is invalid", body.as_ref());
        }
        other => panic!("expected an unparsable response, got {:?}", other),
    }
    assert_eq!(1, conn.num_calls());
}

#[tokio::test]
async fn resolution_happens_at_most_once() {
    let conn = TestConnection::new(vec![(
        test_request(""),
        http::Response::builder().status(200).body("once").unwrap(),
    )]);
    let client = test_client(conn.clone());

    let mut result = client.dispatch(test_request(""), context());
    result.resolve().await.expect("first resolve succeeds");
    result.resolve().await.expect("cached state is returned");
    result.status().await.expect("accessors reuse the cache");
    assert_eq!(1, conn.num_calls());
}

#[tokio::test]
async fn unknown_region_fails_before_any_network_call() {
    let conn = TestConnection::<&str>::new(vec![]);
    let client = test_client(conn.clone());

    let mut result = client.dispatch(test_request(""), context().region("moon-dark-1"));
    let err = result.resolve().await.unwrap_err();
    assert!(matches!(err, SdkError::UnsupportedRegion(region) if region.as_str() == "moon-dark-1"));
    assert_eq!(0, conn.num_calls());
}

/// A connector whose responses never arrive.
fn stalled_connector() -> DynConnector {
    DynConnector::new(tower::service_fn(|_req: http::Request<SdkBody>| async {
        std::future::pending::<Result<http::Response<SdkBody>, ConnectorError>>().await
    }))
}

fn stalled_client(timeout: Option<Duration>) -> Client {
    let mut builder = Config::builder()
        .region("us-east-1")
        .connector(stalled_connector())
        .credentials_provider(Credentials::from_keys("access_key", "secret_key", None))
        .retry_config(RetryConfig::default().with_max_retries(1));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Client::new(builder.build().expect("valid test config"))
}

#[tokio::test(start_paused = true)]
async fn per_request_timeout_surfaces_as_a_timeout_error() {
    let client = stalled_client(None);

    let mut result = client.dispatch(
        test_request(""),
        context().timeout(Duration::from_secs(5)),
    );
    let err = result.resolve().await.unwrap_err();
    match err {
        SdkError::Network(e) => assert!(e.is_timeout(), "expected a timeout, got {}", e),
        other => panic!("expected a network error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_applies_when_the_context_sets_none() {
    let client = stalled_client(Some(Duration::from_secs(2)));

    let mut result = client.dispatch(test_request(""), context());
    let err = result.resolve().await.unwrap_err();
    match err {
        SdkError::Network(e) => assert!(e.is_timeout(), "expected a timeout, got {}", e),
        other => panic!("expected a network error, got {:?}", other),
    }
}

#[tokio::test]
async fn cancelled_results_never_touch_the_wire() {
    let conn = TestConnection::new(vec![(
        test_request(""),
        http::Response::builder().status(200).body("").unwrap(),
    )]);
    let client = test_client(conn.clone());

    let mut result = client.dispatch(test_request(""), context());
    result.cancel();
    let err = result.resolve().await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(0, conn.num_calls());
}
