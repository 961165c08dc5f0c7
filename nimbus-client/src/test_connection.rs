/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! A mock transport for tests.
//!
//! A basic test connection. It will:
//! - Respond to requests with a preloaded series of responses
//! - Record requests for future examination
//!
//! For more complex use cases, see [Tower Test](https://docs.rs/tower-test).

use crate::body::SdkBody;
use crate::connector::ConnectorError;
use http::header::HeaderName;
use http::Request;
use std::future::Ready;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

type ConnectVec<B> = Vec<(http::Request<SdkBody>, http::Response<B>)>;

pub struct ValidateRequest {
    pub expected: http::Request<SdkBody>,
    pub actual: http::Request<SdkBody>,
}

impl ValidateRequest {
    pub fn assert_matches(&self, ignore_headers: &[HeaderName]) {
        let (actual, expected) = (&self.actual, &self.expected);
        for (name, value) in expected.headers() {
            if !ignore_headers.contains(name) {
                let actual_header = actual
                    .headers()
                    .get(name)
                    .unwrap_or_else(|| panic!("header {:?} missing", name));
                assert_eq!(actual_header, value, "header mismatch for {:?}", name);
            }
        }
        let actual_str = std::str::from_utf8(actual.body().bytes().unwrap_or(&[]));
        let expected_str = std::str::from_utf8(expected.body().bytes().unwrap_or(&[]));
        match (actual_str, expected_str) {
            (Ok(actual), Ok(expected)) => assert_eq!(actual, expected),
            _ => assert_eq!(actual.body().bytes(), expected.body().bytes()),
        };
        assert_eq!(actual.uri(), expected.uri());
    }
}

/// Replays a preloaded series of responses while recording the requests it
/// receives.
#[derive(Clone)]
pub struct TestConnection<B> {
    data: Arc<Mutex<ConnectVec<B>>>,
    requests: Arc<Mutex<Vec<ValidateRequest>>>,
}

impl<B> TestConnection<B> {
    pub fn new(mut data: ConnectVec<B>) -> Self {
        data.reverse();
        TestConnection {
            data: Arc::new(Mutex::new(data)),
            requests: Default::default(),
        }
    }

    pub fn requests(&self) -> impl Deref<Target = Vec<ValidateRequest>> + '_ {
        self.requests.lock().unwrap()
    }

    /// Number of requests dispatched so far.
    pub fn num_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Panics if any preloaded response was left unconsumed.
    pub fn assert_drained(&self) {
        assert!(
            self.data.lock().unwrap().is_empty(),
            "TestConnection had unconsumed responses"
        );
    }
}

impl<B: Into<SdkBody>> Service<http::Request<SdkBody>> for TestConnection<B> {
    type Response = http::Response<SdkBody>;
    type Error = ConnectorError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, actual: Request<SdkBody>) -> Self::Future {
        if let Some((expected, resp)) = self.data.lock().unwrap().pop() {
            self.requests
                .lock()
                .unwrap()
                .push(ValidateRequest { actual, expected });
            std::future::ready(Ok(resp.map(|body| body.into())))
        } else {
            std::future::ready(Err(ConnectorError::other("no more data")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TestConnection;
    use crate::body::SdkBody;
    use crate::connector::{ConnectorError, DynConnector};

    /// `TestConnection` must satisfy the bounds the client requires of a
    /// connector.
    #[test]
    fn meets_trait_bounds() {
        fn check() -> impl tower::Service<
            http::Request<SdkBody>,
            Response = http::Response<SdkBody>,
            Error = ConnectorError,
            Future = impl Send,
        > + Clone {
            TestConnection::<String>::new(vec![])
        }
        let _ = DynConnector::new(check());
    }

    #[tokio::test]
    async fn replays_and_records() {
        let conn = TestConnection::new(vec![(
            http::Request::new(SdkBody::from("request body")),
            http::Response::builder()
                .status(200)
                .body("response body")
                .unwrap(),
        )]);
        let connector = DynConnector::new(conn.clone());
        let response = connector
            .call(http::Request::new(SdkBody::from("request body")))
            .await
            .unwrap();
        assert_eq!(Some(&b"response body"[..]), response.body().bytes());
        assert_eq!(1, conn.num_calls());
        conn.requests()[0].assert_matches(&[]);
        conn.assert_drained();

        let err = connector
            .call(http::Request::new(SdkBody::empty()))
            .await
            .unwrap_err();
        assert!(!err.is_io());
    }
}
