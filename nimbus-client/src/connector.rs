/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The connector seam: anything that can turn an `http::Request<SdkBody>` into
//! an `http::Response<SdkBody>`.

use crate::body::SdkBody;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tower::util::BoxCloneService;
use tower::{Service, ServiceExt};

type BoxError = Box<dyn Error + Send + Sync>;

/// An error occurring at the transport layer, before an HTTP response was
/// received.
#[derive(Debug, thiserror::Error)]
#[error("{kind} while dispatching request: {source}")]
pub struct ConnectorError {
    kind: ConnectorErrorKind,
    #[source]
    source: BoxError,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ConnectorErrorKind {
    /// Socket-level failure: connect refused, reset, DNS, TLS negotiation
    Io,
    /// The request did not complete within the allowed time
    Timeout,
    Other,
}

impl fmt::Display for ConnectorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorErrorKind::Io => write!(f, "io error"),
            ConnectorErrorKind::Timeout => write!(f, "timeout"),
            ConnectorErrorKind::Other => write!(f, "connector error"),
        }
    }
}

impl ConnectorError {
    pub fn io(source: impl Into<BoxError>) -> Self {
        ConnectorError {
            kind: ConnectorErrorKind::Io,
            source: source.into(),
        }
    }

    pub fn timeout(duration: Duration) -> Self {
        ConnectorError {
            kind: ConnectorErrorKind::Timeout,
            source: format!("no response after {:?}", duration).into(),
        }
    }

    pub fn other(source: impl Into<BoxError>) -> Self {
        ConnectorError {
            kind: ConnectorErrorKind::Other,
            source: source.into(),
        }
    }

    pub fn is_io(&self) -> bool {
        self.kind == ConnectorErrorKind::Io
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ConnectorErrorKind::Timeout
    }
}

/// A type-erased, cloneable connector.
///
/// Wraps any [`tower::Service`] with the right request/response types, erasing
/// the concrete type so the client does not need to be generic over its
/// transport.
#[derive(Clone)]
pub struct DynConnector(
    BoxCloneService<http::Request<SdkBody>, http::Response<SdkBody>, ConnectorError>,
);

impl fmt::Debug for DynConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynConnector").finish()
    }
}

impl DynConnector {
    pub fn new<S, E>(service: S) -> Self
    where
        S: Service<http::Request<SdkBody>, Response = http::Response<SdkBody>, Error = E>
            + Clone
            + Send
            + 'static,
        E: Into<ConnectorError>,
        S::Future: Send + 'static,
    {
        DynConnector(BoxCloneService::new(service.map_err(|e| e.into())))
    }

    pub fn call(
        &self,
        request: http::Request<SdkBody>,
    ) -> impl Future<Output = Result<http::Response<SdkBody>, ConnectorError>> {
        self.0.clone().oneshot(request)
    }
}

/// Returns the default connector: hyper with TLS.
#[cfg(feature = "native-tls")]
pub fn default_connector() -> DynConnector {
    let https = hyper_tls::HttpsConnector::new();
    let client = hyper::Client::builder().build::<_, SdkBody>(https);
    DynConnector::new(HyperAdapter(client))
}

/// Adapts a `hyper::Client` to the connector interface by converting response
/// bodies and translating hyper errors into [`ConnectorError`].
#[cfg(feature = "native-tls")]
#[derive(Clone)]
struct HyperAdapter(
    hyper::Client<hyper_tls::HttpsConnector<hyper::client::HttpConnector>, SdkBody>,
);

#[cfg(feature = "native-tls")]
impl Service<http::Request<SdkBody>> for HyperAdapter {
    type Response = http::Response<SdkBody>;
    type Error = ConnectorError;
    type Future = std::pin::Pin<
        Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.0.poll_ready(cx).map_err(hyper_error)
    }

    fn call(&mut self, req: http::Request<SdkBody>) -> Self::Future {
        let fut = self.0.call(req);
        Box::pin(async move {
            let response = fut.await.map_err(hyper_error)?;
            Ok(response.map(SdkBody::from))
        })
    }
}

#[cfg(feature = "native-tls")]
fn hyper_error(err: hyper::Error) -> ConnectorError {
    if err.is_timeout() {
        // hyper surfaces its own internal timeouts distinctly from io failures
        ConnectorError {
            kind: ConnectorErrorKind::Timeout,
            source: err.into(),
        }
    } else if err.is_connect() || err.is_closed() || err.is_incomplete_message() {
        ConnectorError::io(err)
    } else {
        ConnectorError::other(err)
    }
}

#[cfg(test)]
mod test {
    use super::{ConnectorError, DynConnector};
    use crate::body::SdkBody;
    use std::time::Duration;
    use tower::service_fn;

    #[test]
    fn error_kinds() {
        assert!(ConnectorError::timeout(Duration::from_secs(1)).is_timeout());
        assert!(ConnectorError::io("reset").is_io());
        assert!(!ConnectorError::other("?").is_io());
    }

    #[tokio::test]
    async fn erased_connector_dispatches() {
        let conn = DynConnector::new(service_fn(|_req: http::Request<SdkBody>| async {
            Ok::<_, ConnectorError>(http::Response::new(SdkBody::from("ok")))
        }));
        let response = conn
            .call(http::Request::new(SdkBody::empty()))
            .await
            .unwrap();
        assert_eq!(Some(&b"ok"[..]), response.body().bytes());
    }
}
