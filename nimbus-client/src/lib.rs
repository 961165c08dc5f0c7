/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Dispatch core shared by every generated Nimbus service client.
//!
//! A [`Client`] owns an immutable [`Config`] (region, endpoint, credentials
//! provider, connector, retry policy). [`Client::dispatch`] takes a prepared
//! `http::Request<SdkBody>` plus a per-call [`RequestContext`] and returns a
//! lazy [`SendResult`]: no I/O happens until the result is first resolved, at
//! which point the client resolves credentials, signs with a fresh timestamp,
//! sends the request, and classifies failures for retry, once per attempt.
//!
//! ```no_run
//! use nimbus_client::{Client, Config, RequestContext, SdkBody};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder().region("us-east-1").build()?;
//! let client = Client::new(config);
//! let request = http::Request::builder()
//!     .method("POST")
//!     .uri("/")
//!     .header("x-amz-target", "DynamoDB_20120810.ListTables")
//!     .body(SdkBody::from("{}"))?;
//! let mut result = client.dispatch(request, RequestContext::new("dynamodb", "ListTables"));
//! let status = result.status().await.map_err(|e| e.to_string())?;
//! # Ok(())
//! # }
//! ```

pub mod aws_error;
pub mod body;
pub mod config;
pub mod connector;
pub mod endpoint;
pub mod error;
pub mod result;
pub mod retry;
pub mod test_connection;

pub use aws_error::AwsError;
pub use body::SdkBody;
pub use config::Config;
pub use connector::{ConnectorError, DynConnector};
pub use endpoint::{DiscoveredEndpoint, EndpointCache};
pub use error::{ExceptionKind, SdkError};
pub use result::SendResult;
pub use retry::RetryConfig;

use crate::body::read_body;
use crate::retry::{classify_response, ErrorKind, RetryCtx, StandardRetryStrategy};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use nimbus_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use nimbus_sigv4::SigningParams;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tracing::Instrument;

/// Per-call context attached by the generated client.
///
/// Carries the signing scope (service name plus optional region override),
/// the operation name for diagnostics, an optional per-request timeout, and
/// the operation's error-code-to-kind mapping.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    service: String,
    operation: String,
    region: Option<String>,
    timeout: Option<Duration>,
    exception_mapping: HashMap<&'static str, ExceptionKind>,
}

impl RequestContext {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        RequestContext {
            service: service.into(),
            operation: operation.into(),
            ..Default::default()
        }
    }

    /// Overrides the configured region for this call only.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Overrides the configured timeout for this call only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Maps a service error code to one of the closed set of error kinds.
    /// Unmapped codes surface as [`ExceptionKind::Unmodeled`].
    pub fn map_exception(mut self, code: &'static str, kind: ExceptionKind) -> Self {
        self.exception_mapping.insert(code, kind);
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// An AWS service client core.
///
/// Cheap to clone; clones share the credentials cache.
#[derive(Clone, Debug)]
pub struct Client {
    config: Config,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Client { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Queues `request` for dispatch and returns immediately.
    ///
    /// The returned [`SendResult`] performs the full resolve-sign-send-retry
    /// sequence the first time it is awaited, and exactly once.
    pub fn dispatch(
        &self,
        request: http::Request<SdkBody>,
        context: RequestContext,
    ) -> SendResult {
        let span = tracing::info_span!(
            "dispatch",
            service = %context.service,
            operation = %context.operation,
        );
        let config = self.config.clone();
        SendResult::new(Box::pin(
            send_with_retries(config, request, context).instrument(span),
        ))
    }
}

async fn send_with_retries(
    config: Config,
    request: http::Request<SdkBody>,
    context: RequestContext,
) -> Result<http::Response<Bytes>, SdkError> {
    let region = context
        .region
        .clone()
        .unwrap_or_else(|| config.region().to_string());
    let endpoint = endpoint::resolve_endpoint(config.endpoint(), &context.service, &region)?;
    let timeout = context.timeout.or_else(|| config.timeout());
    let retry_ctx = Arc::new(Mutex::new(RetryCtx::new(config.retry_config().clone())));
    let mut strategy = StandardRetryStrategy::new(retry_ctx);
    // streaming bodies cannot be replayed, so they get exactly one attempt
    let replayable = request.body().try_clone().is_some();
    let mut template = Some(request);

    loop {
        let mut attempt = match template.as_ref().and_then(try_clone_request) {
            Some(clone) => clone,
            None => template
                .take()
                .ok_or_else(|| SdkError::construction("request was already consumed"))?,
        };
        *attempt.uri_mut() = endpoint::apply_endpoint(attempt.uri(), &endpoint)
            .map_err(SdkError::construction)?;

        let credentials = config
            .credentials_provider()
            .provide_credentials()
            .await
            .map_err(SdkError::MissingCredentials)?;
        if !credentials.is_anonymous() {
            sign_attempt(&mut attempt, &credentials, &region, &context.service)?;
        }

        let connector = config.connector().clone();
        let result = match timeout {
            Some(duration) => match tokio::time::timeout(duration, connector.call(attempt)).await
            {
                Ok(result) => result,
                Err(_) => Err(ConnectorError::timeout(duration)),
            },
            None => connector.call(attempt).await,
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                // transport errors carry no response to classify; they are
                // always transient
                let retry = if replayable {
                    strategy.do_retry(Err(ErrorKind::TransientError))
                } else {
                    None
                };
                match retry {
                    Some((next, backoff)) => {
                        tracing::debug!(error = %err, backoff = ?backoff, "retrying after transport error");
                        tokio::time::sleep(backoff).await;
                        strategy = next;
                        continue;
                    }
                    None => return Err(SdkError::Network(err)),
                }
            }
        };

        let (parts, body) = response.into_parts();
        let body = read_body(body)
            .await
            .map_err(|e| SdkError::Network(ConnectorError::io(e)))?;
        if parts.status.is_success() || parts.status.is_redirection() {
            let _ = strategy.do_retry(Ok(()));
            return Ok(http::Response::from_parts(parts, body));
        }

        let kind = classify_response(parts.status, &parts.headers, &body);
        let retry = if replayable {
            strategy.on_response(kind)
        } else {
            None
        };
        match retry {
            Some((next, backoff)) => {
                tracing::debug!(
                    status = %parts.status,
                    backoff = ?backoff,
                    "retrying after error response"
                );
                tokio::time::sleep(backoff).await;
                strategy = next;
            }
            None => return Err(error_response(parts.status, &parts.headers, body, &context)),
        }
    }
}

fn sign_attempt(
    request: &mut http::Request<SdkBody>,
    credentials: &nimbus_credentials::Credentials,
    region: &str,
    service: &str,
) -> Result<(), SdkError> {
    let params = SigningParams::builder()
        .access_key(credentials.access_key_id())
        .secret_key(credentials.secret_access_key())
        .security_token(credentials.session_token())
        .region(region)
        .service_name(service)
        .time(SystemTime::now())
        .settings(SigningSettings::default())
        .build()
        .map_err(SdkError::construction)?;
    let signable_body = match request.body().bytes() {
        Some(bytes) => SignableBody::Bytes(bytes),
        None => SignableBody::UnsignedPayload,
    };
    let instructions = {
        let signable = SignableRequest::new(
            request.method(),
            request.uri(),
            request.headers(),
            signable_body,
        );
        sign(signable, &params)
            .map_err(SdkError::construction)?
            .into_parts()
            .0
    };
    instructions.apply_to_request(request);
    Ok(())
}

fn error_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
    context: &RequestContext,
) -> SdkError {
    match aws_error::parse_aws_error(headers, &body) {
        Ok(error) if status.is_server_error() => SdkError::Server { error, status },
        Ok(error) => {
            let kind = error
                .code()
                .and_then(|code| context.exception_mapping.get(code))
                .copied()
                .unwrap_or(ExceptionKind::Unmodeled);
            SdkError::Client {
                error,
                status,
                kind,
            }
        }
        Err(_) => SdkError::UnparsableResponse { status, body },
    }
}

fn try_clone_request(request: &http::Request<SdkBody>) -> Option<http::Request<SdkBody>> {
    let body = request.body().try_clone()?;
    let mut clone = http::Request::builder()
        .uri(request.uri().clone())
        .method(request.method().clone());
    if let Some(headers) = clone.headers_mut() {
        *headers = request.headers().clone();
    }
    clone.body(body).ok()
}
