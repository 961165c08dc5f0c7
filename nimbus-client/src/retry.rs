/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Retry classification and the standard retry strategy.
//!
//! Classification decides whether a given response is worth retrying, in order
//! of priority:
//! 1. The `x-amz-retry-after` header is checked
//! 2. The status code is checked (429 throttles, 5xx server errors, 408)
//! 3. The error code parsed from the body is checked against a predetermined
//!    list of throttling and transient error codes
//!
//! The strategy decides whether a retry is *allowed*: attempts are bounded by
//! `max_retries`, and each retry spends from a shared token quota that only
//! successful responses pay back. Backoff is exponential on a jittered base,
//! capped by `max_backoff`.

use crate::aws_error::parse_aws_error;
use http::{HeaderMap, StatusCode};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const THROTTLING_ERRORS: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottledException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "TransactionInProgressException",
    "RequestLimitExceeded",
    "BandwidthLimitExceeded",
    "LimitExceededException",
    "RequestThrottled",
    "SlowDown",
    "PriorRequestNotComplete",
    "EC2ThrottledException",
];
const TRANSIENT_ERRORS: &[&str] = &["RequestTimeout", "RequestTimeoutException"];

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ErrorKind {
    /// Connection level error such as a socket timeout, socket connect error,
    /// or TLS negotiation timeout.
    TransientError,

    /// The server explicitly told the client to back off, such as a 429 or a
    /// throttling error code in the body.
    ThrottlingError,

    /// Server error that isn't explicitly throttling but is considered by the
    /// client to be something that should be retried.
    ServerError,
}

#[derive(Debug, Eq, PartialEq)]
pub enum RetryKind {
    /// Retry due to a specific `ErrorKind`.
    Error(ErrorKind),

    /// An explicit retry with a server-suggested delay (`x-amz-retry-after`).
    ///
    /// The suggestion may still be ignored: no retry tokens available, or the
    /// duration exceeds the maximum backoff configured by the client.
    Explicit(Duration),

    /// This response should not be retried.
    NotRetryable,

    /// A 4xx with an empty body: there is no evidence either way. Policy
    /// decides; the standard strategy does not retry these.
    Indeterminate,
}

/// Classifies an error response.
///
/// `status` is assumed to be an error status; success responses classify as
/// [`RetryKind::NotRetryable`].
pub fn classify_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> RetryKind {
    if let Some(retry_after_delay) = headers
        .get("x-amz-retry-after")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.parse::<u64>().ok())
    {
        return RetryKind::Explicit(Duration::from_millis(retry_after_delay));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return RetryKind::Error(ErrorKind::ThrottlingError);
    }
    if status.is_server_error() {
        return RetryKind::Error(ErrorKind::ServerError);
    }
    if status == StatusCode::REQUEST_TIMEOUT {
        return RetryKind::Error(ErrorKind::TransientError);
    }
    if status.is_client_error() {
        if body.is_empty() {
            return RetryKind::Indeterminate;
        }
        // throttling can hide behind a 4xx, so the body is parsed even on
        // error paths
        if let Some(code) = parse_aws_error(headers, body)
            .ok()
            .and_then(|e| e.code().map(str::to_string))
        {
            if THROTTLING_ERRORS.contains(&code.as_str()) {
                return RetryKind::Error(ErrorKind::ThrottlingError);
            }
            if TRANSIENT_ERRORS.contains(&code.as_str()) {
                return RetryKind::Error(ErrorKind::TransientError);
            }
        }
    }
    RetryKind::NotRetryable
}

#[derive(Clone)]
pub struct RetryConfig {
    initial_retry_tokens: usize,
    retry_cost: usize,
    no_retry_increment: usize,
    timeout_retry_cost: usize,
    max_retries: u32,
    max_backoff: Duration,
    base: fn() -> f64,
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// For deterministic tests, use a static base instead of a random base for
    /// exponential backoff.
    pub fn with_static_base(mut self, base: fn() -> f64) -> Self {
        self.base = base;
        self
    }

    pub fn with_initial_retry_tokens(mut self, tokens: usize) -> Self {
        self.initial_retry_tokens = tokens;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_retry_tokens: INITIAL_RETRY_TOKENS,
            retry_cost: RETRY_COST,
            no_retry_increment: 1,
            timeout_retry_cost: 10,
            max_retries: MAX_RETRIES,
            max_backoff: Duration::from_secs(20),
            // by default, use a random base for exponential backoff
            base: fastrand::f64,
        }
    }
}

const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_TOKENS: usize = 500;
const RETRY_COST: usize = 5;

/// StandardRetryStrategy
///
/// `ctx` captures cross-request retry state, whereas `attempts` captures retry
/// state local to this request
#[derive(Clone)]
pub(crate) struct StandardRetryStrategy {
    attempts: u32,
    ctx: Arc<Mutex<RetryCtx>>,
}

impl StandardRetryStrategy {
    pub(crate) fn new(ctx: Arc<Mutex<RetryCtx>>) -> Self {
        Self { attempts: 0, ctx }
    }

    #[cfg(test)]
    pub(crate) fn ctx(&self) -> MutexGuard<'_, RetryCtx> {
        self.ctx.lock().unwrap()
    }

    fn lock_ctx(&self) -> MutexGuard<'_, RetryCtx> {
        match self.ctx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Applies a classification to this strategy: `None` means give up and
    /// surface the result, `Some((next, backoff))` means sleep for `backoff`
    /// and retry with `next`.
    pub(crate) fn on_response(&self, kind: RetryKind) -> Option<(Self, Duration)> {
        match kind {
            // server-suggested delays skip the quota but still count attempts
            // and honor the backoff ceiling
            RetryKind::Explicit(delay) => {
                let ctx = self.lock_ctx();
                // `+ 1` instead of `max_retries - 1`: the bound must also
                // hold for a zero-retry configuration
                if self.attempts + 1 >= ctx.config.max_retries {
                    return None;
                }
                let delay = delay.min(ctx.config.max_backoff);
                drop(ctx);
                let mut next = self.clone();
                next.attempts += 1;
                Some((next, delay))
            }
            RetryKind::Error(kind) => self.do_retry(Err(kind)),
            RetryKind::NotRetryable | RetryKind::Indeterminate => None,
        }
    }

    pub(crate) fn do_retry(&self, result: Result<(), ErrorKind>) -> Option<(Self, Duration)> {
        let mut ctx = self.lock_ctx();
        let can_retry = match result {
            Ok(_) => {
                ctx.retry_quota_release();
                return None;
            }
            Err(e) => {
                if self.attempts + 1 >= ctx.config.max_retries {
                    return None;
                }
                ctx.get_retry_quota(e)
            }
        };
        if !can_retry {
            return None;
        }
        let b = (ctx.config.base)();
        let r: i32 = 2;
        let backoff = b * (r.pow(self.attempts) as f64);
        let backoff = Duration::from_secs_f64(backoff).min(ctx.config.max_backoff);
        let mut next = self.clone();
        next.attempts += 1;
        Some((next, backoff))
    }
}

pub(crate) struct RetryCtx {
    pub(crate) retry_quota: usize,
    last_retry: Option<usize>,
    config: RetryConfig,
}

impl RetryCtx {
    pub(crate) fn new(config: RetryConfig) -> Self {
        RetryCtx {
            retry_quota: config.initial_retry_tokens,
            last_retry: None,
            config,
        }
    }

    fn retry_quota_release(&mut self) {
        self.retry_quota += self.last_retry.unwrap_or(self.config.no_retry_increment);
    }

    fn get_retry_quota(&mut self, err: ErrorKind) -> bool {
        let retry_cost = if err == ErrorKind::TransientError {
            self.config.timeout_retry_cost
        } else {
            self.config.retry_cost
        };
        if retry_cost > self.retry_quota {
            false
        } else {
            self.last_retry = Some(retry_cost);
            self.retry_quota -= retry_cost;
            true
        }
    }
}

#[cfg(test)]
mod test {
    use super::{classify_response, ErrorKind, RetryConfig, RetryCtx, RetryKind, StandardRetryStrategy};
    use http::{HeaderMap, StatusCode};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn classify(status: u16, body: &[u8]) -> RetryKind {
        classify_response(
            StatusCode::from_u16(status).unwrap(),
            &HeaderMap::new(),
            body,
        )
    }

    #[test]
    fn classify_by_response_status() {
        assert_eq!(RetryKind::NotRetryable, classify(200, b""));
        assert_eq!(
            RetryKind::Error(ErrorKind::ThrottlingError),
            classify(429, b"")
        );
        assert_eq!(
            RetryKind::Error(ErrorKind::ServerError),
            classify(503, b"")
        );
        assert_eq!(
            RetryKind::Error(ErrorKind::TransientError),
            classify(408, b"")
        );
    }

    #[test]
    fn classify_by_error_code() {
        assert_eq!(
            RetryKind::Error(ErrorKind::ThrottlingError),
            classify(400, br#"{"__type":"RequestLimitExceeded"}"#)
        );
        assert_eq!(
            RetryKind::Error(ErrorKind::ThrottlingError),
            classify(
                400,
                b"<Error><Code>ProvisionedThroughputExceededException</Code></Error>"
            )
        );
        assert_eq!(
            RetryKind::Error(ErrorKind::TransientError),
            classify(400, br#"{"__type":"RequestTimeoutException"}"#)
        );
        assert_eq!(
            RetryKind::NotRetryable,
            classify(400, br#"{"__type":"RandomError"}"#)
        );
    }

    #[test]
    fn unparseable_bodies_do_not_retry() {
        assert_eq!(RetryKind::NotRetryable, classify(400, b"this is invalid"));
    }

    #[test]
    fn empty_body_is_indeterminate() {
        assert_eq!(RetryKind::Indeterminate, classify(400, b""));
        // and the standard strategy declines to retry on no evidence
        let ctx = Arc::new(Mutex::new(RetryCtx::new(RetryConfig::default())));
        let strategy = StandardRetryStrategy::new(ctx);
        assert!(strategy.on_response(RetryKind::Indeterminate).is_none());
    }

    #[test]
    fn retry_after_header_is_explicit() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-retry-after", "5000".parse().unwrap());
        assert_eq!(
            RetryKind::Explicit(Duration::from_millis(5000)),
            classify_response(StatusCode::SERVICE_UNAVAILABLE, &headers, b"")
        );
    }

    fn test_strategy(config: RetryConfig) -> StandardRetryStrategy {
        let ctx = RetryCtx::new(config.with_static_base(|| 1_f64));
        StandardRetryStrategy::new(Arc::new(Mutex::new(ctx)))
    }

    #[test]
    fn eventual_success() {
        let strategy = test_strategy(RetryConfig::default());
        let (strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(1));
        assert_eq!(strategy.ctx().retry_quota, 495);

        let (strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(2));
        assert_eq!(strategy.ctx().retry_quota, 490);

        let no_retry = strategy.do_retry(Ok(()));
        assert!(no_retry.is_none());
        assert_eq!(strategy.ctx().retry_quota, 495);
    }

    #[test]
    fn no_more_attempts() {
        let strategy = test_strategy(RetryConfig::default());
        let (strategy, _) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        let (strategy, _) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        let no_retry = strategy.do_retry(Err(ErrorKind::ServerError));
        assert!(no_retry.is_none());
        assert_eq!(strategy.ctx().retry_quota, 490);
    }

    #[test]
    fn no_quota() {
        let strategy = test_strategy(RetryConfig::default().with_initial_retry_tokens(5));
        let (strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(1));
        assert_eq!(strategy.ctx().retry_quota, 0);
        let no_retry = strategy.do_retry(Err(ErrorKind::ServerError));
        assert!(no_retry.is_none());
        assert_eq!(strategy.ctx().retry_quota, 0);
    }

    #[test]
    fn transient_errors_cost_more() {
        let strategy = test_strategy(RetryConfig::default());
        let (strategy, _) = strategy
            .do_retry(Err(ErrorKind::TransientError))
            .expect("should retry");
        assert_eq!(strategy.ctx().retry_quota, 490);
    }

    #[test]
    fn backoff_timing() {
        let strategy = test_strategy(RetryConfig::default().with_max_retries(5));
        let (strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(1));
        let (strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(2));
        let (strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(4));
        let (strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(8));
        let no_retry = strategy.do_retry(Err(ErrorKind::ServerError));
        assert!(no_retry.is_none());
        assert_eq!(strategy.ctx().retry_quota, 480);
    }

    #[test]
    fn max_backoff_time() {
        let strategy = test_strategy(
            RetryConfig::default()
                .with_max_retries(5)
                .with_max_backoff(Duration::from_secs(3)),
        );
        let (strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(1));
        let (strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(2));
        let (strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(3));
        let (_strategy, dur) = strategy
            .do_retry(Err(ErrorKind::ServerError))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(3));
    }

    #[test]
    fn zero_max_retries_never_retries() {
        let strategy = test_strategy(RetryConfig::default().with_max_retries(0));
        assert!(strategy.do_retry(Err(ErrorKind::ServerError)).is_none());
        assert!(strategy
            .on_response(RetryKind::Explicit(Duration::from_secs(1)))
            .is_none());
        assert_eq!(strategy.ctx().retry_quota, 500);
    }

    #[test]
    fn explicit_retries_skip_the_quota() {
        let strategy = test_strategy(RetryConfig::default());
        let (strategy, dur) = strategy
            .on_response(RetryKind::Explicit(Duration::from_millis(1500)))
            .expect("should retry");
        assert_eq!(dur, Duration::from_millis(1500));
        assert_eq!(strategy.ctx().retry_quota, 500);
        // still clamped by the backoff ceiling
        let (strategy, dur) = strategy
            .on_response(RetryKind::Explicit(Duration::from_secs(90)))
            .expect("should retry");
        assert_eq!(dur, Duration::from_secs(20));
        // and still bounded by max_retries
        assert!(strategy
            .on_response(RetryKind::Explicit(Duration::from_secs(1)))
            .is_none());
    }
}
