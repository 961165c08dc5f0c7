/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The client-wide error taxonomy.
//!
//! Callers match on [`SdkError`] to tell "the network failed" apart from "AWS
//! rejected the request" apart from "we could not understand the response".

use crate::aws_error::AwsError;
use crate::connector::ConnectorError;
use http::StatusCode;
use nimbus_credentials::provider::CredentialsError;

/// A closed set of error tags the caller can exhaustively match on.
///
/// Operations supply a code-to-kind mapping through
/// [`RequestContext::exception_mapping`](crate::RequestContext); service error
/// codes with no mapping fall back to [`ExceptionKind::Unmodeled`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ExceptionKind {
    Throttling,
    AccessDenied,
    ResourceNotFound,
    ResourceConflict,
    Validation,
    LimitExceeded,
    ServiceUnavailable,
    /// No mapping was supplied for this error code.
    Unmodeled,
}

/// Failure of a client operation.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// The request could not be constructed before dispatch (signing failed,
    /// the body was not replayable, etc.)
    #[error("failed to construct request: {0}")]
    ConstructionFailure(Box<dyn std::error::Error + Send + Sync>),

    /// Transport-level failure before any HTTP response was obtained.
    /// Always eligible for retry.
    #[error("network error: {0}")]
    Network(#[source] ConnectorError),

    /// The service answered with a 4xx error response.
    #[error("client error ({status}): {error}")]
    Client {
        error: AwsError,
        status: StatusCode,
        kind: ExceptionKind,
    },

    /// The service answered with a 5xx error response.
    #[error("server error ({status}): {error}")]
    Server { error: AwsError, status: StatusCode },

    /// The error response body matched no recognized envelope, so the caller
    /// can distinguish "AWS told us something was wrong" from "we don't
    /// understand what AWS said".
    #[error("unparsable error response (status {status})")]
    UnparsableResponse { status: StatusCode, body: bytes::Bytes },

    /// No provider in the credentials chain yielded usable credentials.
    #[error("no credentials available: {0}")]
    MissingCredentials(#[source] CredentialsError),

    /// No endpoint is known for the configured region and no override was set.
    #[error("no known endpoint for region `{0}`")]
    UnsupportedRegion(String),

    /// The in-flight request was cancelled before it resolved.
    #[error("request was cancelled")]
    Cancelled,
}

impl SdkError {
    pub(crate) fn construction(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        SdkError::ConstructionFailure(source.into())
    }

    /// The parsed service error, when the failure carries one.
    pub fn aws_error(&self) -> Option<&AwsError> {
        match self {
            SdkError::Client { error, .. } | SdkError::Server { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SdkError::Cancelled)
    }
}

#[cfg(test)]
mod test {
    use super::{ExceptionKind, SdkError};
    use crate::connector::ConnectorError;
    use std::time::Duration;

    #[test]
    fn errors_display_their_category() {
        let err = SdkError::Network(ConnectorError::timeout(Duration::from_secs(5)));
        assert!(format!("{}", err).starts_with("network error"));
        let err = SdkError::UnsupportedRegion("moon-dark-1".to_string());
        assert_eq!("no known endpoint for region `moon-dark-1`", format!("{}", err));
    }

    #[test]
    fn exception_kinds_are_matchable() {
        // closed set: callers switch on the tag, not on a class name
        let kind = ExceptionKind::Throttling;
        let retryable = matches!(kind, ExceptionKind::Throttling | ExceptionKind::ServiceUnavailable);
        assert!(retryable);
    }
}
