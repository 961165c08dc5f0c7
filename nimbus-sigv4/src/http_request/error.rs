/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use http::header::InvalidHeaderValue;
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Errors raised while constructing or applying a signature.
#[derive(Debug)]
#[non_exhaustive]
pub enum SigningError {
    /// A signed header value contained characters that are not legal in an HTTP header.
    InvalidHeaderValue(InvalidHeaderValue),

    /// The request URI had no authority to derive a `host` header from.
    MissingAuthority,

    /// A presigned request was built without `expires_in`, or the window
    /// exceeded the SigV4 maximum.
    InvalidExpiry(Option<Duration>),
}

impl fmt::Display for SigningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningError::InvalidHeaderValue(_) => {
                write!(f, "a signed header was not a valid HTTP header value")
            }
            SigningError::MissingAuthority => {
                write!(f, "request URI must have an authority to be signed")
            }
            SigningError::InvalidExpiry(None) => {
                write!(f, "presigned requests require `expires_in` to be set")
            }
            SigningError::InvalidExpiry(Some(d)) => {
                write!(f, "presigned expiry of {}s exceeds the maximum", d.as_secs())
            }
        }
    }
}

impl Error for SigningError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SigningError::InvalidHeaderValue(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InvalidHeaderValue> for SigningError {
    fn from(err: InvalidHeaderValue) -> Self {
        SigningError::InvalidHeaderValue(err)
    }
}
