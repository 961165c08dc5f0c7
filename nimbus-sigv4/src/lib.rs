/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Low-level SigV4 signing primitives.
//!
//! This crate implements AWS Signature Version 4: canonical request
//! construction, signing-key derivation, and the two signature carriers
//! (the `Authorization` header and presigned query parameters). It is pure:
//! given the same request, credentials, and timestamp it always produces the
//! same signature. Callers inject the timestamp, which keeps signing
//! deterministic under test.

pub mod http_request;
pub mod sign;

mod date_time;

pub use sign::SigningParams;

/// Container for the signature plus whatever artifact signing produced.
#[derive(Debug)]
pub struct SigningOutput<T> {
    output: T,
    signature: String,
}

impl<T> SigningOutput<T> {
    pub fn new(output: T, signature: String) -> Self {
        Self { output, signature }
    }

    pub fn output(&self) -> &T {
        &self.output
    }

    /// Returns the hex-encoded signature
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn into_parts(self) -> (T, String) {
        (self.output, self.signature)
    }
}
