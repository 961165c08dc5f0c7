/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Narrow HTTP seam for providers that load credentials over the network.
//!
//! Metadata and STS providers only need "send one small request, read one
//! small response", so they depend on this trait instead of a full client.
//! The transport crate supplies a real implementation; tests supply canned
//! responses.

use crate::provider::BoxFuture;
use std::error::Error;

pub type FetchError = Box<dyn Error + Send + Sync + 'static>;

/// A minimal asynchronous HTTP transport.
pub trait FetchMetadata: Send + Sync {
    fn fetch<'a>(
        &'a self,
        request: http::Request<String>,
    ) -> BoxFuture<'a, Result<http::Response<String>, FetchError>>;
}
