/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Utilities to sign HTTP requests.

mod canonical_request;
mod error;
mod query_writer;
mod settings;
mod sign;
mod url_escape;

pub use error::SigningError;
pub use settings::{
    PayloadChecksumKind, SignatureLocation, SigningSettings, UriEncoding, MAX_PRESIGNED_EXPIRES,
};
pub use sign::{
    presign_request, sign, sign_request, SignableBody, SignableRequest, SigningInstructions,
};
