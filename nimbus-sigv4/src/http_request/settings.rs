/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::time::Duration;

/// Presigned URLs are valid for at most one week.
pub const MAX_PRESIGNED_EXPIRES: Duration = Duration::from_secs(7 * 24 * 3600);

/// HTTP signing settings
///
/// These alter the behavior of signing for a given service without requiring a
/// separate signer implementation. S3, for example, signs with
/// `UriEncoding::Single` and `PayloadChecksumKind::XAmzSha256`; every other
/// service uses the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct SigningSettings {
    /// Specifies how to encode the request URL when signing. Some services do not decode
    /// the path prior to checking the signature, requiring clients to actually _double-encode_
    /// the URI in creating the canonical request in order to pass a signature check.
    pub uri_encoding: UriEncoding,

    /// Add an additional checksum header
    pub payload_checksum_kind: PayloadChecksumKind,

    /// Where to put the signature
    pub signature_location: SignatureLocation,

    /// For presigned requests, how long the URL is valid
    pub expires_in: Option<Duration>,
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            uri_encoding: UriEncoding::Double,
            payload_checksum_kind: PayloadChecksumKind::NoHeader,
            signature_location: SignatureLocation::Headers,
            expires_in: None,
        }
    }
}

/// Config value to specify how to encode the request URL when signing.
///
/// We assume the URI will be encoded _once_ prior to transmission. Some services
/// do not decode the path prior to checking the signature, requiring clients to actually
/// _double-encode_ the URI in creating the canonical request in order to pass a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriEncoding {
    /// Re-encode the resulting URL (e.g. %30 becomes `%2530`)
    Double,

    /// Take the resulting URL as-is
    Single,
}

/// Config value to specify whether to add the `x-amz-content-sha256` header to
/// the signed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadChecksumKind {
    /// Add the payload checksum as a header. S3 requires this on write operations.
    XAmzSha256,

    /// Do not add a payload checksum header; the checksum is still part of the
    /// canonical request.
    NoHeader,
}

/// Where to place the signature in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureLocation {
    /// Place the signature in the request headers (`Authorization`)
    Headers,

    /// Place the signature in the query string (presigned URLs)
    QueryParams,
}
