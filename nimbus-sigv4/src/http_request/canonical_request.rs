/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::date_time::{format_date, format_date_time};
use crate::http_request::error::SigningError;
use crate::http_request::settings::{PayloadChecksumKind, SignatureLocation, UriEncoding};
use crate::http_request::sign::{SignableBody, SignableRequest};
use crate::http_request::url_escape::percent_encode;
use crate::sign::{sha256_hex_string, SigningParams};
use http::header::{HeaderName, HOST, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, Uri};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

pub(crate) const HMAC_256: &str = "AWS4-HMAC-SHA256";
pub(crate) const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";
pub(crate) const X_AMZ_DATE: &str = "x-amz-date";
pub(crate) const X_AMZ_CONTENT_SHA_256: &str = "x-amz-content-sha256";

pub(crate) mod param {
    pub(crate) const X_AMZ_ALGORITHM: &str = "X-Amz-Algorithm";
    pub(crate) const X_AMZ_CREDENTIAL: &str = "X-Amz-Credential";
    pub(crate) const X_AMZ_DATE: &str = "X-Amz-Date";
    pub(crate) const X_AMZ_EXPIRES: &str = "X-Amz-Expires";
    pub(crate) const X_AMZ_SECURITY_TOKEN: &str = "X-Amz-Security-Token";
    pub(crate) const X_AMZ_SIGNED_HEADERS: &str = "X-Amz-SignedHeaders";
    pub(crate) const X_AMZ_SIGNATURE: &str = "X-Amz-Signature";
}

const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

#[derive(Debug, PartialEq)]
pub(crate) struct CanonicalRequest<'a> {
    pub(crate) method: &'a Method,
    pub(crate) path: String,
    pub(crate) params: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) signed_headers: SignedHeaders,
    pub(crate) date_time: String,
    pub(crate) security_token: Option<&'a str>,
    pub(crate) content_sha256: Cow<'a, str>,
}

impl<'a> CanonicalRequest<'a> {
    /// Construct a `CanonicalRequest` from a [`SignableRequest`] and signing parameters.
    ///
    /// ## Behavior
    /// There are several settings which alter canonicalization:
    /// - If a security token is present in `params` it is included in the signed headers
    ///   (header signatures only; presigned URLs carry it as a query parameter instead)
    /// - If `settings.uri_encoding` specifies double encoding, `%` in the path is re-encoded
    ///   as `%25`
    /// - If `settings.payload_checksum_kind` is `XAmzSha256`, an `x-amz-content-sha256`
    ///   header with the body checksum is added. This is the same checksum used as the
    ///   payload hash in the canonical request
    /// - Presigned requests (`SignatureLocation::QueryParams`) force an unsigned payload
    ///   and place the `X-Amz-*` signing parameters in the canonical query string
    pub(crate) fn from<'b>(
        req: &'b SignableRequest<'b>,
        params: &'b SigningParams<'b>,
    ) -> Result<CanonicalRequest<'b>, SigningError> {
        let settings = &params.settings;
        // A query-string signature must carry `X-Amz-Expires`; the settings
        // are freely constructible, so this cannot be left to `presign_request`
        if settings.signature_location == SignatureLocation::QueryParams
            && settings.expires_in.is_none()
        {
            return Err(SigningError::InvalidExpiry(None));
        }
        // The string is already URI encoded; double-encoding re-encodes only `%`
        let path = req.uri().path();
        let path = match settings.uri_encoding {
            UriEncoding::Double => path.replace('%', "%25"),
            UriEncoding::Single => path.to_string(),
        };
        let payload_hash = match settings.signature_location {
            SignatureLocation::Headers => Self::payload_hash(req.body()),
            // The body of a presigned request cannot be known when the URL is built
            SignatureLocation::QueryParams => Cow::Borrowed(UNSIGNED_PAYLOAD),
        };

        let date_time = format_date_time(params.time);
        let security_token = match settings.signature_location {
            SignatureLocation::Headers => params.security_token,
            SignatureLocation::QueryParams => None,
        };
        let (signed_headers, canonical_headers) =
            Self::headers(req, params, &payload_hash, &date_time, security_token)?;
        let signed_headers = SignedHeaders::new(signed_headers);
        let creq_params = Self::params(req.uri(), params, &date_time, &signed_headers);
        Ok(CanonicalRequest {
            method: req.method(),
            path,
            params: creq_params,
            headers: canonical_headers,
            signed_headers,
            date_time,
            security_token,
            content_sha256: payload_hash,
        })
    }

    fn headers(
        req: &SignableRequest<'_>,
        params: &SigningParams<'_>,
        payload_hash: &str,
        date_time: &str,
        security_token: Option<&str>,
    ) -> Result<(Vec<CanonicalHeaderName>, HeaderMap), SigningError> {
        // The canonical request includes headers not present in the input: the
        // headers are cloned from the original request, then `host`,
        // `x-amz-date`, and optionally `x-amz-security-token` and
        // `x-amz-content-sha256` are added.
        let mut canonical_headers = req.headers().clone();
        Self::insert_host_header(&mut canonical_headers, req.uri())?;

        if params.settings.signature_location == SignatureLocation::Headers {
            Self::insert_date_header(&mut canonical_headers, date_time);

            if let Some(security_token) = security_token {
                let mut sec_header = HeaderValue::from_str(security_token)?;
                sec_header.set_sensitive(true);
                canonical_headers.insert(X_AMZ_SECURITY_TOKEN, sec_header);
            }

            if params.settings.payload_checksum_kind == PayloadChecksumKind::XAmzSha256 {
                let header = HeaderValue::from_str(payload_hash)?;
                canonical_headers.insert(X_AMZ_CONTENT_SHA_256, header);
            }
        }

        let mut signed_headers = Vec::with_capacity(canonical_headers.len());
        for (name, _) in &canonical_headers {
            // The user agent header is not signed because proxies may alter it
            if name != USER_AGENT {
                signed_headers.push(CanonicalHeaderName(name.clone()));
            }
        }
        Ok((signed_headers, canonical_headers))
    }

    fn payload_hash<'b>(body: &'b SignableBody<'b>) -> Cow<'b, str> {
        match body {
            SignableBody::Bytes(data) => Cow::Owned(sha256_hex_string(data)),
            SignableBody::Precomputed(digest) => Cow::Borrowed(digest.as_str()),
            SignableBody::UnsignedPayload => Cow::Borrowed(UNSIGNED_PAYLOAD),
        }
    }

    fn params(
        uri: &Uri,
        params: &SigningParams<'_>,
        date_time: &str,
        signed_headers: &SignedHeaders,
    ) -> Option<String> {
        let mut pairs: Vec<(Cow<'_, str>, Cow<'_, str>)> = uri
            .query()
            .map(|query| form_urlencoded::parse(query.as_bytes()).collect())
            .unwrap_or_default();

        if params.settings.signature_location == SignatureLocation::QueryParams {
            let scope = Scope::from_params(params);
            pairs.push((
                Cow::Borrowed(param::X_AMZ_ALGORITHM),
                Cow::Borrowed(HMAC_256),
            ));
            pairs.push((
                Cow::Borrowed(param::X_AMZ_CREDENTIAL),
                Cow::Owned(format!("{}/{}", params.access_key, scope)),
            ));
            pairs.push((
                Cow::Borrowed(param::X_AMZ_DATE),
                Cow::Owned(date_time.to_string()),
            ));
            pairs.push((
                Cow::Borrowed(param::X_AMZ_EXPIRES),
                Cow::Owned(
                    params
                        .settings
                        .expires_in
                        .expect("expiry validated when canonicalization starts")
                        .as_secs()
                        .to_string(),
                ),
            ));
            pairs.push((
                Cow::Borrowed(param::X_AMZ_SIGNED_HEADERS),
                Cow::Owned(signed_headers.to_string()),
            ));
            if let Some(token) = params.security_token {
                pairs.push((
                    Cow::Borrowed(param::X_AMZ_SECURITY_TOKEN),
                    Cow::Borrowed(token),
                ));
            }
        } else if pairs.is_empty() {
            return None;
        }

        // Sort by param name, and then by param value
        pairs.sort();
        let mut out = String::new();
        let mut first = true;
        for (key, value) in pairs {
            if !first {
                out.push('&');
            }
            first = false;
            out.push_str(&percent_encode(&key));
            out.push('=');
            out.push_str(&percent_encode(&value));
        }
        Some(out)
    }

    fn insert_host_header(
        canonical_headers: &mut HeaderMap<HeaderValue>,
        uri: &Uri,
    ) -> Result<(), SigningError> {
        if canonical_headers.get(&HOST).is_none() {
            let authority = uri.authority().ok_or(SigningError::MissingAuthority)?;
            let header = HeaderValue::from_str(authority.as_str())?;
            canonical_headers.insert(HOST, header);
        }
        Ok(())
    }

    fn insert_date_header(canonical_headers: &mut HeaderMap<HeaderValue>, date_time: &str) {
        let x_amz_date = HeaderName::from_static(X_AMZ_DATE);
        let date_header = HeaderValue::try_from(date_time).expect("date is valid header value");
        canonical_headers.insert(x_amz_date, date_header);
    }
}

impl<'a> fmt::Display for CanonicalRequest<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.method)?;
        writeln!(f, "{}", self.path)?;
        writeln!(f, "{}", self.params.as_deref().unwrap_or(""))?;
        // write out _all_ the headers
        for header in &self.signed_headers.inner {
            // a missing signed header is a bug in canonicalization
            let value = &self.headers[&header.0];
            write!(f, "{}:", header.0.as_str())?;
            writeln!(f, "{}", value.to_str().map_err(|_| fmt::Error)?)?;
        }
        writeln!(f)?;
        write!(f, "{}", self.signed_headers)?;
        writeln!(f)?;
        write!(f, "{}", self.content_sha256)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Default)]
pub(crate) struct SignedHeaders {
    inner: Vec<CanonicalHeaderName>,
}

impl SignedHeaders {
    fn new(mut inner: Vec<CanonicalHeaderName>) -> Self {
        inner.sort();
        SignedHeaders { inner }
    }
}

impl fmt::Display for SignedHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.inner.iter().peekable();
        while let Some(next) = iter.next() {
            match iter.peek().is_some() {
                true => write!(f, "{};", next.0.as_str())?,
                false => write!(f, "{}", next.0.as_str())?,
            };
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct CanonicalHeaderName(HeaderName);

impl PartialOrd for CanonicalHeaderName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalHeaderName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_str().cmp(other.0.as_str())
    }
}

#[derive(PartialEq, Debug, Clone)]
pub(crate) struct Scope<'a> {
    pub(crate) date: String,
    pub(crate) region: &'a str,
    pub(crate) service: &'a str,
}

impl<'a> Scope<'a> {
    pub(crate) fn from_params(params: &'a SigningParams<'a>) -> Self {
        Scope {
            date: format_date(params.time),
            region: params.region,
            service: params.service_name,
        }
    }
}

impl<'a> fmt::Display for Scope<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/aws4_request", self.date, self.region, self.service)
    }
}

#[derive(PartialEq, Debug)]
pub(crate) struct StringToSign<'a> {
    pub(crate) scope: Scope<'a>,
    pub(crate) date_time: String,
    pub(crate) hashed_creq: &'a str,
}

impl<'a> StringToSign<'a> {
    pub(crate) fn new(params: &'a SigningParams<'a>, hashed_creq: &'a str) -> Self {
        Self {
            scope: Scope::from_params(params),
            date_time: format_date_time(params.time),
            hashed_creq,
        }
    }
}

impl<'a> fmt::Display for StringToSign<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{}\n{}\n{}",
            HMAC_256, self.date_time, self.scope, self.hashed_creq
        )
    }
}
