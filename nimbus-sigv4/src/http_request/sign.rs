/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::http_request::canonical_request::{param, CanonicalRequest, Scope, StringToSign};
use crate::http_request::canonical_request::{
    HMAC_256, X_AMZ_CONTENT_SHA_256, X_AMZ_DATE, X_AMZ_SECURITY_TOKEN,
};
use crate::http_request::error::SigningError;
use crate::http_request::query_writer::QueryWriter;
use crate::http_request::settings::{SignatureLocation, MAX_PRESIGNED_EXPIRES};
use crate::sign::{calculate_signature, generate_signing_key, sha256_hex_string};
use crate::{SigningOutput, SigningParams};
use http::header::{HeaderName, AUTHORIZATION, HOST};
use http::{HeaderMap, HeaderValue, Method, Uri};

/// Represents all of the information necessary to sign an HTTP request.
#[derive(Debug)]
#[non_exhaustive]
pub struct SignableRequest<'a> {
    method: &'a Method,
    uri: &'a Uri,
    headers: &'a HeaderMap<HeaderValue>,
    body: SignableBody<'a>,
}

impl<'a> SignableRequest<'a> {
    /// Creates a new `SignableRequest`. If you have an [`http::Request`], then
    /// consider using [`SignableRequest::from`] instead of `new`.
    pub fn new(
        method: &'a Method,
        uri: &'a Uri,
        headers: &'a HeaderMap<HeaderValue>,
        body: SignableBody<'a>,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    /// Returns the signable URI
    pub fn uri(&self) -> &Uri {
        self.uri
    }

    /// Returns the signable HTTP method
    pub fn method(&self) -> &Method {
        self.method
    }

    /// Returns the request headers
    pub fn headers(&self) -> &HeaderMap<HeaderValue> {
        self.headers
    }

    /// Returns the signable body
    pub fn body(&self) -> &SignableBody<'_> {
        &self.body
    }
}

impl<'a, B> From<&'a http::Request<B>> for SignableRequest<'a>
where
    B: 'a,
    B: AsRef<[u8]>,
{
    fn from(request: &'a http::Request<B>) -> SignableRequest<'a> {
        SignableRequest::new(
            request.method(),
            request.uri(),
            request.headers(),
            SignableBody::Bytes(request.body().as_ref()),
        )
    }
}

/// A signable HTTP request body
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum SignableBody<'a> {
    /// A body composed of a slice of bytes
    Bytes(&'a [u8]),

    /// An unsigned payload
    ///
    /// UnsignedPayload is used for streaming requests where the contents of the
    /// body cannot be known prior to signing
    UnsignedPayload,

    /// A precomputed body checksum. The checksum should be a SHA-256 checksum
    /// of the body, lowercase hex encoded
    Precomputed(String),
}

/// Instructions for applying a signature to an HTTP request.
#[derive(Debug)]
pub struct SigningInstructions {
    headers: Option<HeaderMap<HeaderValue>>,
    params: Option<Vec<(&'static str, String)>>,
}

impl SigningInstructions {
    fn new(
        headers: Option<HeaderMap<HeaderValue>>,
        params: Option<Vec<(&'static str, String)>>,
    ) -> Self {
        Self { headers, params }
    }

    /// Returns the headers that should be added to the request.
    pub fn headers(&self) -> Option<&HeaderMap<HeaderValue>> {
        self.headers.as_ref()
    }

    /// Returns the query parameters that should be added to the request.
    pub fn params(&self) -> Option<&Vec<(&'static str, String)>> {
        self.params.as_ref()
    }

    /// Applies the instructions to the given `request`.
    pub fn apply_to_request<B>(self, request: &mut http::Request<B>) {
        if let Some(new_headers) = self.headers {
            for (name, value) in new_headers.into_iter() {
                request
                    .headers_mut()
                    .insert(name.expect("full header pairs only"), value);
            }
        }
        if let Some(params) = self.params {
            let mut query = QueryWriter::new(request.uri());
            for (name, value) in params {
                query.insert(name, &value);
            }
            *request.uri_mut() = query.build_uri();
        }
    }
}

/// Produces a signature for the given `request` and returns instructions
/// that can be used to apply that signature to an HTTP request.
pub fn sign<'a>(
    request: SignableRequest<'a>,
    params: &'a SigningParams<'a>,
) -> Result<SigningOutput<SigningInstructions>, SigningError> {
    tracing::trace!(request = ?request, params = ?params, "signing request");
    match params.settings.signature_location {
        SignatureLocation::Headers => {
            let (headers, signature) = calculate_signing_headers(&request, params)?;
            Ok(SigningOutput::new(
                SigningInstructions::new(Some(headers), None),
                signature,
            ))
        }
        SignatureLocation::QueryParams => {
            let (query_params, signature) = calculate_signing_params(&request, params)?;
            Ok(SigningOutput::new(
                SigningInstructions::new(None, Some(query_params)),
                signature,
            ))
        }
    }
}

/// Signs `request` in place, adding `host`, `x-amz-date`, optional
/// `x-amz-security-token`/`x-amz-content-sha256`, and `Authorization` headers.
///
/// Any signing headers from a previous call are stripped first, so re-signing
/// an unchanged request yields the same result instead of a corrupted one.
pub fn sign_request<B: AsRef<[u8]>>(
    request: &mut http::Request<B>,
    params: &SigningParams<'_>,
) -> Result<SigningOutput<()>, SigningError> {
    strip_signing_headers(request.headers_mut());
    let (instructions, signature) = sign(SignableRequest::from(&*request), params)?.into_parts();
    instructions.apply_to_request(request);
    Ok(SigningOutput::new((), signature))
}

/// Presigns `request` in place, appending the `X-Amz-*` signature parameters
/// to the query string. The body is treated as unsigned.
pub fn presign_request<B>(
    request: &mut http::Request<B>,
    params: &SigningParams<'_>,
) -> Result<SigningOutput<()>, SigningError> {
    match params.settings.expires_in {
        None => return Err(SigningError::InvalidExpiry(None)),
        Some(expires) if expires > MAX_PRESIGNED_EXPIRES => {
            return Err(SigningError::InvalidExpiry(Some(expires)))
        }
        Some(_) => {}
    }
    let mut params = params.clone();
    params.settings.signature_location = SignatureLocation::QueryParams;

    let (instructions, signature) = {
        let signable = SignableRequest::new(
            request.method(),
            request.uri(),
            request.headers(),
            SignableBody::UnsignedPayload,
        );
        sign(signable, &params)?.into_parts()
    };
    instructions.apply_to_request(request);
    Ok(SigningOutput::new((), signature))
}

/// Removes signing headers applied by an earlier `sign_request` call.
fn strip_signing_headers(headers: &mut HeaderMap<HeaderValue>) {
    headers.remove(AUTHORIZATION);
    headers.remove(HeaderName::from_static(X_AMZ_DATE));
    headers.remove(HeaderName::from_static(X_AMZ_CONTENT_SHA_256));
    headers.remove(HeaderName::from_static(X_AMZ_SECURITY_TOKEN));
}

fn calculate_signing_headers<'a>(
    request: &'a SignableRequest<'a>,
    params: &'a SigningParams<'a>,
) -> Result<(HeaderMap<HeaderValue>, String), SigningError> {
    let creq = CanonicalRequest::from(request, params)?;
    let encoded_creq = sha256_hex_string(creq.to_string().as_bytes());
    let sts = StringToSign::new(params, &encoded_creq);
    let signing_key =
        generate_signing_key(params.secret_key, params.time, params.region, params.service_name);
    let signature = calculate_signature(signing_key, sts.to_string().as_bytes());

    // Pull the added headers out of the canonical request; the `Authorization`
    // header is built from the signature.
    let mut headers = HeaderMap::new();
    if let Some(host) = creq.headers.get(&HOST) {
        headers.insert(HOST, host.clone());
    }
    headers.insert(
        HeaderName::from_static(X_AMZ_DATE),
        HeaderValue::from_str(&creq.date_time)?,
    );
    if let Some(token) = creq.security_token {
        let mut token = HeaderValue::from_str(token)?;
        token.set_sensitive(true);
        headers.insert(HeaderName::from_static(X_AMZ_SECURITY_TOKEN), token);
    }
    if let Some(sha256) = creq.headers.get(HeaderName::from_static(X_AMZ_CONTENT_SHA_256)) {
        headers.insert(HeaderName::from_static(X_AMZ_CONTENT_SHA_256), sha256.clone());
    }
    let mut authorization = HeaderValue::from_str(&format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        HMAC_256,
        params.access_key,
        Scope::from_params(params),
        creq.signed_headers,
        signature,
    ))?;
    authorization.set_sensitive(true);
    headers.insert(AUTHORIZATION, authorization);

    Ok((headers, signature))
}

fn calculate_signing_params<'a>(
    request: &'a SignableRequest<'a>,
    params: &'a SigningParams<'a>,
) -> Result<(Vec<(&'static str, String)>, String), SigningError> {
    let creq = CanonicalRequest::from(request, params)?;
    let encoded_creq = sha256_hex_string(creq.to_string().as_bytes());
    let sts = StringToSign::new(params, &encoded_creq);
    let signing_key =
        generate_signing_key(params.secret_key, params.time, params.region, params.service_name);
    let signature = calculate_signature(signing_key, sts.to_string().as_bytes());

    let mut signing_params = vec![
        (param::X_AMZ_ALGORITHM, HMAC_256.to_string()),
        (
            param::X_AMZ_CREDENTIAL,
            format!("{}/{}", params.access_key, Scope::from_params(params)),
        ),
        (param::X_AMZ_DATE, creq.date_time.clone()),
        (
            param::X_AMZ_EXPIRES,
            params
                .settings
                .expires_in
                .expect("expiry validated during canonicalization")
                .as_secs()
                .to_string(),
        ),
        (
            param::X_AMZ_SIGNED_HEADERS,
            creq.signed_headers.to_string(),
        ),
    ];
    if let Some(token) = params.security_token {
        signing_params.push((param::X_AMZ_SECURITY_TOKEN, token.to_string()));
    }
    signing_params.push((param::X_AMZ_SIGNATURE, signature.clone()));

    Ok((signing_params, signature))
}

#[cfg(test)]
mod tests {
    use super::{presign_request, sign, sign_request, SignableRequest};
    use crate::date_time::test_parsers::parse_date_time;
    use crate::http_request::{SignatureLocation, SigningError, SigningSettings};
    use crate::sign::SigningParams;
    use http::header::AUTHORIZATION;
    use std::time::{Duration, SystemTime};

    fn params(settings: SigningSettings, time: SystemTime) -> SigningParams<'static> {
        SigningParams::builder()
            .access_key("AKIDEXAMPLE")
            .secret_key("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
            .region("us-east-1")
            .service_name("iam")
            .time(time)
            .settings(settings)
            .build()
            .unwrap()
    }

    fn list_users_request() -> http::Request<&'static str> {
        http::Request::builder()
            .method("GET")
            .uri("https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08")
            .header(
                "content-type",
                "application/x-www-form-urlencoded; charset=utf-8",
            )
            .body("")
            .unwrap()
    }

    // Reference values from the AWS SigV4 test suite (get-vanilla, iam)
    const EXPECTED_SIGNATURE: &str =
        "5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7";

    #[test]
    fn signs_the_aws_reference_request() {
        let mut req = list_users_request();
        let time = parse_date_time("20150830T123600Z");
        let out = sign_request(&mut req, &params(SigningSettings::default(), time)).unwrap();
        assert_eq!(EXPECTED_SIGNATURE, out.signature());
        assert_eq!(
            format!(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
                 SignedHeaders=content-type;host;x-amz-date, Signature={}",
                EXPECTED_SIGNATURE
            ),
            req.headers()[AUTHORIZATION].to_str().unwrap(),
        );
        assert_eq!("20150830T123600Z", req.headers()["x-amz-date"]);
        assert_eq!("iam.amazonaws.com", req.headers()["host"]);
    }

    #[test]
    fn signing_is_deterministic() {
        let time = parse_date_time("20150830T123600Z");
        let mut first = list_users_request();
        let mut second = list_users_request();
        let p = params(SigningSettings::default(), time);
        let sig_a = sign_request(&mut first, &p).unwrap();
        let sig_b = sign_request(&mut second, &p).unwrap();
        assert_eq!(sig_a.signature(), sig_b.signature());
        assert_eq!(
            first.headers()[AUTHORIZATION],
            second.headers()[AUTHORIZATION]
        );
    }

    #[test]
    fn resigning_is_idempotent() {
        let time = parse_date_time("20150830T123600Z");
        let p = params(SigningSettings::default(), time);
        let mut req = list_users_request();
        sign_request(&mut req, &p).unwrap();
        let first_auth = req.headers()[AUTHORIZATION].clone();
        // a second pass must not fold the previous signature into the new one
        sign_request(&mut req, &p).unwrap();
        assert_eq!(first_auth, req.headers()[AUTHORIZATION]);
        assert_eq!(1, req.headers().get_all("x-amz-date").iter().count());
    }

    #[test]
    fn session_token_is_signed() {
        let time = parse_date_time("20150830T123600Z");
        let p = SigningParams::builder()
            .access_key("AKIDEXAMPLE")
            .secret_key("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
            .security_token("the-token")
            .region("us-east-1")
            .service_name("iam")
            .time(time)
            .build()
            .unwrap();
        let mut req = list_users_request();
        sign_request(&mut req, &p).unwrap();
        assert_eq!("the-token", req.headers()["x-amz-security-token"]);
        assert!(req.headers()[AUTHORIZATION]
            .to_str()
            .unwrap()
            .contains("x-amz-security-token"));
    }

    #[test]
    fn presigned_url_carries_signature_in_query() {
        let time = parse_date_time("20150830T123600Z");
        let mut settings = SigningSettings::default();
        settings.signature_location = SignatureLocation::QueryParams;
        settings.expires_in = Some(Duration::from_secs(3600));
        let mut req = http::Request::builder()
            .uri("https://iam.amazonaws.com/")
            .body("")
            .unwrap();
        let out = presign_request(&mut req, &params(settings, time)).unwrap();

        let query = req.uri().query().unwrap();
        assert!(query.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(query.contains("X-Amz-Expires=3600"));
        assert!(query.contains("X-Amz-SignedHeaders=host"));
        assert!(query.contains(&format!("X-Amz-Signature={}", out.signature())));
        // headers untouched; the URL is the whole artifact
        assert!(req.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn query_signature_without_expiry_is_an_error() {
        // the settings fields are public, so this state is reachable without
        // going through presign_request
        let time = parse_date_time("20150830T123600Z");
        let mut settings = SigningSettings::default();
        settings.signature_location = SignatureLocation::QueryParams;
        let p = params(settings, time);
        let req = list_users_request();
        let result = sign(SignableRequest::from(&req), &p);
        assert!(matches!(result, Err(SigningError::InvalidExpiry(None))));
    }

    #[test]
    fn presign_requires_a_bounded_expiry() {
        let time = parse_date_time("20150830T123600Z");
        let mut req = http::Request::builder()
            .uri("https://iam.amazonaws.com/")
            .body("")
            .unwrap();
        let unset = params(SigningSettings::default(), time);
        assert!(presign_request(&mut req, &unset).is_err());

        let mut settings = SigningSettings::default();
        settings.expires_in = Some(Duration::from_secs(8 * 24 * 3600));
        let too_long = params(settings, time);
        assert!(presign_request(&mut req, &too_long).is_err());
    }
}
