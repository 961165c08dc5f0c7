/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Parsing of the AWS error envelope.
//!
//! Services disagree about how failures are reported: JSON protocols send
//! `{"__type": "com.amazon.service#ThrottlingException", "message": "..."}`
//! (some with `code` instead of `__type`), XML protocols send
//! `<Error><Code>..</Code><Message>..</Message></Error>` with or without an
//! `<ErrorResponse>` wrapper, and some put the type in the
//! `x-amzn-errortype` header with an empty body. This module normalizes all of
//! them into [`AwsError`].

use http::HeaderMap;
use std::fmt;

/// A normalized service error.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AwsError {
    code: Option<String>,
    message: Option<String>,
    request_id: Option<String>,
}

impl AwsError {
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

impl fmt::Display for AwsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code.as_deref().unwrap_or("<unknown code>"))?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id: {})", request_id)?;
        }
        Ok(())
    }
}

/// The response body could not be interpreted as an AWS error envelope.
#[derive(Debug, thiserror::Error)]
#[error("failed to parse error response: {0}")]
pub struct ErrorParseFailure(String);

/// Parses an error envelope out of a response body, with header fallbacks for
/// the error type and request id.
pub fn parse_aws_error(headers: &HeaderMap, body: &[u8]) -> Result<AwsError, ErrorParseFailure> {
    let mut error = match body.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => parse_json(body)?,
        Some(b'<') => parse_xml(body)?,
        Some(_) => return Err(ErrorParseFailure("body is neither JSON nor XML".into())),
        None => AwsError::default(),
    };
    if error.code.is_none() {
        error.code = header_str(headers, "x-amzn-errortype").map(sanitize_error_code);
    }
    if error.request_id.is_none() {
        error.request_id = header_str(headers, "x-amzn-requestid").map(str::to_string);
    }
    if error == AwsError::default() {
        return Err(ErrorParseFailure(
            "response contained no recognizable error envelope".into(),
        ));
    }
    Ok(error)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Error codes are sometimes namespaced (`com.amazon.svc#Code`) or suffixed
/// with a URI (`Code:http://...`); only the bare code is meaningful.
fn sanitize_error_code(code: &str) -> String {
    let code = code.split(':').next().unwrap_or(code);
    match code.rfind('#') {
        Some(idx) => code[idx + 1..].to_string(),
        None => code.to_string(),
    }
}

fn parse_json(body: &[u8]) -> Result<AwsError, ErrorParseFailure> {
    let doc: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ErrorParseFailure(e.to_string()))?;
    let str_field = |names: &[&str]| -> Option<String> {
        names
            .iter()
            .find_map(|name| doc.get(*name).and_then(|v| v.as_str()))
            .map(str::to_string)
    };
    Ok(AwsError {
        code: str_field(&["__type", "code", "Code"])
            .as_deref()
            .map(sanitize_error_code),
        message: str_field(&["message", "Message", "errorMessage"]),
        request_id: str_field(&["requestId", "RequestId"]),
    })
}

fn parse_xml(body: &[u8]) -> Result<AwsError, ErrorParseFailure> {
    let text = std::str::from_utf8(body).map_err(|e| ErrorParseFailure(e.to_string()))?;
    let doc = roxmltree::Document::parse(text).map_err(|e| ErrorParseFailure(e.to_string()))?;
    // works with a root <Error> or an <ErrorResponse>/<Response> wrapper
    let error_node = if doc.root_element().has_tag_name("Error") {
        doc.root_element()
    } else {
        doc.root_element()
            .descendants()
            .find(|n| n.has_tag_name("Error"))
            .ok_or_else(|| ErrorParseFailure("no <Error> element".into()))?
    };
    let child_text = |node: roxmltree::Node<'_, '_>, name: &str| -> Option<String> {
        node.children()
            .find(|n| n.has_tag_name(name))
            .and_then(|n| n.text())
            .map(str::to_string)
    };
    Ok(AwsError {
        code: child_text(error_node, "Code").as_deref().map(sanitize_error_code),
        message: child_text(error_node, "Message"),
        request_id: doc
            .root_element()
            .descendants()
            .find(|n| n.has_tag_name("RequestId"))
            .and_then(|n| n.text())
            .map(str::to_string),
    })
}
