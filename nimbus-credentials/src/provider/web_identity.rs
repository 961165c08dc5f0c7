/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Exchange a web identity token for credentials with STS
//! `AssumeRoleWithWebIdentity`.

use crate::fetch::FetchMetadata;
use crate::os_shim::{Env, Fs};
use crate::provider::container::parse_expiration;
use crate::provider::{BoxFuture, CredentialsError, CredentialsResult, ProvideCredentials};
use crate::Credentials;
use std::sync::Arc;

const WEB_IDENTITY_PROVIDER: &str = "WebIdentityToken";
const STS_ENDPOINT: &str = "https://sts.amazonaws.com/";
const DEFAULT_SESSION_NAME: &str = "nimbus-web-identity";

/// Loads credentials by exchanging an OIDC token for STS session credentials.
///
/// Configuration comes from the environment, as written by EKS and similar
/// schedulers: `AWS_WEB_IDENTITY_TOKEN_FILE` (path to the token),
/// `AWS_ROLE_ARN`, and optionally `AWS_ROLE_SESSION_NAME`.
pub struct WebIdentityTokenCredentialsProvider {
    fetch: Arc<dyn FetchMetadata>,
    fs: Fs,
    env: Env,
}

impl WebIdentityTokenCredentialsProvider {
    pub fn new(fetch: Arc<dyn FetchMetadata>) -> Self {
        Self::new_with_shims(fetch, Fs::real(), Env::real())
    }

    pub fn new_with_shims(fetch: Arc<dyn FetchMetadata>, fs: Fs, env: Env) -> Self {
        WebIdentityTokenCredentialsProvider { fetch, fs, env }
    }

    async fn credentials(&self) -> CredentialsResult {
        let token_file = self
            .env
            .get("AWS_WEB_IDENTITY_TOKEN_FILE")
            .map_err(|_| CredentialsError::CredentialsNotLoaded)?;
        let role_arn = self.env.get("AWS_ROLE_ARN").map_err(|_| {
            CredentialsError::InvalidConfiguration(
                "AWS_WEB_IDENTITY_TOKEN_FILE is set but AWS_ROLE_ARN is not".into(),
            )
        })?;
        let session_name = self
            .env
            .get("AWS_ROLE_SESSION_NAME")
            .unwrap_or_else(|_| DEFAULT_SESSION_NAME.to_string());
        let token = self
            .fs
            .read_to_end(&token_file)
            .map_err(|err| CredentialsError::ProviderError(Box::new(err)))?;
        let token = String::from_utf8(token)
            .map_err(|err| CredentialsError::InvalidConfiguration(Box::new(err)))?;

        tracing::debug!(role = %role_arn, "assuming role with web identity");
        let body: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("Action", "AssumeRoleWithWebIdentity")
            .append_pair("Version", "2011-06-15")
            .append_pair("RoleArn", &role_arn)
            .append_pair("RoleSessionName", &session_name)
            .append_pair("WebIdentityToken", token.trim())
            .finish();
        let request = http::Request::builder()
            .method(http::Method::POST)
            .uri(STS_ENDPOINT)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .map_err(|err| CredentialsError::Unhandled(Box::new(err)))?;

        let response = self
            .fetch
            .fetch(request)
            .await
            .map_err(CredentialsError::ProviderError)?;
        if !response.status().is_success() {
            return Err(CredentialsError::ProviderError(
                format!("STS returned status {}", response.status().as_u16()).into(),
            ));
        }
        parse_assume_role_response(response.body())
    }
}

impl ProvideCredentials for WebIdentityTokenCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> BoxFuture<'a, CredentialsResult>
    where
        Self: 'a,
    {
        Box::pin(self.credentials())
    }
}

fn parse_assume_role_response(body: &str) -> CredentialsResult {
    let doc = roxmltree::Document::parse(body)
        .map_err(|err| CredentialsError::Unhandled(Box::new(err)))?;
    let credentials = doc
        .descendants()
        .find(|node| node.has_tag_name("Credentials"))
        .ok_or_else(|| {
            CredentialsError::Unhandled("STS response contained no <Credentials>".into())
        })?;
    let field = |name: &str| -> Result<&str, CredentialsError> {
        credentials
            .children()
            .find(|node| node.has_tag_name(name))
            .and_then(|node| node.text())
            .ok_or_else(|| {
                CredentialsError::Unhandled(
                    format!("STS response missing `{}`", name).into(),
                )
            })
    };
    let access_key = field("AccessKeyId")?;
    let secret_key = field("SecretAccessKey")?;
    let session_token = field("SessionToken")?;
    let expiry = parse_expiration(field("Expiration")?)?;
    Ok(Credentials::new(
        access_key,
        secret_key,
        Some(session_token.to_string()),
        Some(expiry),
        WEB_IDENTITY_PROVIDER,
    ))
}
