/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Load credentials from a container (ECS) or instance metadata endpoint.

use crate::fetch::FetchMetadata;
use crate::os_shim::Env;
use crate::provider::{BoxFuture, CredentialsError, CredentialsResult, ProvideCredentials};
use crate::Credentials;
use std::sync::Arc;
use std::time::SystemTime;

const CONTAINER_PROVIDER: &str = "ContainerMetadata";

/// The metadata service address used with `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI`.
const BASE_HOST: &str = "http://169.254.170.2";

/// Loads credentials from a metadata endpoint serving the ECS credential
/// document:
///
/// ```json
/// {
///   "AccessKeyId": "...",
///   "SecretAccessKey": "...",
///   "Token": "...",
///   "Expiration": "2021-05-27T19:23:07Z"
/// }
/// ```
///
/// The endpoint comes from `AWS_CONTAINER_CREDENTIALS_FULL_URI`, or from
/// `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` resolved against the fixed
/// metadata address.
pub struct ContainerCredentialsProvider {
    fetch: Arc<dyn FetchMetadata>,
    env: Env,
}

impl ContainerCredentialsProvider {
    pub fn new(fetch: Arc<dyn FetchMetadata>) -> Self {
        Self::new_with_env(fetch, Env::real())
    }

    pub fn new_with_env(fetch: Arc<dyn FetchMetadata>, env: Env) -> Self {
        ContainerCredentialsProvider { fetch, env }
    }

    fn endpoint(&self) -> Result<http::Uri, CredentialsError> {
        if let Ok(full_uri) = self.env.get("AWS_CONTAINER_CREDENTIALS_FULL_URI") {
            return full_uri
                .parse()
                .map_err(|err: http::uri::InvalidUri| {
                    CredentialsError::InvalidConfiguration(Box::new(err))
                });
        }
        let relative = self
            .env
            .get("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI")
            .map_err(|_| CredentialsError::CredentialsNotLoaded)?;
        format!("{}{}", BASE_HOST, relative)
            .parse()
            .map_err(|err: http::uri::InvalidUri| {
                CredentialsError::InvalidConfiguration(Box::new(err))
            })
    }

    async fn credentials(&self) -> CredentialsResult {
        let uri = self.endpoint()?;
        tracing::debug!(uri = %uri, "loading credentials from container metadata");
        let request = http::Request::builder()
            .uri(uri)
            .body(String::new())
            .map_err(|err| CredentialsError::Unhandled(Box::new(err)))?;
        let response = self
            .fetch
            .fetch(request)
            .await
            .map_err(CredentialsError::ProviderError)?;
        if !response.status().is_success() {
            return Err(CredentialsError::ProviderError(
                format!(
                    "metadata endpoint returned status {}",
                    response.status().as_u16()
                )
                .into(),
            ));
        }
        parse_credential_document(response.body())
    }
}

impl ProvideCredentials for ContainerCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> BoxFuture<'a, CredentialsResult>
    where
        Self: 'a,
    {
        Box::pin(self.credentials())
    }
}

fn parse_credential_document(body: &str) -> CredentialsResult {
    let doc: serde_json::Value = serde_json::from_str(body)
        .map_err(|err| CredentialsError::Unhandled(Box::new(err)))?;
    let field = |name: &str| -> Result<&str, CredentialsError> {
        doc.get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CredentialsError::Unhandled(
                    format!("credential document missing `{}`", name).into(),
                )
            })
    };
    let access_key = field("AccessKeyId")?;
    let secret_key = field("SecretAccessKey")?;
    let token = doc.get("Token").and_then(|v| v.as_str()).map(String::from);
    let expiry = doc
        .get("Expiration")
        .and_then(|v| v.as_str())
        .map(parse_expiration)
        .transpose()?;
    Ok(Credentials::new(
        access_key,
        secret_key,
        token,
        expiry,
        CONTAINER_PROVIDER,
    ))
}

pub(crate) fn parse_expiration(timestamp: &str) -> Result<SystemTime, CredentialsError> {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .map(SystemTime::from)
        .map_err(|err| CredentialsError::Unhandled(Box::new(err)))
}
