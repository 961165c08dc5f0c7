/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::borrow::Cow;
use std::sync::Arc;

use crate::fetch::FetchMetadata;
use crate::provider::container::ContainerCredentialsProvider;
use crate::provider::env::EnvironmentVariableCredentialsProvider;
use crate::provider::profile::ProfileFileCredentialsProvider;
use crate::provider::web_identity::WebIdentityTokenCredentialsProvider;
use crate::provider::{BoxFuture, CredentialsError, CredentialsResult, ProvideCredentials};
use tracing::Instrument;

/// Credentials provider that checks a series of inner providers
///
/// Each provider is checked in turn. The first provider that returns a
/// successful credential is used; a provider that fails (including with
/// `CredentialsNotLoaded`) passes control to the next one. If every provider
/// fails, the last error is returned.
///
/// ## Example
/// ```rust
/// use nimbus_credentials::chain::ChainProvider;
/// use nimbus_credentials::provider::env::EnvironmentVariableCredentialsProvider;
/// use nimbus_credentials::Credentials;
/// let provider = ChainProvider::first_try("Environment", EnvironmentVariableCredentialsProvider::new())
///     .or_else("Static", Credentials::from_keys("someacceskeyid", "somesecret", None));
/// ```
pub struct ChainProvider {
    providers: Vec<(Cow<'static, str>, Box<dyn ProvideCredentials>)>,
}

impl ChainProvider {
    pub fn first_try(
        name: impl Into<Cow<'static, str>>,
        provider: impl ProvideCredentials + 'static,
    ) -> Self {
        ChainProvider {
            providers: vec![(name.into(), Box::new(provider))],
        }
    }

    pub fn or_else(
        mut self,
        name: impl Into<Cow<'static, str>>,
        provider: impl ProvideCredentials + 'static,
    ) -> Self {
        self.providers.push((name.into(), Box::new(provider)));
        self
    }

    /// The default resolution order: environment, shared profile file,
    /// container metadata, then STS web identity. Prepend explicit static
    /// credentials with [`ChainProvider::first_try`] if you have them.
    pub fn default_chain(fetch: Arc<dyn FetchMetadata>) -> Self {
        ChainProvider::first_try("Environment", EnvironmentVariableCredentialsProvider::new())
            .or_else("Profile", ProfileFileCredentialsProvider::default())
            .or_else(
                "Container",
                ContainerCredentialsProvider::new(fetch.clone()),
            )
            .or_else(
                "WebIdentityToken",
                WebIdentityTokenCredentialsProvider::new(fetch),
            )
    }

    async fn credentials(&self) -> CredentialsResult {
        let mut last_error = CredentialsError::CredentialsNotLoaded;
        for (name, provider) in &self.providers {
            let span = tracing::info_span!("load_credentials", provider = %name);
            match provider.provide_credentials().instrument(span).await {
                Ok(credentials) => {
                    tracing::info!(provider = %name, "loaded credentials");
                    return Ok(credentials);
                }
                Err(e) => {
                    tracing::info!(provider = %name, error = %e, "provider in chain did not provide credentials");
                    last_error = e
                }
            }
        }
        Err(last_error)
    }
}

impl ProvideCredentials for ChainProvider {
    fn provide_credentials<'a>(&'a self) -> BoxFuture<'a, CredentialsResult>
    where
        Self: 'a,
    {
        Box::pin(self.credentials())
    }
}
