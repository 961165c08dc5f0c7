/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Client configuration.

use crate::body::{read_body, SdkBody};
use crate::connector::DynConnector;
use crate::retry::RetryConfig;
use http::Uri;
use nimbus_credentials::chain::ChainProvider;
use nimbus_credentials::fetch::{FetchError, FetchMetadata};
use nimbus_credentials::provider::{BoxFuture, ProvideCredentials, SharedCredentialsProvider};
use nimbus_credentials::provider::lazy_caching::LazyCachingCredentialsProvider;
use nimbus_credentials::provider::profile::ProfileFileCredentialsProvider;
use nimbus_credentials::provider::env::EnvironmentVariableCredentialsProvider;
use nimbus_credentials::provider::container::ContainerCredentialsProvider;
use nimbus_credentials::provider::web_identity::WebIdentityTokenCredentialsProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Immutable client configuration. Built once with [`Config::builder`] and
/// shared by every request the client dispatches.
#[derive(Clone)]
pub struct Config {
    region: String,
    endpoint: Option<Uri>,
    credentials_provider: SharedCredentialsProvider,
    connector: DynConnector,
    retry_config: RetryConfig,
    timeout: Option<Duration>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn endpoint(&self) -> Option<&Uri> {
        self.endpoint.as_ref()
    }

    pub fn credentials_provider(&self) -> &SharedCredentialsProvider {
        &self.credentials_provider
    }

    pub(crate) fn connector(&self) -> &DynConnector {
        &self.connector
    }

    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Required settings are the region and (unless the `native-tls` default
/// connector is enabled) a connector; everything else has defaults.
#[derive(Default)]
pub struct Builder {
    region: Option<String>,
    endpoint: Option<Uri>,
    profile_name: Option<String>,
    credentials_provider: Option<SharedCredentialsProvider>,
    connector: Option<DynConnector>,
    retry_config: Option<RetryConfig>,
    timeout: Option<Duration>,
}

/// An error constructing a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigBuildError {
    #[error("a region must be set")]
    MissingRegion,
    #[error("no connector was provided and no default connector is available")]
    MissingConnector,
}

impl Builder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Overrides the endpoint, bypassing regional endpoint resolution. Useful
    /// for local stacks and gamma endpoints.
    pub fn endpoint(mut self, endpoint: Uri) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Selects the profile used by the shared-credentials-file provider in
    /// the default chain. Ignored when an explicit credentials provider is
    /// set.
    pub fn profile_name(mut self, name: impl Into<String>) -> Self {
        self.profile_name = Some(name.into());
        self
    }

    pub fn credentials_provider(
        mut self,
        provider: impl ProvideCredentials + 'static,
    ) -> Self {
        self.credentials_provider = Some(Arc::new(provider));
        self
    }

    pub fn connector(mut self, connector: DynConnector) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = Some(retry_config);
        self
    }

    /// Default per-request timeout. A request can override it through its
    /// [`RequestContext`](crate::RequestContext).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Config, ConfigBuildError> {
        let region = self.region.ok_or(ConfigBuildError::MissingRegion)?;
        let connector = match self.connector {
            Some(connector) => connector,
            None => default_connector().ok_or(ConfigBuildError::MissingConnector)?,
        };
        let profile_name = self.profile_name;
        let credentials_provider = self.credentials_provider.unwrap_or_else(|| {
            let chain = default_chain(connector.clone(), profile_name);
            Arc::new(
                LazyCachingCredentialsProvider::builder()
                    .refresh(chain)
                    .build(),
            )
        });
        Ok(Config {
            region,
            endpoint: self.endpoint,
            credentials_provider,
            connector,
            retry_config: self.retry_config.unwrap_or_default(),
            timeout: self.timeout,
        })
    }
}

#[cfg(feature = "native-tls")]
fn default_connector() -> Option<DynConnector> {
    Some(crate::connector::default_connector())
}

#[cfg(not(feature = "native-tls"))]
fn default_connector() -> Option<DynConnector> {
    None
}

fn default_chain(connector: DynConnector, profile_name: Option<String>) -> ChainProvider {
    let fetch = Arc::new(ConnectorFetcher {
        connector: std::sync::Mutex::new(connector),
    });
    match profile_name {
        None => ChainProvider::default_chain(fetch),
        Some(name) => {
            let profile = ProfileFileCredentialsProvider::builder()
                .profile_name(name)
                .build();
            ChainProvider::first_try(
                "Environment",
                EnvironmentVariableCredentialsProvider::new(),
            )
            .or_else("Profile", profile)
            .or_else("Container", ContainerCredentialsProvider::new(fetch.clone()))
            .or_else(
                "WebIdentityToken",
                WebIdentityTokenCredentialsProvider::new(fetch),
            )
        }
    }
}

/// Lets the credential providers reuse the client's transport for their
/// metadata and STS calls.
struct ConnectorFetcher {
    // `DynConnector` is not `Sync` (tower's `BoxCloneService` isn't); the
    // mutex is held only long enough to clone the connector.
    connector: std::sync::Mutex<DynConnector>,
}

impl FetchMetadata for ConnectorFetcher {
    fn fetch<'a>(
        &'a self,
        request: http::Request<String>,
    ) -> BoxFuture<'a, Result<http::Response<String>, FetchError>> {
        let connector = self.connector.lock().unwrap().clone();
        Box::pin(async move {
            let request = request.map(SdkBody::from);
            let response = connector.call(request).await?;
            let (parts, body) = response.into_parts();
            let body = read_body(body).await?;
            let body = String::from_utf8(body.to_vec())?;
            Ok(http::Response::from_parts(parts, body))
        })
    }
}

#[cfg(test)]
mod test {
    use super::{Config, ConfigBuildError};
    use crate::connector::{ConnectorError, DynConnector};
    use crate::body::SdkBody;
    use nimbus_credentials::Credentials;
    use tower::service_fn;

    fn stub_connector() -> DynConnector {
        DynConnector::new(service_fn(|_req: http::Request<SdkBody>| async {
            Ok::<_, ConnectorError>(http::Response::new(SdkBody::empty()))
        }))
    }

    #[test]
    fn region_is_required() {
        let err = Config::builder().connector(stub_connector()).build();
        assert!(matches!(err, Err(ConfigBuildError::MissingRegion)));
    }

    #[test]
    fn explicit_settings_win() {
        let config = Config::builder()
            .region("us-west-2")
            .connector(stub_connector())
            .credentials_provider(Credentials::from_keys("akid", "secret", None))
            .build()
            .unwrap();
        assert_eq!("us-west-2", config.region());
        assert!(config.endpoint().is_none());
    }
}
