/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The [`ProvideCredentials`] trait, error taxonomy, and built-in providers.

pub mod container;
pub mod env;
pub mod lazy_caching;
pub mod profile;
pub mod web_identity;

use crate::Credentials;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug)]
#[non_exhaustive]
pub enum CredentialsError {
    /// No credentials were available for this provider
    ///
    /// A chain treats this as "keep looking": the next provider is consulted.
    CredentialsNotLoaded,

    /// The provider was given an invalid configuration
    ///
    /// For example a syntax error in `~/.aws/credentials`.
    InvalidConfiguration(Box<dyn Error + Send + Sync + 'static>),

    /// The provider experienced an error during credential resolution
    ///
    /// This may include errors like a 503 from STS or a file system error when
    /// attempting to read a configuration file.
    ProviderError(Box<dyn Error + Send + Sync + 'static>),

    /// An unexpected error occurred during credential resolution
    ///
    /// If the error can occur during expected usage of a provider,
    /// `ProviderError` should be returned instead. Unhandled is reserved for
    /// exceptional cases, for example a metadata document missing required
    /// fields.
    Unhandled(Box<dyn Error + Send + Sync + 'static>),
}

impl Display for CredentialsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsError::CredentialsNotLoaded => {
                write!(f, "the provider could not provide credentials or required configuration was not set")
            }
            CredentialsError::InvalidConfiguration(err) => {
                write!(f, "the credentials provider was not properly configured: {}", err)
            }
            CredentialsError::ProviderError(err) => {
                write!(f, "an error occurred while loading credentials: {}", err)
            }
            CredentialsError::Unhandled(err) => {
                write!(f, "unexpected credentials error: {}", err)
            }
        }
    }
}

impl Error for CredentialsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CredentialsError::InvalidConfiguration(e)
            | CredentialsError::ProviderError(e)
            | CredentialsError::Unhandled(e) => Some(e.as_ref() as _),
            _ => None,
        }
    }
}

pub type CredentialsResult = Result<Credentials, CredentialsError>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An asynchronous credentials provider
pub trait ProvideCredentials: Send + Sync {
    fn provide_credentials<'a>(&'a self) -> BoxFuture<'a, CredentialsResult>
    where
        Self: 'a;
}

pub type SharedCredentialsProvider = Arc<dyn ProvideCredentials>;

impl ProvideCredentials for Credentials {
    fn provide_credentials<'a>(&'a self) -> BoxFuture<'a, CredentialsResult>
    where
        Self: 'a,
    {
        Box::pin(future::ready(Ok(self.clone())))
    }
}

impl ProvideCredentials for Arc<dyn ProvideCredentials> {
    fn provide_credentials<'a>(&'a self) -> BoxFuture<'a, CredentialsResult>
    where
        Self: 'a,
    {
        self.as_ref().provide_credentials()
    }
}

/// Returns a new [`ProvideCredentialsFn`] with the given closure.
///
/// This allows you to create a [`ProvideCredentials`] implementation from an
/// async block that returns a [`CredentialsResult`]:
///
/// ```rust
/// use nimbus_credentials::Credentials;
/// use nimbus_credentials::provider::provide_credentials_fn;
///
/// async fn load_credentials() -> Credentials {
///     todo!()
/// }
///
/// provide_credentials_fn(|| async {
///     // Async process to retrieve credentials goes here
///     let credentials = load_credentials().await;
///     Ok(credentials)
/// });
/// ```
pub fn provide_credentials_fn<T, F>(f: T) -> ProvideCredentialsFn<T>
where
    T: Fn() -> F + Send + Sync,
    F: Future<Output = CredentialsResult> + Send,
{
    ProvideCredentialsFn { f }
}

/// A [`ProvideCredentials`] implemented by a closure.
///
/// See [`provide_credentials_fn`] for more details.
#[derive(Copy, Clone)]
pub struct ProvideCredentialsFn<T> {
    f: T,
}

impl<T, F> ProvideCredentials for ProvideCredentialsFn<T>
where
    T: Fn() -> F + Send + Sync,
    F: Future<Output = CredentialsResult> + Send + 'static,
{
    fn provide_credentials<'a>(&'a self) -> BoxFuture<'a, CredentialsResult>
    where
        Self: 'a,
    {
        Box::pin((self.f)())
    }
}
