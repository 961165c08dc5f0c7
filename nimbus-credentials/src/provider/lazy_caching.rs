/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Lazy, caching credentials provider with single-flight refresh.

use crate::provider::{BoxFuture, CredentialsResult, ProvideCredentials};
use crate::Credentials;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{OnceCell, RwLock};
use tracing::{trace_span, warn};

const DEFAULT_BUFFER_TIME: Duration = Duration::from_secs(60);
const DEFAULT_CREDENTIAL_EXPIRATION: Duration = Duration::from_secs(15 * 60);

/// `LazyCachingCredentialsProvider` implements [`ProvideCredentials`] by caching
/// credentials that it loads from an inner [`ProvideCredentials`] implementation.
///
/// For example, you can provide an implementation that calls STS `AssumeRole`
/// for temporary credentials, and `LazyCachingCredentialsProvider` will cache
/// them until they are close to expiring. Concurrent callers share a single
/// refresh: only one request to the inner provider is in flight at a time, and
/// everyone waiting receives its result.
///
/// Credentials are refreshed *before* they actually expire: once the current
/// time is within `buffer_time` (default 60 seconds) of the expiry, the next
/// call loads fresh credentials.
pub struct LazyCachingCredentialsProvider(Provider<SystemTimeProvider>);

impl LazyCachingCredentialsProvider {
    fn new(
        refresh: Arc<dyn ProvideCredentials>,
        buffer_time: Duration,
        default_credential_expiration: Duration,
    ) -> Self {
        LazyCachingCredentialsProvider(Provider::new(
            SystemTimeProvider,
            refresh,
            buffer_time,
            default_credential_expiration,
        ))
    }

    /// Returns a new `Builder` that can be used to construct the provider.
    pub fn builder() -> builder::Builder {
        builder::Builder::new()
    }
}

impl ProvideCredentials for LazyCachingCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> BoxFuture<'a, CredentialsResult>
    where
        Self: 'a,
    {
        self.0.provide_credentials()
    }
}

pub mod builder {
    use crate::provider::lazy_caching::{
        LazyCachingCredentialsProvider, DEFAULT_BUFFER_TIME, DEFAULT_CREDENTIAL_EXPIRATION,
    };
    use crate::provider::ProvideCredentials;
    use std::sync::Arc;
    use std::time::Duration;

    /// Builder for constructing a [`LazyCachingCredentialsProvider`].
    ///
    /// # Example
    ///
    /// ```
    /// use nimbus_credentials::Credentials;
    /// use nimbus_credentials::provider::provide_credentials_fn;
    /// use nimbus_credentials::provider::lazy_caching::LazyCachingCredentialsProvider;
    ///
    /// let provider = LazyCachingCredentialsProvider::builder()
    ///     .refresh(provide_credentials_fn(|| async {
    ///         // An async process to retrieve credentials would go here:
    ///         Ok(Credentials::from_keys("example", "example", None))
    ///     }))
    ///     .build();
    /// ```
    #[derive(Default)]
    pub struct Builder {
        refresh: Option<Arc<dyn ProvideCredentials>>,
        buffer_time: Option<Duration>,
        default_credential_expiration: Option<Duration>,
    }

    impl Builder {
        pub fn new() -> Self {
            Default::default()
        }

        /// An implementation of [`ProvideCredentials`] that will be used to
        /// load the cached credentials once they are expired.
        pub fn refresh(mut self, refresh: impl ProvideCredentials + 'static) -> Self {
            self.refresh = Some(Arc::new(refresh));
            self
        }

        /// (Optional) How far ahead of expiry credentials are considered stale.
        /// Defaults to 60 seconds.
        pub fn buffer_time(mut self, buffer_time: Duration) -> Self {
            self.buffer_time = Some(buffer_time);
            self
        }

        /// (Optional) Expiration time to assume for credentials that don't
        /// carry one. Must be at least 15 minutes.
        pub fn default_credential_expiration(mut self, duration: Duration) -> Self {
            self.default_credential_expiration = Some(duration);
            self
        }

        /// Creates the [`LazyCachingCredentialsProvider`].
        pub fn build(self) -> LazyCachingCredentialsProvider {
            let default_credential_expiration = self
                .default_credential_expiration
                .unwrap_or(DEFAULT_CREDENTIAL_EXPIRATION);
            assert!(
                default_credential_expiration >= DEFAULT_CREDENTIAL_EXPIRATION,
                "default_credential_expiration must be at least 15 minutes"
            );
            LazyCachingCredentialsProvider::new(
                self.refresh.expect("refresh provider is required"),
                self.buffer_time.unwrap_or(DEFAULT_BUFFER_TIME),
                default_credential_expiration,
            )
        }
    }
}

// Allows us to abstract time for tests.
pub(crate) trait TimeProvider: Clone + Send + Sync + 'static {
    fn now(&self) -> SystemTime;
}

#[derive(Copy, Clone)]
pub(crate) struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Returns whether the credentials are stale at `now`, refreshing `buffer_time`
/// ahead of the actual expiry. Panics if the credentials have no expiry set.
fn stale(credentials: &Credentials, now: SystemTime, buffer_time: Duration) -> bool {
    let expiration = credentials
        .expiry()
        .expect("refresh sets expiry if not given");
    now + buffer_time > expiration
}

#[derive(Clone)]
struct Inner<T: TimeProvider> {
    time: T,
    cache: Cache,
    refresh: Arc<dyn ProvideCredentials>,
    buffer_time: Duration,
    default_credential_expiration: Duration,
}

impl<T: TimeProvider> Inner<T> {
    async fn refresh(&self) -> CredentialsResult {
        let time = self.time.clone();
        let default_credential_expiration = self.default_credential_expiration;
        let future = self.refresh.provide_credentials();
        self.cache
            .refresh(|| async move {
                let credentials = future.await?;
                // If the credentials don't have an expiration time, then create a default one
                let credentials = if credentials.expiry().is_none() {
                    Credentials::new(
                        credentials.access_key_id(),
                        credentials.secret_access_key(),
                        credentials.session_token().map(|s| s.to_string()),
                        Some(time.now() + default_credential_expiration),
                        credentials.provider_name(),
                    )
                } else {
                    credentials
                };
                Ok(credentials)
            })
            .await
    }

    async fn needs_refresh(&self, now: SystemTime) -> bool {
        if let Some(credentials) = self.cache.get().await {
            if stale(&credentials, now, self.buffer_time) {
                self.cache.clear_if_stale(now, self.buffer_time).await
            } else {
                false
            }
        } else {
            true
        }
    }

    async fn cached(&self) -> Option<Credentials> {
        self.cache.get().await
    }
}

struct Provider<T: TimeProvider> {
    inner: Inner<T>,
}

impl<T: TimeProvider> Provider<T> {
    fn new(
        time: T,
        refresh: Arc<dyn ProvideCredentials>,
        buffer_time: Duration,
        default_credential_expiration: Duration,
    ) -> Self {
        Provider {
            inner: Inner {
                time,
                cache: Cache::new(),
                refresh,
                buffer_time,
                default_credential_expiration,
            },
        }
    }

    fn provide_credentials(&self) -> BoxFuture<'_, CredentialsResult> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let now = inner.time.now();
            if inner.needs_refresh(now).await {
                let span = trace_span!("lazy_refresh_credentials");
                let _enter = span.enter();
                inner.refresh().await
            } else {
                match inner.cached().await {
                    Some(credentials) => Ok(credentials),
                    // another task cleared the stale cell between our
                    // staleness check and this read; join the refresh that
                    // task kicked off (or start one)
                    None => inner.refresh().await,
                }
            }
        })
    }
}

#[derive(Clone)]
struct Cache {
    value: Arc<RwLock<OnceCell<Credentials>>>,
}

impl Cache {
    fn new() -> Cache {
        Cache {
            value: Arc::new(RwLock::new(OnceCell::new())),
        }
    }

    async fn get(&self) -> Option<Credentials> {
        self.value.read().await.get().cloned()
    }

    /// Single-flight load: concurrent callers all await the same future and
    /// receive the same result.
    async fn refresh<F, Fut>(&self, f: F) -> CredentialsResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CredentialsResult>,
    {
        let lock = self.value.read().await;
        let future = lock.get_or_try_init(f);
        future.await.map(|creds| creds.clone())
    }

    /// Returns true if the cache was cleared
    async fn clear_if_stale(&self, now: SystemTime, buffer_time: Duration) -> bool {
        let mut lock = self.value.write().await;

        // Only clear the cache if it hasn't been cleared by another task. If it
        // was already cleared, then another task is initializing the empty cell.
        if let Some(credentials) = lock.get() {
            let should_clear = credentials
                .expiry()
                .map(|expiration| now + buffer_time > expiration)
                .unwrap_or_else(|| {
                    warn!("cached credentials are missing an expiration time; this is a bug");
                    false
                });
            if should_clear {
                *lock = OnceCell::new();
                true
            } else {
                false
            }
        } else {
            false
        }
    }
}
