/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Credential types and providers.
//!
//! ## Implementing your own credentials provider
//!
//! While for many use cases a built-in provider is sufficient, you may want to
//! implement your own. [`Credentials`] implements [`ProvideCredentials`]
//! directly, so static credentials need no custom provider:
//! ```rust
//! use nimbus_credentials::Credentials;
//! let my_creds = Credentials::from_keys("akid", "secret_key", None);
//! ```
//! For dynamically loaded credentials, implement [`ProvideCredentials`]
//! yourself. Generally this is best done by defining an inherent `async fn` on
//! your structure and boxing it from the trait implementation, or by using
//! [`provide_credentials_fn`].
//!
//! [`ProvideCredentials`]: provider::ProvideCredentials
//! [`provide_credentials_fn`]: provider::provide_credentials_fn

pub mod chain;
pub mod fetch;
pub mod os_shim;
pub mod provider;

pub use chain::ChainProvider;
pub use provider::{CredentialsError, ProvideCredentials};

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// AWS SDK Credentials
///
/// An opaque struct representing credentials that may be used to sign requests.
/// Cloning is cheap; providers hand out clones of a shared inner allocation.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials(Arc<Inner>);

#[derive(Eq, PartialEq)]
struct Inner {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,

    /// A timepoint after which the credentials should no longer be used
    /// because they have expired. The primary purpose of this value is to
    /// allow credentials to communicate to the caching provider when they
    /// need to be refreshed.
    ///
    /// If these credentials never expire, this value will be `None`.
    expiry: Option<SystemTime>,

    provider_name: &'static str,
    anonymous: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut creds = f.debug_struct("Credentials");
        creds
            .field("provider_name", &self.0.provider_name)
            .field("access_key_id", &self.0.access_key_id)
            .field("secret_access_key", &"** redacted **");
        if self.0.session_token.is_some() {
            creds.field("session_token", &"** redacted **");
        }
        if let Some(expiry) = self.0.expiry {
            creds.field("expiry", &expiry);
        }
        creds.finish()
    }
}

const STATIC_CREDENTIALS: &str = "Static";
const ANONYMOUS_CREDENTIALS: &str = "Anonymous";

impl Credentials {
    /// Creates `Credentials`.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        expiry: Option<SystemTime>,
        provider_name: &'static str,
    ) -> Self {
        Credentials(Arc::new(Inner {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expiry,
            provider_name,
            anonymous: false,
        }))
    }

    /// Creates `Credentials` from hardcoded access key, secret key, and session token.
    pub fn from_keys(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self::new(
            access_key_id,
            secret_access_key,
            session_token,
            None,
            STATIC_CREDENTIALS,
        )
    }

    /// Creates a sentinel for unsigned requests. Clients skip signing entirely
    /// when the resolved credentials are anonymous.
    pub fn anonymous() -> Self {
        Credentials(Arc::new(Inner {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: None,
            expiry: None,
            provider_name: ANONYMOUS_CREDENTIALS,
            anonymous: true,
        }))
    }

    /// Returns true for the [`Credentials::anonymous`] sentinel.
    pub fn is_anonymous(&self) -> bool {
        self.0.anonymous
    }

    pub fn access_key_id(&self) -> &str {
        &self.0.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.0.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.0.session_token.as_deref()
    }

    pub fn expiry(&self) -> Option<SystemTime> {
        self.0.expiry
    }

    pub fn provider_name(&self) -> &'static str {
        self.0.provider_name
    }
}

#[cfg(test)]
mod test {
    use crate::Credentials;
    use std::time::{Duration, SystemTime};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn creds_are_send_sync() {
        assert_send_sync::<Credentials>()
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials::new(
            "AKIDEXAMPLE",
            "super-secret",
            Some("session-token".into()),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1234)),
            "Test",
        );
        let debugged = format!("{:?}", creds);
        assert!(debugged.contains("AKIDEXAMPLE"));
        assert!(!debugged.contains("super-secret"));
        assert!(!debugged.contains("session-token"));
        assert!(debugged.contains("** redacted **"));
    }

    #[test]
    fn anonymous_sentinel() {
        let creds = Credentials::anonymous();
        assert!(creds.is_anonymous());
        assert!(!Credentials::from_keys("a", "b", None).is_anonymous());
    }
}
