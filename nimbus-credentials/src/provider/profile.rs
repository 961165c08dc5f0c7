/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Load credentials from the shared credentials file (`~/.aws/credentials`).

use crate::os_shim::{Env, Fs};
use crate::provider::{BoxFuture, CredentialsError, CredentialsResult, ProvideCredentials};
use crate::Credentials;
use std::collections::HashMap;
use std::future;
use std::path::PathBuf;

const PROFILE_PROVIDER: &str = "SharedProfileFile";
const DEFAULT_PROFILE: &str = "default";

/// Loads credentials from the shared AWS credentials file.
///
/// The file location comes from `AWS_SHARED_CREDENTIALS_FILE`, falling back to
/// `$HOME/.aws/credentials`. The profile name comes from the builder override,
/// then `AWS_PROFILE`, then `default`.
pub struct ProfileFileCredentialsProvider {
    fs: Fs,
    env: Env,
    profile_override: Option<String>,
}

impl Default for ProfileFileCredentialsProvider {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProfileFileCredentialsProvider {
    pub fn builder() -> Builder {
        Builder::default()
    }

    fn selected_profile(&self) -> String {
        self.profile_override
            .clone()
            .or_else(|| self.env.get("AWS_PROFILE").ok())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    fn credentials_path(&self) -> Result<PathBuf, CredentialsError> {
        if let Ok(path) = self.env.get("AWS_SHARED_CREDENTIALS_FILE") {
            return Ok(PathBuf::from(path));
        }
        let home = self
            .env
            .get("HOME")
            .map_err(|_| CredentialsError::CredentialsNotLoaded)?;
        Ok([home.as_str(), ".aws", "credentials"].iter().collect())
    }

    fn credentials(&self) -> CredentialsResult {
        let path = self.credentials_path()?;
        let contents = match self.fs.read_to_end(&path) {
            Ok(contents) => contents,
            // a missing file means "no credentials here", not a hard failure
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredentialsError::CredentialsNotLoaded)
            }
            Err(err) => return Err(CredentialsError::ProviderError(Box::new(err))),
        };
        let contents = String::from_utf8(contents)
            .map_err(|err| CredentialsError::InvalidConfiguration(Box::new(err)))?;
        let profiles = parse_profiles(&contents)
            .map_err(|err| CredentialsError::InvalidConfiguration(err.into()))?;
        let profile_name = self.selected_profile();
        let profile = profiles
            .get(profile_name.as_str())
            .ok_or(CredentialsError::CredentialsNotLoaded)?;

        let access_key = profile
            .get("aws_access_key_id")
            .ok_or(CredentialsError::CredentialsNotLoaded)?;
        let secret_key = profile
            .get("aws_secret_access_key")
            .ok_or(CredentialsError::CredentialsNotLoaded)?;
        let session_token = profile.get("aws_session_token").cloned();
        Ok(Credentials::new(
            access_key,
            secret_key,
            session_token,
            None,
            PROFILE_PROVIDER,
        ))
    }
}

impl ProvideCredentials for ProfileFileCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> BoxFuture<'a, CredentialsResult>
    where
        Self: 'a,
    {
        Box::pin(future::ready(self.credentials()))
    }
}

#[derive(Default)]
pub struct Builder {
    fs: Option<Fs>,
    env: Option<Env>,
    profile_override: Option<String>,
}

impl Builder {
    /// Override the file system used by this provider. Intended for tests.
    pub fn fs(mut self, fs: Fs) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Override the environment used by this provider. Intended for tests.
    pub fn env(mut self, env: Env) -> Self {
        self.env = Some(env);
        self
    }

    /// Use a specific profile instead of `AWS_PROFILE` / `default`.
    pub fn profile_name(mut self, name: impl Into<String>) -> Self {
        self.profile_override = Some(name.into());
        self
    }

    pub fn build(self) -> ProfileFileCredentialsProvider {
        ProfileFileCredentialsProvider {
            fs: self.fs.unwrap_or_default(),
            env: self.env.unwrap_or_default(),
            profile_override: self.profile_override,
        }
    }
}

type Profiles = HashMap<String, HashMap<String, String>>;

/// Parses the INI-style credentials file into profile sections.
fn parse_profiles(contents: &str) -> Result<Profiles, String> {
    let mut profiles: Profiles = HashMap::new();
    let mut current: Option<String> = None;
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[') {
            let name = section
                .strip_suffix(']')
                .ok_or_else(|| format!("unclosed section header on line {}", idx + 1))?;
            // `[profile foo]` is config-file syntax but tolerated here
            let name = name.strip_prefix("profile ").unwrap_or(name).trim();
            profiles.entry(name.to_string()).or_default();
            current = Some(name.to_string());
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("expected `key = value` on line {}", idx + 1))?;
        let section = current
            .as_ref()
            .ok_or_else(|| format!("property before any section header on line {}", idx + 1))?;
        profiles
            .get_mut(section)
            .expect("section inserted when header was seen")
            .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(profiles)
}

#[cfg(test)]
mod test {
    use super::{parse_profiles, ProfileFileCredentialsProvider};
    use crate::os_shim::{Env, Fs};
    use crate::provider::{CredentialsError, ProvideCredentials};
    use std::collections::HashMap;

    const CREDENTIALS_FILE: &str = "[default]
aws_access_key_id = default-key
aws_secret_access_key = default-secret

# a second profile with a session token
[integration]
aws_access_key_id = int-key
aws_secret_access_key = int-secret
aws_session_token = int-token
";

    fn test_fs() -> Fs {
        let mut map = HashMap::new();
        map.insert(
            "/home/me/.aws/credentials".to_string(),
            CREDENTIALS_FILE.as_bytes().to_vec(),
        );
        Fs::from_map(map)
    }

    #[tokio::test]
    async fn loads_default_profile() {
        let provider = ProfileFileCredentialsProvider::builder()
            .fs(test_fs())
            .env(Env::from_slice(&[("HOME", "/home/me")]))
            .build();
        let creds = provider.provide_credentials().await.unwrap();
        assert_eq!("default-key", creds.access_key_id());
        assert_eq!(None, creds.session_token());
    }

    #[tokio::test]
    async fn profile_from_env() {
        let provider = ProfileFileCredentialsProvider::builder()
            .fs(test_fs())
            .env(Env::from_slice(&[
                ("HOME", "/home/me"),
                ("AWS_PROFILE", "integration"),
            ]))
            .build();
        let creds = provider.provide_credentials().await.unwrap();
        assert_eq!("int-key", creds.access_key_id());
        assert_eq!(Some("int-token"), creds.session_token());
    }

    #[tokio::test]
    async fn explicit_profile_beats_env() {
        let provider = ProfileFileCredentialsProvider::builder()
            .fs(test_fs())
            .env(Env::from_slice(&[
                ("HOME", "/home/me"),
                ("AWS_PROFILE", "default"),
            ]))
            .profile_name("integration")
            .build();
        let creds = provider.provide_credentials().await.unwrap();
        assert_eq!("int-key", creds.access_key_id());
    }

    #[tokio::test]
    async fn missing_file_is_not_loaded() {
        let provider = ProfileFileCredentialsProvider::builder()
            .fs(Fs::from_map(HashMap::new()))
            .env(Env::from_slice(&[("HOME", "/home/me")]))
            .build();
        let err = provider.provide_credentials().await.unwrap_err();
        assert!(matches!(err, CredentialsError::CredentialsNotLoaded));
    }

    #[tokio::test]
    async fn syntax_error_is_invalid_configuration() {
        let mut map = HashMap::new();
        map.insert(
            "/home/me/.aws/credentials".to_string(),
            b"[default\naws_access_key_id = k".to_vec(),
        );
        let provider = ProfileFileCredentialsProvider::builder()
            .fs(Fs::from_map(map))
            .env(Env::from_slice(&[("HOME", "/home/me")]))
            .build();
        let err = provider.provide_credentials().await.unwrap_err();
        assert!(matches!(err, CredentialsError::InvalidConfiguration(_)));
    }

    #[test]
    fn parses_sections_and_comments() {
        let profiles = parse_profiles(CREDENTIALS_FILE).unwrap();
        assert_eq!(2, profiles.len());
        assert_eq!(
            "int-token",
            profiles["integration"]["aws_session_token"].as_str()
        );
    }
}
