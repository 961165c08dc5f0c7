/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Endpoint resolution and the endpoint-discovery cache.

use crate::error::SdkError;
use http::Uri;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Regions of the public AWS partition with static regional endpoints.
const KNOWN_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "eu-central-1",
    "eu-north-1",
    "eu-south-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
];

/// Determines the base URI for a request: an explicit override if the config
/// carries one, otherwise the static regional endpoint.
pub(crate) fn resolve_endpoint(
    endpoint_override: Option<&Uri>,
    service: &str,
    region: &str,
) -> Result<Uri, SdkError> {
    if let Some(uri) = endpoint_override {
        return Ok(uri.clone());
    }
    if !KNOWN_REGIONS.contains(&region) {
        return Err(SdkError::UnsupportedRegion(region.to_string()));
    }
    let authority = format!("{}.{}.amazonaws.com", service, region);
    Uri::builder()
        .scheme("https")
        .authority(authority.as_str())
        .path_and_query("/")
        .build()
        .map_err(SdkError::construction)
}

/// Rewrites a request URI onto `endpoint`, keeping the request's own path and
/// query.
pub(crate) fn apply_endpoint(uri: &Uri, endpoint: &Uri) -> Result<Uri, http::Error> {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut builder = Uri::builder().path_and_query(path);
    if let Some(scheme) = endpoint.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = endpoint.authority() {
        builder = builder.authority(authority.clone());
    }
    builder.build()
}

/// An endpoint returned by a discovery call, with the server-supplied cache
/// period.
///
/// A zero or negative `cache_period` means the endpoint is already expired but
/// is still remembered as a degraded fallback.
#[derive(Clone, Debug)]
pub struct DiscoveredEndpoint {
    pub address: String,
    pub cache_period_seconds: i64,
}

impl DiscoveredEndpoint {
    pub fn new(address: impl Into<String>, cache_period_seconds: i64) -> Self {
        DiscoveredEndpoint {
            address: address.into(),
            cache_period_seconds,
        }
    }

    fn expires_at(&self, now: SystemTime) -> SystemTime {
        if self.cache_period_seconds >= 0 {
            now + Duration::from_secs(self.cache_period_seconds as u64)
        } else {
            now - Duration::from_secs(self.cache_period_seconds.unsigned_abs())
        }
    }
}

#[derive(Clone, Debug)]
struct CachedEndpoint {
    address: String,
    expires_at: SystemTime,
}

/// Cache of discovered endpoints, keyed by region key.
///
/// Expired entries are retained until explicitly removed so that calls can
/// proceed on a stale endpoint when discovery is temporarily unavailable.
#[derive(Clone, Debug, Default)]
pub struct EndpointCache {
    entries: Arc<Mutex<HashMap<String, Vec<CachedEndpoint>>>>,
}

impl EndpointCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_endpoints(&self, region_key: impl Into<String>, endpoints: Vec<DiscoveredEndpoint>) {
        let now = SystemTime::now();
        let mut entries = self.lock();
        let slot = entries.entry(region_key.into()).or_default();
        for endpoint in endpoints {
            slot.push(CachedEndpoint {
                expires_at: endpoint.expires_at(now),
                address: endpoint.address,
            });
        }
    }

    /// The best non-expired endpoint for the key: the entry whose expiry is
    /// furthest in the future.
    pub fn active_endpoint(&self, region_key: &str) -> Option<String> {
        let now = SystemTime::now();
        self.lock()
            .get(region_key)?
            .iter()
            .filter(|e| e.expires_at > now)
            .max_by_key(|e| e.expires_at)
            .map(|e| e.address.clone())
    }

    /// The best expired endpoint for the key, as a degraded fallback: the
    /// entry that expired most recently.
    pub fn expired_endpoint(&self, region_key: &str) -> Option<String> {
        let now = SystemTime::now();
        self.lock()
            .get(region_key)?
            .iter()
            .filter(|e| e.expires_at <= now)
            .max_by_key(|e| e.expires_at)
            .map(|e| e.address.clone())
    }

    /// Evicts an address across all region keys. Used when a discovered
    /// endpoint starts failing.
    pub fn remove_endpoint(&self, address: &str) {
        let mut entries = self.lock();
        for slot in entries.values_mut() {
            slot.retain(|e| e.address != address);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<CachedEndpoint>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
