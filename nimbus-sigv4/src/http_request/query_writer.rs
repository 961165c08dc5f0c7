/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::http_request::url_escape::percent_encode;
use http::Uri;

/// Utility for appending percent-encoded query parameters onto an existing [`Uri`].
pub(crate) struct QueryWriter {
    base_uri: Uri,
    new_path_and_query: String,
    prefix: Option<char>,
}

impl QueryWriter {
    /// Creates a new `QueryWriter` based off the given `uri`.
    pub(crate) fn new(uri: &Uri) -> Self {
        let new_path_and_query = uri
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_default();
        let prefix = if uri.query().is_none() {
            Some('?')
        } else if uri.query() != Some("") {
            Some('&')
        } else {
            None
        };
        QueryWriter {
            base_uri: uri.clone(),
            new_path_and_query,
            prefix,
        }
    }

    /// Appends `key`=`value`, percent-encoding both.
    pub(crate) fn insert(&mut self, key: &str, value: &str) {
        if let Some(prefix) = self.prefix {
            self.new_path_and_query.push(prefix);
        }
        self.prefix = Some('&');
        self.new_path_and_query.push_str(&percent_encode(key));
        self.new_path_and_query.push('=');
        self.new_path_and_query.push_str(&percent_encode(value));
    }

    /// Returns a full [`Uri`] with the query parameters applied.
    pub(crate) fn build_uri(self) -> Uri {
        let mut parts = self.base_uri.into_parts();
        parts.path_and_query = Some(
            self.new_path_and_query
                .parse()
                .expect("adding percent-encoded query parameters keeps the URI valid"),
        );
        Uri::from_parts(parts).expect("parts are from a valid URI")
    }
}
