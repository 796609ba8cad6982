//! Key derivation settings.
//!
//! [`KeySettings`] is a plain struct with builder setters; it also derives
//! [`serde::Deserialize`] so applications can load it from their own config
//! files:
//!
//! ```
//! use rttp_cache::cache::{KeySettings, MatchHeaders};
//!
//! let settings: KeySettings = serde_json::from_str(
//!     r#"{
//!         "ignored_parameters": ["api_key", "Authorization"],
//!         "match_headers": ["Accept", "Accept-Language"],
//!         "serializer": "json-v1"
//!     }"#,
//! )
//! .unwrap();
//!
//! assert!(settings.ignored_parameters.contains("api_key"));
//! assert_eq!(
//!     settings.match_headers,
//!     MatchHeaders::Only(vec!["Accept".into(), "Accept-Language".into()])
//! );
//! ```

use std::collections::BTreeSet;

use serde::Deserialize;

/// Value written in place of an ignored parameter.
pub const REDACTED: &str = "REDACTED";

/// Names of query params, headers and body fields whose values must not be
/// fingerprinted or persisted.
///
/// Query and body names match exactly; header names match case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct IgnoredParameters {
    names: BTreeSet<String>,
}

impl IgnoredParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn contains_header(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for IgnoredParameters {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Vec<String>> for IgnoredParameters {
    fn from(names: Vec<String>) -> Self {
        names.into_iter().collect()
    }
}

/// Which request headers contribute to the cache key.
///
/// Deserializes from `false` / `true` or a list of header names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "MatchHeadersRepr")]
pub enum MatchHeaders {
    #[default]
    None,
    All,
    Only(Vec<String>),
}

impl MatchHeaders {
    /// Builds an explicit list from header names.
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MatchHeadersRepr {
    Flag(bool),
    Names(Vec<String>),
}

impl From<MatchHeadersRepr> for MatchHeaders {
    fn from(repr: MatchHeadersRepr) -> Self {
        match repr {
            MatchHeadersRepr::Flag(false) => Self::None,
            MatchHeadersRepr::Flag(true) => Self::All,
            MatchHeadersRepr::Names(names) => Self::Only(names),
        }
    }
}

/// Cryptography policy of the running system.
///
/// In [`CryptoMode::Restricted`] only FIPS-approved digests may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptoMode {
    Standard,
    Restricted,
}

/// Everything besides the request itself that shapes a cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    /// Parameters to redact from URLs, headers and bodies.
    pub ignored_parameters: IgnoredParameters,
    /// Headers to include in the key.
    pub match_headers: MatchHeaders,
    /// Identity of the serializer that stores responses under this key.
    pub serializer: String,
    /// Top-level JSON field to which `ignored_parameters` is scoped.
    pub content_root_key: Option<String>,
    /// Forces a crypto mode instead of detecting it from the host.
    pub crypto_mode: Option<CryptoMode>,
}

impl KeySettings {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ignored_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_parameters = names.into_iter().collect();
        self
    }

    #[must_use]
    pub fn match_headers(mut self, match_headers: MatchHeaders) -> Self {
        self.match_headers = match_headers;
        self
    }

    #[must_use]
    pub fn serializer(mut self, serializer: impl Into<String>) -> Self {
        self.serializer = serializer.into();
        self
    }

    #[must_use]
    pub fn content_root_key(mut self, key: impl Into<String>) -> Self {
        self.content_root_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn crypto_mode(mut self, mode: CryptoMode) -> Self {
        self.crypto_mode = Some(mode);
        self
    }
}
