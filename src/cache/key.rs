//! Cache key derivation.
//!
//! A key is a digest over, in order: the method, the normalized URL, the
//! normalized body, the TLS verify flag, the matched header tokens and the
//! serializer identity. Each part is length-prefixed before hashing so that
//! moving bytes between adjacent parts changes the key.
//!
//! The digest is chosen once per [`KeyDeriver`]: truncated BLAKE3 where the
//! host allows it, SHA-256 on hosts running in FIPS mode.

use std::fmt;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use tracing::debug;

use super::normalize::{NormalizeError, NormalizedRequest, normalize_request};
use super::settings::{CryptoMode, IgnoredParameters, KeySettings, MatchHeaders};
use crate::http::RequestInput;

/// Number of BLAKE3 output bytes kept in a key (16 hex characters).
const BLAKE3_KEY_BYTES: usize = 8;

/// Kernel flag that is `1` when the host enforces FIPS-approved cryptography.
const FIPS_FLAG_PATH: &str = "/proc/sys/crypto/fips_enabled";

static DETECTED_MODE: OnceLock<CryptoMode> = OnceLock::new();

impl CryptoMode {
    /// Returns the crypto mode of the host. The probe runs once per process.
    pub fn detect() -> Self {
        *DETECTED_MODE.get_or_init(|| match std::fs::read_to_string(FIPS_FLAG_PATH) {
            Ok(flag) if flag.trim() == "1" => CryptoMode::Restricted,
            _ => CryptoMode::Standard,
        })
    }
}

/// Digest used to derive cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// BLAKE3, truncated to 8 bytes.
    Blake3,
    /// SHA-256, full length.
    Sha256,
}

impl HashAlgorithm {
    /// Candidates in order of preference.
    pub const PREFERENCE: [HashAlgorithm; 2] = [HashAlgorithm::Blake3, HashAlgorithm::Sha256];

    /// Returns `true` if this digest may be used under `mode`.
    pub fn is_supported(self, mode: CryptoMode) -> bool {
        match self {
            Self::Blake3 => mode == CryptoMode::Standard,
            Self::Sha256 => true,
        }
    }

    /// Picks the first supported digest from [`Self::PREFERENCE`].
    pub fn select(mode: CryptoMode) -> Self {
        Self::PREFERENCE
            .into_iter()
            .find(|algorithm| algorithm.is_supported(mode))
            .unwrap_or(Self::Sha256)
    }

    /// Length of a key produced with this digest, in hex characters.
    pub fn key_len(self) -> usize {
        match self {
            Self::Blake3 => BLAKE3_KEY_BYTES * 2,
            Self::Sha256 => 64,
        }
    }

    fn hasher(self) -> KeyHasher {
        match self {
            Self::Blake3 => KeyHasher::Blake3(Box::new(blake3::Hasher::new())),
            Self::Sha256 => KeyHasher::Sha256(Sha256::new()),
        }
    }
}

enum KeyHasher {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
}

impl KeyHasher {
    fn update_part(&mut self, part: &[u8]) {
        let len = (part.len() as u64).to_le_bytes();
        match self {
            Self::Blake3(hasher) => {
                hasher.update(&len);
                hasher.update(part);
            }
            Self::Sha256(hasher) => {
                hasher.update(len);
                hasher.update(part);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Blake3(hasher) => hex::encode(&hasher.finalize().as_bytes()[..BLAKE3_KEY_BYTES]),
            Self::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// An opaque, fixed-length, lowercase hexadecimal cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> String {
        key.0
    }
}

/// Hashes an already-normalized request together with its contextual tokens.
///
/// `matched_headers` is expected sorted, as produced by normalization.
pub fn derive_key(
    request: &NormalizedRequest,
    matched_headers: &[String],
    verify: bool,
    serializer: &str,
    algorithm: HashAlgorithm,
) -> CacheKey {
    let mut hasher = algorithm.hasher();
    hasher.update_part(request.method().as_str().as_bytes());
    hasher.update_part(request.url().as_bytes());
    hasher.update_part(request.body());
    hasher.update_part(if verify { b"true" } else { b"false" });
    for token in matched_headers {
        hasher.update_part(token.as_bytes());
    }
    hasher.update_part(serializer.as_bytes());
    CacheKey(hasher.finalize_hex())
}

/// Derives cache keys from requests according to [`KeySettings`].
///
/// The digest is selected when the deriver is built and reused for every key.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::{CryptoMode, KeyDeriver, KeySettings};
/// use rttp_cache::http::Request;
///
/// let deriver = KeyDeriver::new(
///     KeySettings::new()
///         .ignored_parameters(["api_key"])
///         .serializer("json-v1")
///         .crypto_mode(CryptoMode::Standard),
/// );
///
/// let a = Request::new("GET", "https://example.com/?b=2&a=1&api_key=one");
/// let b = Request::new("GET", "https://EXAMPLE.com/?a=1&api_key=two&b=2");
///
/// let key = deriver.create_key(&a).unwrap();
/// assert_eq!(key, deriver.create_key(&b).unwrap());
/// assert_eq!(key.as_str().len(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    settings: KeySettings,
    algorithm: HashAlgorithm,
}

impl KeyDeriver {
    /// Builds a deriver, detecting the host crypto mode unless the settings force one.
    pub fn new(settings: KeySettings) -> Self {
        let mode = settings.crypto_mode.unwrap_or_else(CryptoMode::detect);
        let algorithm = HashAlgorithm::select(mode);
        debug!(?mode, ?algorithm, "selected cache key digest");
        Self {
            settings,
            algorithm,
        }
    }

    pub fn settings(&self) -> &KeySettings {
        &self.settings
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Normalizes `request` with this deriver's ignored parameters and header selection.
    ///
    /// # Errors
    ///
    /// See [`normalize_request`].
    pub fn normalize<'a>(
        &self,
        request: impl Into<RequestInput<'a>>,
    ) -> Result<NormalizedRequest, NormalizeError> {
        normalize_request(
            request,
            &self.settings.ignored_parameters,
            &self.settings.match_headers,
            self.settings.content_root_key.as_deref(),
        )
    }

    /// Creates a key using the request's own TLS verify flag.
    ///
    /// # Errors
    ///
    /// See [`normalize_request`].
    pub fn create_key<'a>(
        &self,
        request: impl Into<RequestInput<'a>>,
    ) -> Result<CacheKey, NormalizeError> {
        let normalized = self.normalize(request)?;
        Ok(self.derive(&normalized, normalized.verify()))
    }

    /// Hashes a normalized request with an explicit verify flag.
    pub fn derive(&self, request: &NormalizedRequest, verify: bool) -> CacheKey {
        derive_key(
            request,
            request.matched_headers(),
            verify,
            &self.settings.serializer,
            self.algorithm,
        )
    }
}

/// Creates a cache key for `request`.
///
/// `verify` overrides the request's TLS verify flag when given. The digest is
/// selected from the host crypto mode.
///
/// # Errors
///
/// See [`normalize_request`].
pub fn create_key<'a>(
    request: impl Into<RequestInput<'a>>,
    ignored: &IgnoredParameters,
    match_headers: &MatchHeaders,
    serializer: &str,
    content_root_key: Option<&str>,
    verify: Option<bool>,
) -> Result<CacheKey, NormalizeError> {
    let normalized = normalize_request(request, ignored, match_headers, content_root_key)?;
    let verify = verify.unwrap_or(normalized.verify());
    Ok(derive_key(
        &normalized,
        normalized.matched_headers(),
        verify,
        serializer,
        HashAlgorithm::select(CryptoMode::detect()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{PreparedRequest, Request};

    fn deriver(settings: KeySettings) -> KeyDeriver {
        KeyDeriver::new(settings.crypto_mode(CryptoMode::Standard))
    }

    fn key(deriver: &KeyDeriver, request: &Request) -> CacheKey {
        deriver.create_key(request).unwrap()
    }

    #[test]
    fn restricted_mode_falls_back_to_sha256() {
        assert_eq!(HashAlgorithm::select(CryptoMode::Standard), HashAlgorithm::Blake3);
        assert_eq!(HashAlgorithm::select(CryptoMode::Restricted), HashAlgorithm::Sha256);

        let fips = KeyDeriver::new(KeySettings::new().crypto_mode(CryptoMode::Restricted));
        let key = fips.create_key(&Request::new("GET", "https://example.com")).unwrap();
        assert_eq!(key.as_str().len(), HashAlgorithm::Sha256.key_len());
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn keys_are_deterministic() {
        let d = deriver(KeySettings::new());
        let request = Request::new("GET", "https://example.com/a?x=1");
        let first = key(&d, &request);
        assert_eq!(first, key(&d, &request));
        assert_eq!(first, key(&deriver(KeySettings::new()), &request));
        assert_eq!(first.as_str().len(), HashAlgorithm::Blake3.key_len());
    }

    #[test]
    fn presentation_differences_do_not_change_the_key() {
        let d = deriver(KeySettings::new().match_headers(MatchHeaders::All));
        let a = Request::new("get", "https://Example.com:443/a?x=1&y=2")
            .header("Accept", "text/html, application/json")
            .json(serde_json::json!({"b": 1, "a": 2}));
        let b = Request::new("GET", "https://example.com/a?y=2&x=1")
            .header("ACCEPT", "application/json,text/html")
            .data(r#"{"a": 2, "b": 1}"#)
            .header("Content-Type", "application/json");
        assert_eq!(key(&d, &a), key(&d, &b));
    }

    #[test]
    fn every_part_changes_the_key() {
        let d = deriver(KeySettings::new().match_headers(MatchHeaders::only(["Accept"])));
        let base = Request::new("POST", "https://example.com/a")
            .header("Accept", "text/html")
            .data("body");
        let base_key = key(&d, &base);

        let variants = [
            Request::new("PUT", "https://example.com/a")
                .header("Accept", "text/html")
                .data("body"),
            Request::new("POST", "https://example.com/b")
                .header("Accept", "text/html")
                .data("body"),
            Request::new("POST", "https://example.com/a")
                .header("Accept", "text/html")
                .data("other"),
            Request::new("POST", "https://example.com/a")
                .header("Accept", "text/plain")
                .data("body"),
            Request::new("POST", "https://example.com/a")
                .header("Accept", "text/html")
                .data("body")
                .verify(false),
        ];
        for variant in &variants {
            assert_ne!(key(&d, variant), base_key);
        }

        let other_serializer = deriver(
            KeySettings::new()
                .match_headers(MatchHeaders::only(["Accept"]))
                .serializer("bson"),
        );
        assert_ne!(key(&other_serializer, &base), base_key);
    }

    #[test]
    fn unmatched_headers_do_not_change_the_key() {
        let d = deriver(KeySettings::new().match_headers(MatchHeaders::only(["Accept"])));
        let a = Request::new("GET", "https://example.com").header("Accept", "a");
        let b = a.clone().header("User-Agent", "curl");
        assert_eq!(key(&d, &a), key(&d, &b));

        let none = deriver(KeySettings::new());
        let c = Request::new("GET", "https://example.com").header("Accept", "b");
        assert_eq!(key(&none, &a), key(&none, &c));
    }

    #[test]
    fn redacted_parameter_presence_still_counts() {
        let d = deriver(KeySettings::new().ignored_parameters(["token"]));
        let with_one = Request::new("GET", "https://example.com/?q=1&token=one");
        let with_two = Request::new("GET", "https://example.com/?q=1&token=two");
        let without = Request::new("GET", "https://example.com/?q=1");
        assert_eq!(key(&d, &with_one), key(&d, &with_two));
        assert_ne!(key(&d, &with_one), key(&d, &without));
    }

    #[test]
    fn large_json_integers_change_the_key() {
        let d = deriver(KeySettings::new());
        let request = |body: &str| {
            PreparedRequest::new("POST", "https://example.com/items")
                .header("Content-Type", "application/json")
                .body(body.to_owned())
        };
        assert_ne!(
            d.create_key(&request(r#"{"id": 18446744073709551616}"#)).unwrap(),
            d.create_key(&request(r#"{"id": 18446744073709551617}"#)).unwrap()
        );
    }

    #[test]
    fn part_boundaries_are_unambiguous() {
        let d = deriver(KeySettings::new());
        let a = PreparedRequest::new("POST", "https://example.com/a").body("bc");
        let b = PreparedRequest::new("POST", "https://example.com/ab").body("c");
        assert_ne!(d.create_key(&a).unwrap(), d.create_key(&b).unwrap());
    }

    #[test]
    fn free_function_matches_verify_override() {
        let request = Request::new("GET", "https://example.com").verify(false);
        let ignored = IgnoredParameters::new();
        let implicit =
            create_key(&request, &ignored, &MatchHeaders::None, "", None, None).unwrap();
        let forced =
            create_key(&request, &ignored, &MatchHeaders::None, "", None, Some(true)).unwrap();
        assert_ne!(implicit, forced);
    }
}
