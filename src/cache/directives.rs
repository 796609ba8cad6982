//! `Cache-Control` translation.
//!
//! [`build_cache_control_headers`] turns caching intents into request
//! directives for consumers that only understand standard headers.
//! [`CacheDirectives`] goes the other way and reads the caching headers of a
//! request or response.

use super::expiration::{Clock, ExpirationError, ExpirationResolver, ExpireAfter, SystemClock};
use crate::http::Headers;

/// Marker set instead of `Cache-Control` when a request must not be cached.
///
/// `Cache-Control: no-store` would also stop a downstream cache from serving
/// an existing entry, which is not what "do not cache this response" means.
pub const ACTUAL_NO_CACHE_HEADER: &str = "X-Actual-No-Cache";

/// Caching intents for a single request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDirectives {
    /// Expiration to advertise as `max-age`.
    pub expire_after: Option<ExpireAfter>,
    /// Only answer from cache (`only-if-cached`).
    pub only_if_cached: bool,
    /// Revalidate a cached response with the server before using it (`must-revalidate`).
    pub refresh: bool,
    /// Ignore any cached response and fetch a new one (`no-cache`).
    pub force_refresh: bool,
}

impl RequestDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn expire_after(mut self, expire_after: impl Into<ExpireAfter>) -> Self {
        self.expire_after = Some(expire_after.into());
        self
    }

    #[must_use]
    pub fn only_if_cached(mut self, only_if_cached: bool) -> Self {
        self.only_if_cached = only_if_cached;
        self
    }

    #[must_use]
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    #[must_use]
    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Returns a copy of `headers` carrying these directives, using the system clock.
    ///
    /// # Errors
    ///
    /// [`ExpirationError::InvalidHttpDate`] when `expire_after` is unparseable header text.
    pub fn apply(&self, headers: &Headers) -> Result<Headers, ExpirationError> {
        self.apply_with(&ExpirationResolver::<SystemClock>::new(), headers)
    }

    /// Returns a copy of `headers` carrying these directives.
    ///
    /// Existing `Cache-Control` tokens are kept, except `max-age` when a new
    /// one is emitted. Tokens are deduplicated, sorted and comma-joined.
    ///
    /// # Errors
    ///
    /// See [`apply`](Self::apply).
    pub fn apply_with<C: Clock>(
        &self,
        resolver: &ExpirationResolver<C>,
        headers: &Headers,
    ) -> Result<Headers, ExpirationError> {
        let mut headers = headers.clone();

        if self.expire_after == Some(ExpireAfter::DoNotCache) {
            headers.remove("cache-control");
            headers.set(ACTUAL_NO_CACHE_HEADER, "true");
            return Ok(headers);
        }

        let max_age = resolver.expiration_seconds(self.expire_after.as_ref())?;

        let mut tokens: Vec<String> = headers
            .get_all("cache-control")
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .filter(|token| max_age.is_none() || !is_max_age(token))
            .map(str::to_owned)
            .collect();
        if let Some(seconds) = max_age {
            tokens.push(format!("max-age={seconds}"));
        }
        if self.only_if_cached {
            tokens.push("only-if-cached".to_owned());
        }
        if self.refresh {
            tokens.push("must-revalidate".to_owned());
        }
        if self.force_refresh {
            tokens.push("no-cache".to_owned());
        }

        tokens.sort_unstable();
        tokens.dedup();
        if !tokens.is_empty() {
            headers.set("Cache-Control", tokens.join(","));
        }
        Ok(headers)
    }
}

fn is_max_age(token: &str) -> bool {
    let name = token.split_once('=').map_or(token, |(name, _)| name);
    name.trim().eq_ignore_ascii_case("max-age")
}

/// Returns a copy of `headers` with `Cache-Control` directives for the given intents.
///
/// With [`ExpireAfter::DoNotCache`] the result has the [`ACTUAL_NO_CACHE_HEADER`]
/// marker and no `Cache-Control` header at all.
///
/// # Errors
///
/// [`ExpirationError::InvalidHttpDate`] when `expire_after` is unparseable header text.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::build_cache_control_headers;
/// use rttp_cache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("ETag", "123456");
///
/// let headers =
///     build_cache_control_headers(&headers, Some(&60.into()), true, true, true).unwrap();
/// assert_eq!(
///     headers.get("cache-control"),
///     Some("max-age=60,must-revalidate,no-cache,only-if-cached")
/// );
/// assert_eq!(headers.get("etag"), Some("123456"));
/// ```
pub fn build_cache_control_headers(
    headers: &Headers,
    expire_after: Option<&ExpireAfter>,
    only_if_cached: bool,
    refresh: bool,
    force_refresh: bool,
) -> Result<Headers, ExpirationError> {
    RequestDirectives {
        expire_after: expire_after.cloned(),
        only_if_cached,
        refresh,
        force_refresh,
    }
    .apply(headers)
}

/// Caching-related headers parsed from a request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDirectives {
    pub max_age: Option<i64>,
    pub no_cache: bool,
    pub no_store: bool,
    pub only_if_cached: bool,
    pub must_revalidate: bool,
    pub immutable: bool,
    pub stale_if_error: Option<i64>,
    pub stale_while_revalidate: Option<i64>,
    pub expires: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheDirectives {
    /// Parses `Cache-Control`, `Expires`, `ETag` and `Last-Modified`.
    ///
    /// Unknown directives and directives with unparseable values are ignored.
    ///
    /// ```
    /// use rttp_cache::cache::{CacheDirectives, ExpireAfter};
    /// use rttp_cache::http::Headers;
    ///
    /// let mut headers = Headers::new();
    /// headers.insert("Cache-Control", "public, Max-Age=\"600\", stale-if-error=30");
    /// headers.insert("ETag", "\"abc\"");
    ///
    /// let directives = CacheDirectives::from_headers(&headers);
    /// assert_eq!(directives.max_age, Some(600));
    /// assert_eq!(directives.stale_if_error, Some(30));
    /// assert!(directives.has_validator());
    /// assert_eq!(directives.expire_after(), Some(ExpireAfter::Seconds(600.0)));
    /// ```
    pub fn from_headers(headers: &Headers) -> Self {
        let mut directives = Self {
            expires: headers.get("expires").map(str::to_owned),
            etag: headers.get("etag").map(str::to_owned),
            last_modified: headers.get("last-modified").map(str::to_owned),
            ..Self::default()
        };

        for token in headers
            .get_all("cache-control")
            .flat_map(|value| value.split(','))
        {
            let (name, value) = match token.split_once('=') {
                Some((name, value)) => (name, Some(value.trim().trim_matches('"'))),
                None => (token, None),
            };
            let seconds = value.and_then(|v| v.parse::<i64>().ok());
            match name.trim().to_ascii_lowercase().as_str() {
                "max-age" => directives.max_age = seconds.or(directives.max_age),
                "no-cache" => directives.no_cache = true,
                "no-store" => directives.no_store = true,
                "only-if-cached" => directives.only_if_cached = true,
                "must-revalidate" => directives.must_revalidate = true,
                "immutable" => directives.immutable = true,
                "stale-if-error" => directives.stale_if_error = seconds,
                "stale-while-revalidate" => directives.stale_while_revalidate = seconds,
                _ => {}
            }
        }
        directives
    }

    /// Expiration implied by these headers, if any.
    ///
    /// `no-store` wins over everything, then `immutable`, then `max-age`,
    /// then the `Expires` header.
    pub fn expire_after(&self) -> Option<ExpireAfter> {
        if self.no_store {
            Some(ExpireAfter::DoNotCache)
        } else if self.immutable {
            Some(ExpireAfter::Never)
        } else if let Some(max_age) = self.max_age {
            Some(ExpireAfter::from(max_age))
        } else {
            self.expires.clone().map(ExpireAfter::HttpDate)
        }
    }

    /// Returns `true` if there is an `ETag` or `Last-Modified` to revalidate with.
    pub fn has_validator(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::cache::{ExpirationDecision, FixedClock};

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs.iter().copied().collect()
    }

    #[test]
    fn all_intents() {
        let out = build_cache_control_headers(
            &headers(&[("ETag", "123456")]),
            Some(&ExpireAfter::from(60)),
            true,
            true,
            true,
        )
        .unwrap();
        assert_eq!(
            out.get("Cache-Control"),
            Some("max-age=60,must-revalidate,no-cache,only-if-cached")
        );
        assert_eq!(out.get("ETag"), Some("123456"));
    }

    #[test]
    fn do_not_cache_sets_marker_only() {
        let out = build_cache_control_headers(
            &headers(&[("Cache-Control", "max-age=5")]),
            Some(&ExpireAfter::DoNotCache),
            false,
            false,
            false,
        )
        .unwrap();
        assert!(out.contains(ACTUAL_NO_CACHE_HEADER));
        assert!(!out.contains("cache-control"));
    }

    #[test]
    fn no_intents_leave_headers_untouched() {
        let original = headers(&[("Accept", "*/*")]);
        let out = build_cache_control_headers(&original, None, false, false, false).unwrap();
        assert_eq!(out, original);
    }

    #[test]
    fn existing_directives_are_merged() {
        let out = RequestDirectives::new()
            .expire_after(30)
            .force_refresh(true)
            .apply(&headers(&[("Cache-Control", "no-cache, max-age=5, no-transform")]))
            .unwrap();
        assert_eq!(
            out.get("cache-control"),
            Some("max-age=30,no-cache,no-transform")
        );
    }

    #[test]
    fn existing_max_age_is_replaced_regardless_of_case() {
        let out = RequestDirectives::new()
            .expire_after(30)
            .apply(&headers(&[("Cache-Control", "Max-Age=5, public")]))
            .unwrap();
        assert_eq!(out.get("cache-control"), Some("max-age=30,public"));

        let kept = RequestDirectives::new()
            .only_if_cached(true)
            .apply(&headers(&[("Cache-Control", "Max-Age=5")]))
            .unwrap();
        assert_eq!(kept.get("cache-control"), Some("Max-Age=5,only-if-cached"));
    }

    #[test]
    fn never_expire_emits_no_max_age() {
        let out = RequestDirectives::new()
            .expire_after(ExpireAfter::Never)
            .only_if_cached(true)
            .apply(&Headers::new())
            .unwrap();
        assert_eq!(out.get("cache-control"), Some("only-if-cached"));
    }

    #[test]
    fn absolute_expiration_becomes_relative_max_age() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let resolver = ExpirationResolver::with_clock(FixedClock(now));
        let out = RequestDirectives::new()
            .expire_after("Mon, 01 Jan 2024 00:02:00 GMT")
            .apply_with(&resolver, &Headers::new())
            .unwrap();
        assert_eq!(out.get("cache-control"), Some("max-age=120"));
    }

    #[test]
    fn invalid_http_date_is_an_error() {
        let err = RequestDirectives::new()
            .expire_after("soon")
            .apply(&Headers::new())
            .unwrap_err();
        assert_eq!(err, ExpirationError::InvalidHttpDate("soon".to_owned()));
    }

    #[test]
    fn parse_response_directives() {
        let directives = CacheDirectives::from_headers(&headers(&[
            ("Cache-Control", "no-cache, must-revalidate"),
            ("cache-control", "max-age=abc, stale-while-revalidate=10"),
            ("Expires", "0"),
            ("Last-Modified", "Sun, 06 Nov 1994 08:49:37 GMT"),
        ]));
        assert!(directives.no_cache);
        assert!(directives.must_revalidate);
        assert_eq!(directives.max_age, None);
        assert_eq!(directives.stale_while_revalidate, Some(10));
        assert!(directives.has_validator());
        assert_eq!(
            directives.expire_after(),
            Some(ExpireAfter::HttpDate("0".to_owned()))
        );
    }

    #[test]
    fn expires_zero_header_resolves_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let resolver = ExpirationResolver::with_clock(FixedClock(now));
        let expire_after = CacheDirectives::from_headers(&headers(&[("Expires", "-1")]))
            .expire_after();
        assert_eq!(
            resolver.resolve(expire_after.as_ref()).unwrap(),
            ExpirationDecision::At(now)
        );
    }

    #[test]
    fn no_store_and_immutable() {
        let no_store = CacheDirectives::from_headers(&headers(&[(
            "Cache-Control",
            "immutable, no-store, max-age=60",
        )]));
        assert_eq!(no_store.expire_after(), Some(ExpireAfter::DoNotCache));

        let immutable =
            CacheDirectives::from_headers(&headers(&[("Cache-Control", "immutable, max-age=60")]));
        assert_eq!(immutable.expire_after(), Some(ExpireAfter::Never));
        assert_eq!(CacheDirectives::default().expire_after(), None);
    }
}
