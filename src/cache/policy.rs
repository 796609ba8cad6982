//! Choosing which expiration applies to a request.

use super::expiration::{
    Clock, ExpirationDecision, ExpirationError, ExpirationResolver, ExpireAfter, SystemClock,
};
use super::patterns::{UrlExpirationTable, get_url_expiration};

/// Session-level expiration settings.
///
/// Precedence, highest first: the value given for the individual request,
/// the first matching entry of the URL table, then the policy default.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::{ExpirationPolicy, ExpireAfter, UrlExpirationTable};
///
/// let policy = ExpirationPolicy::new()
///     .expire_after(300)
///     .urls_expire_after(UrlExpirationTable::new().glob("*.cdn.example.com", ExpireAfter::Never)?);
///
/// assert_eq!(
///     policy.expire_after_for(Some("https://img.cdn.example.com/a.png"), None),
///     &ExpireAfter::Never
/// );
/// assert_eq!(
///     policy.expire_after_for(Some("https://example.com/"), None),
///     &ExpireAfter::Seconds(300.0)
/// );
/// assert_eq!(
///     policy.expire_after_for(Some("https://example.com/"), Some(&ExpireAfter::DoNotCache)),
///     &ExpireAfter::DoNotCache
/// );
/// # Ok::<(), rttp_cache::cache::PatternError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ExpirationPolicy {
    expire_after: ExpireAfter,
    urls_expire_after: UrlExpirationTable,
    ignore_invalid_http_date: bool,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self {
            expire_after: ExpireAfter::Never,
            urls_expire_after: UrlExpirationTable::new(),
            ignore_invalid_http_date: false,
        }
    }
}

impl ExpirationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default expiration for requests without a more specific one.
    #[must_use]
    pub fn expire_after(mut self, expire_after: impl Into<ExpireAfter>) -> Self {
        self.expire_after = expire_after.into();
        self
    }

    #[must_use]
    pub fn urls_expire_after(mut self, table: UrlExpirationTable) -> Self {
        self.urls_expire_after = table;
        self
    }

    #[must_use]
    pub fn ignore_invalid_http_date(mut self, ignore: bool) -> Self {
        self.ignore_invalid_http_date = ignore;
        self
    }

    /// Picks the expiration that applies to a request for `url`.
    pub fn expire_after_for<'a>(
        &'a self,
        url: Option<&str>,
        request_expire_after: Option<&'a ExpireAfter>,
    ) -> &'a ExpireAfter {
        request_expire_after
            .or_else(|| get_url_expiration(url, &self.urls_expire_after))
            .unwrap_or(&self.expire_after)
    }

    /// Resolves the applicable expiration against the system clock.
    ///
    /// # Errors
    ///
    /// See [`ExpirationResolver::resolve`].
    pub fn decide(
        &self,
        url: Option<&str>,
        request_expire_after: Option<&ExpireAfter>,
    ) -> Result<ExpirationDecision, ExpirationError> {
        self.decide_with(SystemClock, url, request_expire_after)
    }

    /// Resolves the applicable expiration against `clock`.
    ///
    /// # Errors
    ///
    /// See [`ExpirationResolver::resolve`].
    pub fn decide_with<C: Clock>(
        &self,
        clock: C,
        url: Option<&str>,
        request_expire_after: Option<&ExpireAfter>,
    ) -> Result<ExpirationDecision, ExpirationError> {
        ExpirationResolver::with_clock(clock)
            .ignore_invalid_http_date(self.ignore_invalid_http_date)
            .resolve(Some(self.expire_after_for(url, request_expire_after)))
    }
}
