//! Per-URL expiration overrides.
//!
//! A [`UrlExpirationTable`] maps URL patterns to [`ExpireAfter`] values. It is
//! evaluated in insertion order and the first matching pattern wins, so more
//! specific patterns must be added before broader ones:
//!
//! | Pattern                   | Matches                                   |
//! |---------------------------|-------------------------------------------|
//! | `*.example.com`           | any subdomain of `example.com`, any path  |
//! | `*.example.com/images`    | any subdomain, paths under `/images`      |
//! | `example.com/api`         | `example.com/api`, `example.com/api/v1`…  |
//! | `*`                       | every URL                                 |
//! | `Regex` `example\.com/\d+`| searched anywhere in `host/path?query`    |
//!
//! Schemes are ignored on both sides.

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::expiration::ExpireAfter;

/// A URL pattern that failed to compile.
#[derive(Debug, Error)]
#[error("invalid URL pattern {pattern:?}: {source}")]
pub struct PatternError {
    pattern: String,
    #[source]
    source: regex::Error,
}

/// A compiled URL pattern.
#[derive(Debug, Clone)]
pub enum UrlPattern {
    /// A glob where `*` matches any run of characters and `?` one character.
    /// Matches as a prefix.
    Glob { glob: String, compiled: Regex },
    /// A regular expression searched for within the URL.
    Regex(Regex),
}

impl UrlPattern {
    /// Compiles a glob pattern. A leading `scheme://` is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the translated expression exceeds the regex size limits.
    pub fn glob(glob: &str) -> Result<Self, PatternError> {
        let stripped = strip_scheme(glob);
        let compiled = Regex::new(&glob_to_regex(stripped)).map_err(|source| PatternError {
            pattern: glob.to_owned(),
            source,
        })?;
        Ok(Self::Glob {
            glob: stripped.to_owned(),
            compiled,
        })
    }

    /// Compiles a regular expression.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if `pattern` is not a valid regex.
    pub fn regex(pattern: &str) -> Result<Self, PatternError> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|source| PatternError {
                pattern: pattern.to_owned(),
                source,
            })
    }

    /// Returns `true` if `url` matches. The URL's scheme is ignored.
    pub fn matches(&self, url: &str) -> bool {
        let url = strip_scheme(url);
        match self {
            Self::Glob { compiled, .. } => compiled.is_match(url),
            Self::Regex(regex) => regex.is_match(url),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Glob { glob, .. } => glob,
            Self::Regex(regex) => regex.as_str(),
        }
    }
}

impl From<Regex> for UrlPattern {
    fn from(regex: Regex) -> Self {
        Self::Regex(regex)
    }
}

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

// Anchored translation with an implicit trailing `*`, so globs match as prefixes.
fn glob_to_regex(glob: &str) -> String {
    let mut re = String::with_capacity(glob.len() * 2 + 4);
    re.push('^');
    let mut buf = [0u8; 4];
    for c in glob.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    re.push_str(".*$");
    re
}

/// Ordered URL pattern → expiration overrides.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::{get_url_expiration, ExpireAfter, UrlExpirationTable};
///
/// let table = UrlExpirationTable::new()
///     .glob("*.site_1.com/resource", 7200)?
///     .glob("*.site_1.com", 3600)?
///     .regex(r"site_2\.com/api/resource/\d+", 604800)?
///     .glob("*", 1)?;
///
/// assert_eq!(
///     get_url_expiration(Some("https://img.site_1.com/image.jpeg"), &table),
///     Some(&ExpireAfter::Seconds(3600.0))
/// );
/// assert_eq!(
///     get_url_expiration(Some("https://site_2.com/api/resource/42"), &table),
///     Some(&ExpireAfter::Seconds(604800.0))
/// );
/// assert_eq!(get_url_expiration(None, &table), None);
/// # Ok::<(), rttp_cache::cache::PatternError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct UrlExpirationTable {
    entries: Vec<(UrlPattern, ExpireAfter)>,
}

impl UrlExpirationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a compiled pattern.
    #[must_use]
    pub fn with(mut self, pattern: UrlPattern, expire_after: impl Into<ExpireAfter>) -> Self {
        self.push(pattern, expire_after);
        self
    }

    /// Appends a glob pattern.
    ///
    /// # Errors
    ///
    /// See [`UrlPattern::glob`].
    pub fn glob(
        self,
        glob: &str,
        expire_after: impl Into<ExpireAfter>,
    ) -> Result<Self, PatternError> {
        Ok(self.with(UrlPattern::glob(glob)?, expire_after))
    }

    /// Appends a regex pattern.
    ///
    /// # Errors
    ///
    /// See [`UrlPattern::regex`].
    pub fn regex(
        self,
        pattern: &str,
        expire_after: impl Into<ExpireAfter>,
    ) -> Result<Self, PatternError> {
        Ok(self.with(UrlPattern::regex(pattern)?, expire_after))
    }

    pub fn push(&mut self, pattern: UrlPattern, expire_after: impl Into<ExpireAfter>) {
        self.entries.push((pattern, expire_after.into()));
    }

    /// Returns the value of the first entry whose pattern matches `url`.
    pub fn lookup(&self, url: &str) -> Option<&ExpireAfter> {
        let (pattern, expire_after) = self
            .entries
            .iter()
            .find(|(pattern, _)| pattern.matches(url))?;
        debug!(url, pattern = pattern.as_str(), ?expire_after, "URL expiration override");
        Some(expire_after)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UrlPattern, &ExpireAfter)> {
        self.entries.iter().map(|(p, e)| (p, e))
    }
}

/// Looks up the expiration override for `url`. No URL, or no match, gives `None`.
pub fn get_url_expiration<'t>(
    url: Option<&str>,
    table: &'t UrlExpirationTable,
) -> Option<&'t ExpireAfter> {
    table.lookup(url.filter(|u| !u.is_empty())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seconds(n: i64) -> Option<ExpireAfter> {
        Some(ExpireAfter::from(n))
    }

    fn site_table() -> UrlExpirationTable {
        UrlExpirationTable::new()
            .glob("*.site_1.com", 60 * 60)
            .and_then(|t| t.glob("site_2.com/resource_1", 60 * 60 * 2))
            .and_then(|t| t.glob("site_2.com/resource_2", 60 * 60 * 24))
            .and_then(|t| t.regex(r"site_2\.com/api/resource/\d+", 60 * 60 * 24 * 7))
            .and_then(|t| t.glob("site_2.com/static", -1))
            .unwrap()
    }

    #[test]
    fn url_expiration_lookup() {
        let table = site_table();
        let cases = [
            ("img.site_1.com", seconds(60 * 60)),
            ("http://img.site_1.com/base/img.jpg", seconds(60 * 60)),
            ("https://img.site_2.com/base/img.jpg", None),
            ("site_2.com/resource_1", seconds(60 * 60 * 2)),
            ("http://site_2.com/resource_1/index.html", seconds(60 * 60 * 2)),
            ("http://site_2.com/resource_2/", seconds(60 * 60 * 24)),
            ("http://site_2.com/static/", seconds(-1)),
            ("http://site_2.com/api/resource/123", seconds(60 * 60 * 24 * 7)),
            ("http://site_2.com/api/resource/xyz", None),
            ("http://site_2.com/static/img.jpg", seconds(-1)),
            ("site_2.com", None),
            ("some_other_site.com", None),
        ];
        for (url, expected) in cases {
            assert_eq!(
                get_url_expiration(Some(url), &table).cloned(),
                expected,
                "{url}"
            );
        }
        assert_eq!(get_url_expiration(None, &table), None);
    }

    #[test]
    fn first_match_wins() {
        let table = UrlExpirationTable::new()
            .glob("*.site_1.com/resource", 60 * 60 * 2)
            .and_then(|t| t.glob("*.site_1.com", 60 * 60))
            .and_then(|t| t.glob("*", 1))
            .unwrap();
        let cases = [
            ("https://img.site_1.com/image.jpeg", seconds(60 * 60)),
            ("https://img.site_1.com/resource/1", seconds(60 * 60 * 2)),
            ("https://site_2.com", seconds(1)),
            ("https://any_other_site.com", seconds(1)),
        ];
        for (url, expected) in cases {
            assert_eq!(
                get_url_expiration(Some(url), &table).cloned(),
                expected,
                "{url}"
            );
        }
    }

    #[test]
    fn broad_pattern_first_shadows_specific_one() {
        let table = UrlExpirationTable::new()
            .glob("*.site_1.com", 60 * 60)
            .and_then(|t| t.glob("*.site_1.com/resource", 60 * 60 * 2))
            .unwrap();
        assert_eq!(
            table.lookup("https://img.site_1.com/resource/1").cloned(),
            seconds(60 * 60)
        );
    }

    #[test]
    fn urls_inside_the_query_do_not_hide_the_host() {
        let table = UrlExpirationTable::new()
            .glob("example.com/redirect", 3600)
            .and_then(|t| t.regex(r"example\.com/api", 60))
            .unwrap();
        assert_eq!(
            table
                .lookup("https://example.com/redirect?next=https://other.org/x")
                .cloned(),
            seconds(3600)
        );
        assert_eq!(
            table.lookup("https://example.com/api?cb=http://other.org").cloned(),
            seconds(60)
        );
        assert_eq!(
            table.lookup("https://other.org/?from=https://example.com/redirect"),
            None
        );
    }

    #[test]
    fn glob_metacharacters_are_literal() {
        let pattern = UrlPattern::glob("https://example.com/a+b(c)").unwrap();
        assert!(pattern.matches("http://example.com/a+b(c)/d"));
        assert!(!pattern.matches("example.com/aab(c)"));
        assert_eq!(pattern.as_str(), "example.com/a+b(c)");
    }

    #[test]
    fn invalid_regex_is_rejected() {
        assert!(UrlPattern::regex("site(").is_err());
    }

    #[test]
    fn empty_table_matches_nothing() {
        assert_eq!(
            get_url_expiration(Some("https://example.com"), &UrlExpirationTable::new()),
            None
        );
    }
}
