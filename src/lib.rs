//! # rttp-cache
//!
//! Fingerprinting and freshness for HTTP response caches.
//!
//! Two requests that differ only in presentation (query or header order,
//! header name casing, JSON key order, URL case, default ports) produce the
//! same cache key. Parameters named as ignored are masked with `REDACTED`
//! before hashing and before a response is stored. Expirations given as
//! seconds, durations, datetimes, HTTP-dates or per-URL patterns resolve to a
//! single absolute instant.
//!
//! ## Quick Start
//!
//! ```rust
//! use rttp_cache::cache::{
//!     ExpirationDecision, ExpirationPolicy, KeyDeriver, KeySettings, MatchHeaders,
//!     UrlExpirationTable,
//! };
//! use rttp_cache::http::Request;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let deriver = KeyDeriver::new(
//!         KeySettings::new()
//!             .ignored_parameters(["api_key"])
//!             .match_headers(MatchHeaders::only(["Accept"])),
//!     );
//!
//!     let a = Request::new("GET", "https://example.com/items?page=2&api_key=one");
//!     let b = Request::new("get", "https://EXAMPLE.com:443/items?api_key=two&page=2");
//!     assert_eq!(deriver.create_key(&a)?, deriver.create_key(&b)?);
//!
//!     let policy = ExpirationPolicy::new()
//!         .expire_after(60)
//!         .urls_expire_after(UrlExpirationTable::new().glob("example.com/static", -1)?);
//!     assert_eq!(
//!         policy.decide(Some("https://example.com/static/app.js"), None)?,
//!         ExpirationDecision::NoExpiry
//!     );
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod http;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{
    CacheKey, ExpirationDecision, ExpirationPolicy, ExpireAfter, IgnoredParameters, KeyDeriver,
    KeySettings, MatchHeaders,
};
pub use http::{Headers, Method, PreparedRequest, Request};
