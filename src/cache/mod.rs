//! Response-cache fingerprinting and freshness.
//!
//! The pieces a cache backend needs before it can store or look up a response:
//!
//! - [`normalize`]: canonical form of a request, with ignored parameters masked
//! - [`key`]: the cache key, a digest over the normalized request
//! - [`expiration`]: turning an [`ExpireAfter`] into an absolute [`ExpirationDecision`]
//! - [`patterns`]: per-URL expiration overrides
//! - [`policy`]: precedence between request, URL and session expirations
//! - [`directives`]: reading and writing `Cache-Control`
//! - [`redact`]: scrubbing ignored parameters from a response before storage
//!
//! Storage itself, eviction and the transport are left to the caller.

pub mod directives;
pub mod expiration;
pub mod key;
pub mod normalize;
pub mod patterns;
pub mod policy;
pub mod redact;
pub mod settings;

pub use directives::{
    ACTUAL_NO_CACHE_HEADER, CacheDirectives, RequestDirectives, build_cache_control_headers,
};
pub use expiration::{
    Clock, ExpirationDecision, ExpirationError, ExpirationResolver, ExpireAfter, FixedClock,
    SystemClock, get_expiration_decision,
};
pub use key::{CacheKey, HashAlgorithm, KeyDeriver, create_key, derive_key};
pub use normalize::{
    Diagnostic, MAX_NORM_BODY_SIZE, NormalizeError, NormalizedRequest, filter_url,
    matched_header_tokens, normalize_headers, normalize_params, normalize_request, normalize_url,
};
pub use patterns::{PatternError, UrlExpirationTable, UrlPattern, get_url_expiration};
pub use policy::ExpirationPolicy;
pub use redact::redact_response;
pub use settings::{CryptoMode, IgnoredParameters, KeySettings, MatchHeaders, REDACTED};
