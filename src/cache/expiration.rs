//! Expiration resolution.
//!
//! An [`ExpireAfter`] value says how long a response may be cached, in
//! whatever form the caller or the response headers expressed it. The
//! [`ExpirationResolver`] turns it into an [`ExpirationDecision`] against a
//! single reading of its [`Clock`].

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use thiserror::Error;

/// Errors produced while resolving an expiration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpirationError {
    #[error("invalid HTTP date: {0:?}")]
    InvalidHttpDate(String),
}

/// How long a response may be cached.
///
/// Numbers convert into [`ExpireAfter::Seconds`], durations into
/// [`ExpireAfter::Duration`], timezone-aware datetimes into
/// [`ExpireAfter::At`] and strings into [`ExpireAfter::HttpDate`]:
///
/// ```
/// use rttp_cache::cache::ExpireAfter;
///
/// assert_eq!(ExpireAfter::from(60), ExpireAfter::Seconds(60.0));
/// assert_eq!(
///     ExpireAfter::from("Sun, 06 Nov 1994 08:49:37 GMT"),
///     ExpireAfter::HttpDate("Sun, 06 Nov 1994 08:49:37 GMT".to_owned())
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ExpireAfter {
    /// Cache indefinitely.
    Never,
    /// Cache, but treat as stale right away.
    Immediately,
    /// Do not cache at all.
    DoNotCache,
    /// Relative expiration in seconds. `0` expires immediately; negative values never expire.
    Seconds(f64),
    /// Relative expiration. Negative durations never expire.
    Duration(TimeDelta),
    /// Absolute expiration time.
    At(DateTime<FixedOffset>),
    /// Header text: an HTTP-date, or the literal `0` / `-1` some servers send in `Expires`.
    HttpDate(String),
}

impl From<i64> for ExpireAfter {
    fn from(seconds: i64) -> Self {
        Self::Seconds(seconds as f64)
    }
}

impl From<i32> for ExpireAfter {
    fn from(seconds: i32) -> Self {
        Self::Seconds(f64::from(seconds))
    }
}

impl From<f64> for ExpireAfter {
    fn from(seconds: f64) -> Self {
        Self::Seconds(seconds)
    }
}

impl From<TimeDelta> for ExpireAfter {
    fn from(delta: TimeDelta) -> Self {
        Self::Duration(delta)
    }
}

impl From<std::time::Duration> for ExpireAfter {
    fn from(duration: std::time::Duration) -> Self {
        Self::Duration(TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX))
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for ExpireAfter {
    fn from(at: DateTime<Tz>) -> Self {
        Self::At(at.fixed_offset())
    }
}

impl From<&str> for ExpireAfter {
    fn from(text: &str) -> Self {
        Self::HttpDate(text.to_owned())
    }
}

impl From<String> for ExpireAfter {
    fn from(text: String) -> Self {
        Self::HttpDate(text)
    }
}

/// The outcome of resolving an [`ExpireAfter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationDecision {
    /// Cache without an expiration time.
    NoExpiry,
    /// Cache until this instant.
    At(DateTime<Utc>),
    /// Do not cache.
    DoNotCache,
}

impl ExpirationDecision {
    /// Returns the expiration instant, if there is one.
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(at) => Some(*at),
            Self::NoExpiry | Self::DoNotCache => None,
        }
    }

    /// Returns `true` if a response cached under this decision is stale at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::NoExpiry => false,
            Self::At(at) => *at <= now,
            Self::DoNotCache => true,
        }
    }

    /// Time left until expiration, clamped at zero, for backends that store TTLs.
    ///
    /// `None` means the entry never expires.
    pub fn ttl(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        match self {
            Self::NoExpiry => None,
            Self::At(at) => Some((*at - now).to_std().unwrap_or_default()),
            Self::DoNotCache => Some(std::time::Duration::ZERO),
        }
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Resolves [`ExpireAfter`] values into [`ExpirationDecision`]s.
///
/// The clock is read once per call, so every comparison inside a call uses
/// the same instant.
///
/// # Examples
///
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use rttp_cache::cache::{ExpirationDecision, ExpirationResolver, ExpireAfter, FixedClock};
///
/// let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let resolver = ExpirationResolver::with_clock(FixedClock(now));
///
/// assert_eq!(
///     resolver.resolve(Some(&ExpireAfter::from(60))).unwrap(),
///     ExpirationDecision::At(now + TimeDelta::seconds(60))
/// );
/// assert_eq!(resolver.resolve(None).unwrap(), ExpirationDecision::NoExpiry);
/// assert!(resolver.resolve(Some(&ExpireAfter::from("not a date"))).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExpirationResolver<C = SystemClock> {
    clock: C,
    ignore_invalid_http_date: bool,
}

impl ExpirationResolver<SystemClock> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Clock> ExpirationResolver<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            ignore_invalid_http_date: false,
        }
    }

    /// Treat unparseable HTTP-dates as "no expiration" instead of an error.
    #[must_use]
    pub fn ignore_invalid_http_date(mut self, ignore: bool) -> Self {
        self.ignore_invalid_http_date = ignore;
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Resolves `expire_after`; `None` means no expiration was given.
    ///
    /// # Errors
    ///
    /// [`ExpirationError::InvalidHttpDate`] for header text that is neither an
    /// HTTP-date nor `0` / `-1`, unless invalid dates are ignored.
    pub fn resolve(
        &self,
        expire_after: Option<&ExpireAfter>,
    ) -> Result<ExpirationDecision, ExpirationError> {
        self.resolve_at(expire_after, self.clock.now())
    }

    /// Seconds until expiration, rounded up and never negative.
    ///
    /// `None` for values that never expire. [`ExpireAfter::DoNotCache`] yields `Some(0)`.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub fn expiration_seconds(
        &self,
        expire_after: Option<&ExpireAfter>,
    ) -> Result<Option<i64>, ExpirationError> {
        let now = self.clock.now();
        Ok(match self.resolve_at(expire_after, now)? {
            ExpirationDecision::NoExpiry => None,
            ExpirationDecision::DoNotCache => Some(0),
            ExpirationDecision::At(at) => {
                let remaining = at - now;
                let mut seconds = remaining.num_seconds();
                if remaining.subsec_nanos() > 0 {
                    seconds += 1;
                }
                Some(seconds.max(0))
            }
        })
    }

    fn resolve_at(
        &self,
        expire_after: Option<&ExpireAfter>,
        now: DateTime<Utc>,
    ) -> Result<ExpirationDecision, ExpirationError> {
        let Some(expire_after) = expire_after else {
            return Ok(ExpirationDecision::NoExpiry);
        };

        Ok(match expire_after {
            ExpireAfter::Never => ExpirationDecision::NoExpiry,
            ExpireAfter::DoNotCache => ExpirationDecision::DoNotCache,
            ExpireAfter::Immediately => ExpirationDecision::At(now),
            ExpireAfter::Seconds(seconds) => {
                if *seconds == 0.0 {
                    ExpirationDecision::At(now)
                } else if seconds.is_finite() && *seconds > 0.0 {
                    offset(now, TimeDelta::microseconds((seconds * 1_000_000.0).round() as i64))
                } else {
                    ExpirationDecision::NoExpiry
                }
            }
            ExpireAfter::Duration(delta) => {
                if *delta < TimeDelta::zero() {
                    ExpirationDecision::NoExpiry
                } else {
                    offset(now, *delta)
                }
            }
            ExpireAfter::At(at) => ExpirationDecision::At(at.with_timezone(&Utc)),
            ExpireAfter::HttpDate(text) => match text.trim() {
                "0" | "-1" => ExpirationDecision::At(now),
                trimmed => match httpdate::parse_http_date(trimmed) {
                    Ok(at) => ExpirationDecision::At(DateTime::<Utc>::from(at)),
                    Err(_) if self.ignore_invalid_http_date => ExpirationDecision::NoExpiry,
                    Err(_) => return Err(ExpirationError::InvalidHttpDate(text.clone())),
                },
            },
        })
    }
}

fn offset(now: DateTime<Utc>, delta: TimeDelta) -> ExpirationDecision {
    match now.checked_add_signed(delta) {
        Some(at) => ExpirationDecision::At(at),
        None => ExpirationDecision::NoExpiry,
    }
}

/// Resolves `expire_after` against the system clock.
///
/// # Errors
///
/// See [`ExpirationResolver::resolve`].
pub fn get_expiration_decision(
    expire_after: Option<&ExpireAfter>,
    ignore_invalid_http_date: bool,
) -> Result<ExpirationDecision, ExpirationError> {
    ExpirationResolver::new()
        .ignore_invalid_http_date(ignore_invalid_http_date)
        .resolve(expire_after)
}
