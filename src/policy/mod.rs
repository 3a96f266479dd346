//! Cache policy: how long a stored response stays fresh, and how hard to
//! retry a contended write.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::duration_ms;
use crate::http::{Request, Response};

const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const WEEK: f64 = 7.0 * DAY;
const MONTH: f64 = 30.0 * DAY;

/// Symbolic maximum age of a cached response.
///
/// Deserializes from `"one_hour"`-style names for the fixed variants and
/// `{"hours": 1.5}`-style objects for the scaled ones.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rcache::policy::MaxAge;
///
/// assert_eq!(MaxAge::OneHour.duration(), Duration::from_secs(3600));
/// assert_eq!(MaxAge::Minutes(1.5).duration(), Duration::from_secs(90));
/// assert_eq!(MaxAge::Infinity.duration(), Duration::MAX);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxAge {
    TenMinutes,
    ThirtyMinutes,
    Minutes(f64),
    OneHour,
    TwoHours,
    SixHours,
    TwelveHours,
    Hours(f64),
    OneDay,
    Days(f64),
    OneWeek,
    Weeks(f64),
    /// Thirty days.
    OneMonth,
    /// Multiples of thirty days.
    Months(f64),
    Seconds(f64),
    /// Never expires.
    Infinity,
}

impl MaxAge {
    /// Resolves the age to a concrete duration.
    ///
    /// Scaled variants saturate: negative or NaN factors give zero, overflow
    /// gives [`Duration::MAX`], which is also the `Infinity` sentinel.
    pub fn duration(self) -> Duration {
        let seconds = match self {
            Self::TenMinutes => 10.0 * MINUTE,
            Self::ThirtyMinutes => 30.0 * MINUTE,
            Self::Minutes(n) => n * MINUTE,
            Self::OneHour => HOUR,
            Self::TwoHours => 2.0 * HOUR,
            Self::SixHours => 6.0 * HOUR,
            Self::TwelveHours => 12.0 * HOUR,
            Self::Hours(n) => n * HOUR,
            Self::OneDay => DAY,
            Self::Days(n) => n * DAY,
            Self::OneWeek => WEEK,
            Self::Weeks(n) => n * WEEK,
            Self::OneMonth => MONTH,
            Self::Months(n) => n * MONTH,
            Self::Seconds(n) => n,
            Self::Infinity => return Duration::MAX,
        };
        seconds_to_duration(seconds)
    }

    /// Returns `true` for [`MaxAge::Infinity`].
    pub fn is_infinite(self) -> bool {
        matches!(self, Self::Infinity)
    }
}

fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Freshness window and write-retry budget applied to a request.
///
/// Immutable once built. Deserializes from
/// `{"max_age": ..., "retry_count": 3, "initial_retry_delay_ms": 1000}`
/// with every field optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    max_age: MaxAge,
    retry_count: u32,
    #[serde(rename = "initial_retry_delay_ms", with = "duration_ms")]
    initial_retry_delay: Duration,
}

impl CachePolicy {
    /// Number of contention retries used by [`CachePolicy::new`].
    pub const DEFAULT_RETRY_COUNT: u32 = 3;

    /// First backoff delay used by [`CachePolicy::new`].
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

    /// Creates a policy with the given age and the default retry budget.
    pub fn new(max_age: MaxAge) -> Self {
        Self::with_retry(max_age, Self::DEFAULT_RETRY_COUNT, Self::DEFAULT_RETRY_DELAY)
    }

    /// Creates a policy with an explicit retry budget.
    pub fn with_retry(max_age: MaxAge, retry_count: u32, initial_retry_delay: Duration) -> Self {
        Self {
            max_age,
            retry_count,
            initial_retry_delay,
        }
    }

    /// A policy whose records never expire.
    pub fn no_expiry() -> Self {
        Self::new(MaxAge::Infinity)
    }

    /// How long a stored record stays fresh.
    pub fn max_age(&self) -> MaxAge {
        self.max_age
    }

    /// Retries allowed after a contended write.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Delay before the first retry; later ones double it.
    pub fn initial_retry_delay(&self) -> Duration {
        self.initial_retry_delay
    }

    /// Returns `true` if a record of the given age is past its window.
    ///
    /// The boundary is fresh: an age exactly equal to the max age is not expired.
    pub fn is_expired(&self, age: Duration) -> bool {
        age > self.max_age.duration()
    }

    /// Same as [`is_expired`](Self::is_expired) with the age taken from
    /// timestamps. A `last_modified` in the future counts as age zero.
    pub fn is_expired_at(&self, last_modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age = (now - last_modified).to_std().unwrap_or(Duration::ZERO);
        self.is_expired(age)
    }
}

impl Default for CachePolicy {
    /// One hour, three retries, one second initial delay.
    fn default() -> Self {
        Self::new(MaxAge::OneHour)
    }
}

/// Decides whether a fetched response is worth persisting.
pub type ShouldCache = Arc<dyn Fn(&Response, &Request) -> bool + Send + Sync + 'static>;

/// Picks a per-request policy; `None` falls back to the global one.
pub type PolicyResolver = Arc<dyn Fn(&Request) -> Option<CachePolicy> + Send + Sync + 'static>;

/// The default predicate: cache everything.
pub fn cache_always() -> ShouldCache {
    Arc::new(|_, _| true)
}

/// A predicate that caches only 2xx responses.
pub fn cache_successful() -> ShouldCache {
    Arc::new(|response, _| response.is_success())
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn symbolic_ages() {
        assert_eq!(MaxAge::TenMinutes.duration(), Duration::from_secs(600));
        assert_eq!(MaxAge::TwelveHours.duration(), Duration::from_secs(12 * 3600));
        assert_eq!(MaxAge::OneWeek.duration(), Duration::from_secs(7 * 86_400));
        assert_eq!(MaxAge::OneMonth.duration(), Duration::from_secs(30 * 86_400));
    }

    #[test]
    fn scaled_ages_are_monotonic() {
        assert!(MaxAge::Hours(1.0).duration() < MaxAge::Hours(2.0).duration());
        assert_eq!(MaxAge::Days(2.0).duration(), MaxAge::Hours(48.0).duration());
        assert_eq!(MaxAge::Months(1.0).duration(), MaxAge::OneMonth.duration());
    }

    #[test]
    fn degenerate_factors_saturate() {
        assert_eq!(MaxAge::Seconds(-5.0).duration(), Duration::ZERO);
        assert_eq!(MaxAge::Seconds(f64::NAN).duration(), Duration::ZERO);
        assert_eq!(MaxAge::Weeks(f64::MAX).duration(), Duration::MAX);
        assert_eq!(MaxAge::Seconds(f64::INFINITY).duration(), Duration::MAX);
    }

    #[test]
    fn defaults_match_documented_values() {
        let p = CachePolicy::default();
        assert_eq!(p.max_age(), MaxAge::OneHour);
        assert_eq!(p.retry_count(), 3);
        assert_eq!(p.initial_retry_delay(), Duration::from_secs(1));
        assert!(CachePolicy::no_expiry().max_age().is_infinite());
    }

    #[test]
    fn freshness_boundary_is_strict() {
        let p = CachePolicy::default();
        let hour = Duration::from_secs(3600);
        assert!(!p.is_expired(hour));
        assert!(p.is_expired(hour + Duration::from_nanos(1)));
        assert!(!p.is_expired(Duration::ZERO));
    }

    #[test]
    fn expiry_from_timestamps() {
        let p = CachePolicy::default();
        let now = Utc::now();
        assert!(!p.is_expired_at(now - TimeDelta::hours(1), now));
        assert!(p.is_expired_at(now - TimeDelta::hours(2), now));
        assert!(!p.is_expired_at(now + TimeDelta::minutes(5), now));
    }

    #[test]
    fn infinite_policy_never_expires() {
        let p = CachePolicy::no_expiry();
        assert!(!p.is_expired(Duration::from_secs(u64::MAX / 2)));
        assert!(!p.is_expired(Duration::MAX));
    }

    #[test]
    fn deserializes_from_json() {
        let p: CachePolicy = serde_json::from_str(
            r#"{"max_age": {"hours": 2.0}, "retry_count": 5, "initial_retry_delay_ms": 250}"#,
        )
        .unwrap();
        assert_eq!(p.max_age(), MaxAge::Hours(2.0));
        assert_eq!(p.retry_count(), 5);
        assert_eq!(p.initial_retry_delay(), Duration::from_millis(250));

        let p: CachePolicy = serde_json::from_str(r#"{"max_age": "infinity"}"#).unwrap();
        assert_eq!(p, CachePolicy::no_expiry());
    }

    #[test]
    fn success_predicate_checks_status() {
        let request = Request::get("http://example.com/");
        let should_cache = cache_successful();
        assert!(should_cache(&Response::new(200), &request));
        assert!(!should_cache(&Response::new(503), &request));
        assert!(cache_always()(&Response::new(503), &request));
    }
}
