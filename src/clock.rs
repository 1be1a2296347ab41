//! Injectable time source for expiry decisions.
//!
//! All expiry comparisons in the crate go through the [`Clock`] trait, which
//! reports absolute instants as `u64` nanoseconds since the Unix epoch. The
//! value `0` is reserved to mean "no expiry", matching the persistence
//! contract's "expiry zero = no expiry" convention, so a single `u64` travels
//! unchanged between the memory tier and persistence backends.
//!
//! Production code uses [`SystemClock`]; tests substitute [`ManualClock`] to
//! drive expiry deterministically.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use tierkit::clock::{Clock, ManualClock};
//!
//! let clock = ManualClock::new(1_000);
//! assert_eq!(clock.now_nanos(), 1_000);
//!
//! clock.advance(Duration::from_millis(5));
//! assert_eq!(clock.now_nanos(), 5_001_000);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of absolute instants with nanosecond resolution.
///
/// Implementations must be cheap to call on the read path; the memory tier
/// consults the clock once per `get` and once per `set`.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current instant as nanoseconds since the Unix epoch.
    ///
    /// Never returns `0`; that value is reserved for "no expiry".
    fn now_nanos(&self) -> u64;
}

/// Computes an absolute expiry instant from a TTL.
///
/// Returns `0` ("no expiry") for a zero TTL. Saturates instead of wrapping
/// for absurdly large TTLs.
#[inline]
pub(crate) fn expiry_at(now: u64, ttl: Duration) -> u64 {
    if ttl.is_zero() {
        return 0;
    }
    let ttl_nanos = u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX);
    now.saturating_add(ttl_nanos)
}

/// Returns `true` if an entry with the given expiry instant is expired at `now`.
///
/// An expiry of `0` means the entry never expires.
#[inline]
pub(crate) fn is_expired(expiry: u64, now: u64) -> bool {
    expiry != 0 && now > expiry
}

/// Wall-clock [`Clock`] backed by [`SystemTime`].
///
/// Wall time (rather than a process-local monotonic clock) is used so that
/// expiry instants written to a persistence tier remain meaningful across
/// process restarts; the environments this cache targets lose the process
/// routinely.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        // Clamp into u64 range and away from the reserved 0.
        u64::try_from(nanos).unwrap_or(u64::MAX).max(1)
    }
}

/// Controllable [`Clock`] for deterministic tests.
///
/// Starts at a caller-chosen instant and only moves when told to.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tierkit::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::default();
/// let before = clock.now_nanos();
/// clock.advance(Duration::from_secs(1));
/// assert_eq!(clock.now_nanos(), before + 1_000_000_000);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock reporting `now_nanos` until advanced.
    pub fn new(now_nanos: u64) -> Self {
        Self {
            now: AtomicU64::new(now_nanos.max(1)),
        }
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let nanos = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        self.now.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Moves the clock to an absolute instant.
    ///
    /// The instant is clamped away from the reserved `0`.
    pub fn set(&self, now_nanos: u64) {
        self.now.store(now_nanos.max(1), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    /// Starts at one second past the epoch, comfortably clear of `0`.
    fn default() -> Self {
        Self::new(1_000_000_000)
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==============================================
    // Expiry arithmetic
    // ==============================================

    #[test]
    fn zero_ttl_means_no_expiry() {
        assert_eq!(expiry_at(123, Duration::ZERO), 0);
    }

    #[test]
    fn positive_ttl_adds_to_now() {
        assert_eq!(expiry_at(1_000, Duration::from_nanos(500)), 1_500);
    }

    #[test]
    fn huge_ttl_saturates() {
        assert_eq!(expiry_at(u64::MAX - 1, Duration::from_secs(60)), u64::MAX);
    }

    #[test]
    fn expiry_zero_never_expires() {
        assert!(!is_expired(0, u64::MAX));
    }

    #[test]
    fn expiry_is_inclusive_at_the_instant() {
        // `now == expiry` is not yet expired; one nanosecond later it is.
        assert!(!is_expired(1_000, 1_000));
        assert!(is_expired(1_000, 1_001));
    }

    // ==============================================
    // Clocks
    // ==============================================

    #[test]
    fn system_clock_is_nonzero_and_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now_nanos();
        let b = clock.now_nanos();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(10);
        clock.advance(Duration::from_nanos(5));
        assert_eq!(clock.now_nanos(), 15);
    }

    #[test]
    fn manual_clock_set_clamps_zero() {
        let clock = ManualClock::new(10);
        clock.set(0);
        assert_eq!(clock.now_nanos(), 1);
    }
}
