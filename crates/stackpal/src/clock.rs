//! Millisecond clock over a host tick counter.
//!
//! A [`TimeSource`] supplies two things: a raw counter reading and the
//! resolution needed to turn counter deltas into time. [`Clock`] calibrates
//! once (baseline reading + resolution) and from then on reports the
//! milliseconds elapsed since that baseline, truncated to a wrapping 32-bit
//! [`Timestamp`].
//!
//! Backends:
//!
//! - [`HostCounter`] (default): the host's monotonic counter through
//!   `std::time::Instant` (performance counter, `CLOCK_MONOTONIC` or the Mach
//!   absolute clock depending on the target).
//! - [`WallCounter`]: microseconds of wall time. Wall time can step backwards;
//!   the clock never reports that.
//! - `ManualCounter` (simulation, in the `sim` module).

use std::fmt::{self, Display};
use std::num::{NonZeroU32, NonZeroU64};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::error::{PalError, fatal};

// ============================================================================
// Timestamp
// ============================================================================

/// Wrapping 32-bit millisecond timestamp.
///
/// The epoch is the clock's calibration point, so timestamps from different
/// clocks (or processes) are not comparable. Ordering is only meaningful
/// between timestamps less than half a wrap period (~24.8 days) apart, which
/// is why this type has no `Ord` impl; use [`Timestamp::is_after`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp(u32);

impl Timestamp {
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Truncates a 64-bit elapsed count to the wrapping representation.
    const fn from_elapsed(millis: u64) -> Self {
        Self(millis as u32)
    }

    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Milliseconds from `earlier` to `self`, across at most one wrap.
    pub const fn wrapping_elapsed_since(self, earlier: Timestamp) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Wrap-aware "strictly later than".
    pub const fn is_after(self, other: Timestamp) -> bool {
        (self.0.wrapping_sub(other.0) as i32) > 0
    }

    pub const fn wrapping_add(self, millis: u32) -> Self {
        Self(self.0.wrapping_add(millis))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<u32> for Timestamp {
    fn from(millis: u32) -> Self {
        Self(millis)
    }
}

impl From<Timestamp> for u32 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

// ============================================================================
// Counter resolution
// ============================================================================

/// How a backend's ticks convert to time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterResolution {
    /// Fixed tick rate in ticks per second.
    Frequency(NonZeroU64),
    /// `ticks * numer / denom` nanoseconds (Mach-style timebase).
    Timebase { numer: NonZeroU32, denom: NonZeroU32 },
}

impl CounterResolution {
    /// One tick per nanosecond.
    pub const NANOSECONDS: Self = Self::Frequency(NonZeroU64::new(1_000_000_000).unwrap());

    /// One tick per millisecond.
    pub const MILLISECONDS: Self = Self::Frequency(NonZeroU64::new(1_000).unwrap());

    /// One tick per microsecond.
    pub const MICROSECONDS: Self = Self::Frequency(NonZeroU64::new(1_000_000).unwrap());

    pub fn frequency(ticks_per_second: u64) -> Result<Self, PalError> {
        NonZeroU64::new(ticks_per_second)
            .map(Self::Frequency)
            .ok_or_else(|| PalError::InvalidResolution {
                reason: "counter frequency is zero".to_string(),
            })
    }

    pub fn timebase(numer: u32, denom: u32) -> Result<Self, PalError> {
        match (NonZeroU32::new(numer), NonZeroU32::new(denom)) {
            (Some(numer), Some(denom)) => Ok(Self::Timebase { numer, denom }),
            _ => Err(PalError::InvalidResolution {
                reason: format!("timebase {numer}/{denom} has a zero term"),
            }),
        }
    }

    /// Converts a tick delta to whole milliseconds, truncating.
    ///
    /// The product is formed in 128 bits, so no realistic frequency or uptime
    /// can overflow before the division.
    pub fn ticks_to_millis(self, ticks: u64) -> u64 {
        let ticks = u128::from(ticks);
        let millis = match self {
            Self::Frequency(hz) => ticks * 1_000 / u128::from(hz.get()),
            Self::Timebase { numer, denom } => {
                ticks * u128::from(numer.get()) / u128::from(denom.get()) / 1_000_000
            }
        };
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// Time sources
// ============================================================================

/// A host tick counter.
pub trait TimeSource: Send + Sync {
    /// Reads the raw counter.
    fn read(&self) -> Result<u64, PalError>;

    /// Reports the counter's resolution. Queried once, at calibration.
    fn resolution(&self) -> Result<CounterResolution, PalError>;
}

impl<T: TimeSource + ?Sized> TimeSource for Box<T> {
    #[inline]
    fn read(&self) -> Result<u64, PalError> {
        (**self).read()
    }

    fn resolution(&self) -> Result<CounterResolution, PalError> {
        (**self).resolution()
    }
}

/// The host's monotonic counter, in nanoseconds since construction.
#[derive(Debug, Clone, Copy)]
pub struct HostCounter {
    anchor: Instant,
}

impl HostCounter {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }
}

impl Default for HostCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for HostCounter {
    #[inline]
    fn read(&self) -> Result<u64, PalError> {
        Ok(u64::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(u64::MAX))
    }

    fn resolution(&self) -> Result<CounterResolution, PalError> {
        Ok(CounterResolution::NANOSECONDS)
    }
}

/// Wall time in microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallCounter;

impl TimeSource for WallCounter {
    fn read(&self) -> Result<u64, PalError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PalError::ClockUnavailable {
                reason: format!("wall clock before Unix epoch: {e}"),
            })?;
        Ok(u64::try_from(since_epoch.as_micros()).unwrap_or(u64::MAX))
    }

    fn resolution(&self) -> Result<CounterResolution, PalError> {
        Ok(CounterResolution::MICROSECONDS)
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Reference point captured at calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub baseline: u64,
    pub resolution: CounterResolution,
}

impl Calibration {
    fn capture<S: TimeSource + ?Sized>(source: &S) -> Result<Self, PalError> {
        let resolution = source.resolution()?;
        let baseline = source.read()?;
        tracing::debug!(baseline, ?resolution, "clock calibrated");
        Ok(Self {
            baseline,
            resolution,
        })
    }
}

/// Lazily calibrated, non-decreasing millisecond clock.
///
/// Calibration runs at most once per clock. Every later call to
/// [`Clock::calibrate`] returns the stored reference point, so a reader that
/// captured a timestamp before a second calibration attempt never sees the
/// clock move backwards. A failed calibration is remembered too: the host
/// facility is treated as absent for the life of the clock.
#[derive(Debug)]
pub struct Clock<S> {
    source: S,
    calibration: OnceLock<Result<Calibration, PalError>>,
    /// Largest elapsed value handed out so far.
    high_water: AtomicU64,
}

impl<S: TimeSource> Clock<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            calibration: OnceLock::new(),
            high_water: AtomicU64::new(0),
        }
    }

    /// Calibrates on first use; afterwards returns the stored reference point.
    pub fn calibrate(&self) -> Result<Calibration, PalError> {
        self.calibration
            .get_or_init(|| Calibration::capture(&self.source))
            .clone()
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.calibration.get(), Some(Ok(_)))
    }

    /// Milliseconds since calibration, never less than a previous result.
    pub fn try_elapsed_millis(&self) -> Result<u64, PalError> {
        let calibration = self.calibrate()?;
        let ticks = self.source.read()?;
        let elapsed = calibration
            .resolution
            .ticks_to_millis(ticks.saturating_sub(calibration.baseline));
        let previous = self.high_water.fetch_max(elapsed, Ordering::AcqRel);
        Ok(previous.max(elapsed))
    }

    pub fn try_now(&self) -> Result<Timestamp, PalError> {
        self.try_elapsed_millis().map(Timestamp::from_elapsed)
    }

    /// Current timestamp. A missing host counter is fatal.
    pub fn now(&self) -> Timestamp {
        self.try_now().unwrap_or_else(|e| fatal(&e))
    }

    /// Same reading as [`Clock::now`]; kept for engines that poll "jiffies".
    pub fn jiffies(&self) -> Timestamp {
        self.now()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl Default for Clock<HostCounter> {
    fn default() -> Self {
        Self::new(HostCounter::new())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;
    use crate::sim::ManualCounter;

    #[test_case(CounterResolution::frequency(1_000).unwrap(), 1_500, 1_500; "one tick per millisecond")]
    #[test_case(CounterResolution::frequency(10_000_000).unwrap(), 25_000_000, 2_500; "10 MHz performance counter")]
    #[test_case(CounterResolution::NANOSECONDS, 1_999_999, 1; "truncates instead of rounding")]
    #[test_case(CounterResolution::timebase(125, 3).unwrap(), 24_000_000, 1_000; "arm64 mach timebase")]
    #[test_case(CounterResolution::timebase(1, 1).unwrap(), 5_000_000, 5; "unit timebase")]
    fn ticks_to_millis(resolution: CounterResolution, ticks: u64, expected: u64) {
        assert_eq!(resolution.ticks_to_millis(ticks), expected);
    }

    #[test]
    fn zero_resolution_is_rejected() {
        assert!(matches!(
            CounterResolution::frequency(0),
            Err(PalError::InvalidResolution { .. })
        ));
        assert!(CounterResolution::timebase(0, 1).is_err());
        assert!(CounterResolution::timebase(1, 0).is_err());
    }

    #[test]
    fn high_frequency_counter_does_not_overflow_over_long_uptime() {
        // 10 GHz for 30 days: ticks * 1000 overflows u64 but not u128.
        let hz = 10_000_000_000u64;
        let resolution = CounterResolution::frequency(hz).unwrap();
        let thirty_days = Duration::from_secs(30 * 24 * 3600);
        let ticks = hz * thirty_days.as_secs();

        assert_eq!(
            resolution.ticks_to_millis(ticks),
            thirty_days.as_millis() as u64
        );
    }

    #[test]
    fn timestamp_wraps_at_32_bits() {
        let before = Timestamp::from_millis(u32::MAX - 4);
        let after = before.wrapping_add(10);

        assert_eq!(after.as_millis(), 5);
        assert_eq!(after.wrapping_elapsed_since(before), 10);
        assert!(after.is_after(before));
        assert!(!before.is_after(after));
        assert!(!before.is_after(before));
    }

    #[test]
    fn clock_starts_at_zero_and_tracks_counter() {
        let counter = ManualCounter::millis();
        counter.set(40_000);
        let clock = Clock::new(counter.clone());

        assert_eq!(clock.now().as_millis(), 0);
        counter.advance(250);
        assert_eq!(clock.now().as_millis(), 250);
        assert_eq!(clock.jiffies().as_millis(), 250);
    }

    #[test]
    fn recalibration_keeps_the_baseline() {
        let counter = ManualCounter::millis();
        let clock = Clock::new(counter.clone());

        let first = clock.calibrate().unwrap();
        counter.advance(1_000);
        let t0 = clock.now();

        let second = clock.calibrate().unwrap();
        assert_eq!(first, second);
        assert!(clock.now().wrapping_elapsed_since(t0) < u32::MAX / 2);
        assert_eq!(clock.now(), t0);
    }

    #[test]
    fn counter_stepping_back_is_never_observed() {
        let counter = ManualCounter::millis();
        counter.set(10_000);
        let clock = Clock::new(counter.clone());
        clock.calibrate().unwrap();

        counter.advance(500);
        assert_eq!(clock.now().as_millis(), 500);

        // A stepped-back wall clock, both above and below the baseline.
        counter.set(10_200);
        assert_eq!(clock.now().as_millis(), 500);
        counter.set(9_000);
        assert_eq!(clock.now().as_millis(), 500);

        counter.set(10_700);
        assert_eq!(clock.now().as_millis(), 700);
    }

    #[test]
    fn failed_calibration_is_reported_and_remembered() {
        let counter = ManualCounter::millis();
        counter.fail_reads(true);
        let clock = Clock::new(counter.clone());

        assert!(matches!(
            clock.try_now(),
            Err(PalError::ClockUnavailable { .. })
        ));

        counter.fail_reads(false);
        assert!(clock.try_now().is_err());
        assert!(!clock.is_calibrated());
    }

    #[test]
    #[should_panic(expected = "clock source unavailable")]
    fn missing_clock_is_fatal_for_now() {
        let counter = ManualCounter::millis();
        counter.fail_reads(true);
        let clock = Clock::new(counter);

        let _ = clock.now();
    }

    #[test]
    fn host_counter_is_monotonic() {
        let clock = Clock::default();
        let mut previous = clock.try_elapsed_millis().unwrap();
        for _ in 0..10_000 {
            let next = clock.try_elapsed_millis().unwrap();
            assert!(next >= previous);
            previous = next;
        }
    }

    #[test]
    fn wall_counter_reads_after_epoch() {
        let clock = Clock::new(WallCounter);
        let t0 = clock.now();
        let t1 = clock.now();
        assert!(!t0.is_after(t1));
    }

    #[test]
    fn boxed_source_works() {
        let clock: Clock<Box<dyn TimeSource>> = Clock::new(Box::new(HostCounter::new()));
        assert!(clock.try_now().is_ok());
        assert!(clock.is_calibrated());
    }

    proptest! {
        /// Frequency conversion agrees with `Duration` arithmetic.
        #[test]
        fn prop_frequency_matches_duration(
            hz in 1u64..=20_000_000_000u64,
            ticks in any::<u64>(),
        ) {
            let resolution = CounterResolution::frequency(hz).unwrap();
            let expected = (u128::from(ticks) * 1_000 / u128::from(hz)).min(u128::from(u64::MAX));
            prop_assert_eq!(u128::from(resolution.ticks_to_millis(ticks)), expected);
        }

        /// More ticks never means fewer milliseconds.
        #[test]
        fn prop_conversion_is_monotonic(
            numer in 1u32..=1_000u32,
            denom in 1u32..=1_000u32,
            a in any::<u64>(),
            b in any::<u64>(),
        ) {
            let resolution = CounterResolution::timebase(numer, denom).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(resolution.ticks_to_millis(lo) <= resolution.ticks_to_millis(hi));
        }

        /// Wrap-aware elapsed time survives the 32-bit boundary.
        #[test]
        fn prop_elapsed_across_wrap(start in any::<u32>(), delta in 0u32..(u32::MAX / 2)) {
            let t0 = Timestamp::from_millis(start);
            let t1 = t0.wrapping_add(delta);
            prop_assert_eq!(t1.wrapping_elapsed_since(t0), delta);
            prop_assert_eq!(t1.is_after(t0), delta > 0);
        }
    }
}
