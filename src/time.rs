//! Tick clock: signed nanoseconds at a fixed frequency.
//!
//! Durations, timeouts, timestamps, and rates throughout the crate are
//! expressed in ticks. Two clocks are exposed: `clock()` reads the wall
//! clock (used to timestamp datagrams), `elapsed()` reads a monotonic
//! clock anchored at first use (used for rate measurement and timed
//! waits, where regressions would be fatal).

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::{NetError, Result};

/// Signed tick count. One tick is one nanosecond.
pub type Ticks = i64;

/// Ticks per second.
pub const FREQUENCY: Ticks = 1_000_000_000;

/// Returns the tick frequency in ticks per second.
pub fn frequency() -> Ticks {
    FREQUENCY
}

/// Reads the wall clock as ticks since the POSIX epoch.
///
/// Fails with `Invalid` if the system clock is set before the epoch.
pub fn clock() -> Result<Ticks> {
    let since = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| NetError::Invalid(format!("system clock precedes epoch: {e}")))?;
    Ok(since.as_nanos() as Ticks)
}

fn origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

/// Reads the monotonic clock as ticks since an arbitrary process-local
/// origin. Never goes backward.
pub fn elapsed() -> Ticks {
    origin().elapsed().as_nanos() as Ticks
}

/// Converts a non-negative tick count into a `Duration`.
pub fn ticks_to_duration(ticks: Ticks) -> Duration {
    Duration::from_nanos(ticks.max(0) as u64)
}

/// Converts a `Duration` into ticks, saturating at `Ticks::MAX`.
pub fn duration_to_ticks(duration: Duration) -> Ticks {
    Ticks::try_from(duration.as_nanos()).unwrap_or(Ticks::MAX)
}

/// Splits a tick count into whole seconds, discarding the fraction.
pub fn whole_seconds(ticks: Ticks) -> i64 {
    ticks / FREQUENCY
}

/// The sub-second remainder of a tick count, in nanoseconds.
pub fn fractional_nanoseconds(ticks: Ticks) -> i64 {
    ticks % FREQUENCY
}
