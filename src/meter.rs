//! Event-rate meter: peak, sustained, and burst statistics.
//!
//! The meter ingests `(now, count)` observations from any rate-bearing
//! subsystem and keeps just enough state to answer three questions: the
//! highest instantaneous rate seen (from the shortest per-event
//! inter-arrival time), the long-run sustained rate, and the largest
//! single burst. It never reads a clock unless asked to via the `_now`
//! convenience calls, so it can be driven with synthetic ticks.

use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};
use crate::time::{self, Ticks};

/// Tracks peak and sustained event rates with burst accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Meter {
    start: Ticks,
    last: Ticks,
    shortest: f64,
    events: u64,
    burst: u64,
}

/// A point-in-time report of everything a meter knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterSnapshot {
    pub start: Ticks,
    pub last: Ticks,
    pub events: u64,
    pub burst: u64,
    pub peak: f64,
    pub sustained: f64,
}

impl Meter {
    /// Starts a meter at `now`. Negative clocks are invalid.
    pub fn new(now: Ticks) -> Result<Meter> {
        let mut meter = Meter {
            start: 0,
            last: 0,
            shortest: f64::INFINITY,
            events: 0,
            burst: 0,
        };
        meter.reset(now)?;
        Ok(meter)
    }

    /// Starts a meter on the monotonic clock.
    pub fn start_now() -> Result<Meter> {
        Meter::new(Self::now())
    }

    /// The clock the `_now` conveniences read: monotonic ticks.
    pub fn now() -> Ticks {
        time::elapsed()
    }

    /// Forgets everything and restarts the measurement at `now`.
    pub fn reset(&mut self, now: Ticks) -> Result<()> {
        if now < 0 {
            return Err(NetError::Invalid(format!("negative clock: {now}")));
        }
        self.start = now;
        self.last = now;
        self.shortest = f64::INFINITY;
        self.events = 0;
        self.burst = 0;
        Ok(())
    }

    /// Records `count` events observed at `now`.
    ///
    /// `now` must not precede the previous observation (`RangeViolation`),
    /// the running event count must not overflow (`Overflow`), and a zero
    /// count is a no-op. The first observation anchors the inter-arrival
    /// measurement and contributes no rate of its own.
    pub fn events(&mut self, now: Ticks, count: u64) -> Result<()> {
        if now < 0 {
            return Err(NetError::Invalid(format!("negative clock: {now}")));
        }
        if count == 0 {
            return Ok(());
        }
        if self.events == 0 {
            self.last = now;
            self.events = count;
            self.burst = count;
            return Ok(());
        }
        if now < self.last {
            return Err(NetError::RangeViolation(format!(
                "clock went backward: {now} < {}",
                self.last
            )));
        }
        if u64::MAX - self.events < count {
            return Err(NetError::Overflow(format!(
                "event count would overflow: {} + {count}",
                self.events
            )));
        }
        let interarrival = (now - self.last) as f64 / count as f64;
        if interarrival < self.shortest {
            self.shortest = interarrival;
        }
        self.last = now;
        self.events += count;
        if count > self.burst {
            self.burst = count;
        }
        Ok(())
    }

    /// Records one event at `now`.
    pub fn event(&mut self, now: Ticks) -> Result<()> {
        self.events(now, 1)
    }

    /// Records `count` events at the monotonic clock.
    pub fn events_now(&mut self, count: u64) -> Result<()> {
        self.events(Self::now(), count)
    }

    /// Records one event at the monotonic clock.
    pub fn event_now(&mut self) -> Result<()> {
        self.events_now(1)
    }

    /// Total events observed since the last reset.
    pub fn count(&self) -> u64 {
        self.events
    }

    /// The largest number of events delivered in one observation.
    pub fn burst(&self) -> u64 {
        self.burst
    }

    /// The shortest per-event inter-arrival time seen so far, in ticks.
    /// Infinite until a second observation arrives.
    pub fn shortest_interarrival(&self) -> f64 {
        self.shortest
    }

    /// Peak rate in events per second: the reciprocal of the shortest
    /// inter-arrival time. Zero until a second observation arrives.
    pub fn peak(&self) -> f64 {
        if self.shortest.is_finite() && self.shortest > 0.0 {
            time::FREQUENCY as f64 / self.shortest
        } else if self.shortest == 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    /// Sustained rate in events per second over the whole measurement.
    pub fn sustained(&self) -> f64 {
        if self.events == 0 {
            return 0.0;
        }
        let span = (self.last - self.start) as f64;
        if span <= 0.0 {
            return f64::INFINITY;
        }
        self.events as f64 * time::FREQUENCY as f64 / span
    }

    /// When the measurement began.
    pub fn started(&self) -> Ticks {
        self.start
    }

    /// When the most recent event arrived.
    pub fn updated(&self) -> Ticks {
        self.last
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            start: self.start,
            last: self.last,
            events: self.events,
            burst: self.burst,
            peak: self.peak(),
            sustained: self.sustained(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: Ticks = time::FREQUENCY;

    #[test]
    fn test_new_meter_is_empty() {
        let meter = Meter::new(1000).unwrap();
        assert_eq!(meter.count(), 0);
        assert_eq!(meter.burst(), 0);
        assert_eq!(meter.peak(), 0.0);
        assert_eq!(meter.sustained(), 0.0);
        assert_eq!(meter.started(), 1000);
        assert_eq!(meter.updated(), 1000);
    }

    #[test]
    fn test_negative_clock_rejected() {
        assert_eq!(Meter::new(-1).unwrap_err().kind(), "Invalid");
        let mut meter = Meter::new(0).unwrap();
        assert_eq!(meter.events(-5, 1).unwrap_err().kind(), "Invalid");
    }

    #[test]
    fn test_clock_regression_rejected() {
        let mut meter = Meter::new(0).unwrap();
        meter.events(F, 1).unwrap();
        meter.events(2 * F, 1).unwrap();
        let err = meter.events(F, 1).unwrap_err();
        assert_eq!(err.kind(), "RangeViolation");
        // The failed call must not have disturbed the totals.
        assert_eq!(meter.count(), 2);
        assert_eq!(meter.updated(), 2 * F);
    }

    #[test]
    fn test_overflow_rejected() {
        let mut meter = Meter::new(0).unwrap();
        meter.events(1, u64::MAX - 1).unwrap();
        let err = meter.events(2, 2).unwrap_err();
        assert_eq!(err.kind(), "Overflow");
        assert_eq!(meter.count(), u64::MAX - 1);
    }

    #[test]
    fn test_zero_events_is_noop() {
        let mut meter = Meter::new(0).unwrap();
        meter.events(F, 0).unwrap();
        assert_eq!(meter.count(), 0);
        // Even a backward clock is tolerated when there is nothing to count.
        meter.events(5 * F, 3).unwrap();
        meter.events(F, 0).unwrap();
        assert_eq!(meter.count(), 3);
    }

    #[test]
    fn test_first_observation_sets_burst_but_no_rate() {
        let mut meter = Meter::new(0).unwrap();
        meter.events(F, 17).unwrap();
        assert_eq!(meter.count(), 17);
        assert_eq!(meter.burst(), 17);
        assert_eq!(meter.peak(), 0.0, "one observation cannot define a peak");
    }

    #[test]
    fn test_count_accumulates_and_times_are_ordered() {
        let mut meter = Meter::new(0).unwrap();
        let mut total = 0u64;
        for (i, count) in [3u64, 1, 7, 2, 5].iter().enumerate() {
            meter.events((i as Ticks + 1) * F, *count).unwrap();
            total += count;
        }
        assert_eq!(meter.count(), total);
        assert!(meter.started() <= meter.updated());
        assert_eq!(meter.burst(), 7);
    }

    #[test]
    fn test_steady_rate_peak_equals_sustained() {
        let mut meter = Meter::new(0).unwrap();
        // 100 events, one every 10ms: 100 events/second both ways.
        for i in 1..=100 {
            meter.events(i * F / 100, 1).unwrap();
        }
        assert!((meter.peak() - 100.0).abs() < 0.01, "peak {}", meter.peak());
        assert!(
            (meter.sustained() - 100.0).abs() < 0.01,
            "sustained {}",
            meter.sustained()
        );
    }

    #[test]
    fn test_dual_rate_traffic_pattern() {
        // Model a shaped flow: bursts paced at a 2048/s peak rate, idle
        // gaps bringing the sustained rate down to 1024/s, and a largest
        // burst of 512 events, over more than a million events.
        let mut meter = Meter::new(0).unwrap();
        let peak_spacing = F / 2048;
        let mut t: Ticks = 0;

        for cycle in 0..2000 {
            if cycle % 2 == 0 {
                // 512 singles at the peak rate, then idle out the half-cycle.
                for _ in 0..512 {
                    t += peak_spacing;
                    meter.events(t, 1).unwrap();
                }
                t += F / 4;
            } else {
                // The same half-cycle's worth of traffic as one burst call.
                t += F / 2;
                meter.events(t, 512).unwrap();
            }
        }

        assert!(meter.count() >= 1_000_000, "only {} events", meter.count());
        assert_eq!(meter.burst(), 512);
        assert!(
            (meter.peak() - 2048.0).abs() < 10.0,
            "measured peak {}",
            meter.peak()
        );
        assert!(
            (meter.sustained() - 1024.0).abs() < 5.0,
            "measured sustained {}",
            meter.sustained()
        );
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut meter = Meter::new(0).unwrap();
        meter.events(F, 100).unwrap();
        meter.events(2 * F, 100).unwrap();
        meter.reset(10 * F).unwrap();
        assert_eq!(meter.count(), 0);
        assert_eq!(meter.burst(), 0);
        assert_eq!(meter.peak(), 0.0);
        assert_eq!(meter.started(), 10 * F);
    }

    #[test]
    fn test_monotonic_convenience_calls() {
        let mut meter = Meter::start_now().unwrap();
        meter.event_now().unwrap();
        meter.events_now(4).unwrap();
        assert_eq!(meter.count(), 5);
        assert!(meter.started() <= meter.updated());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut meter = Meter::new(0).unwrap();
        meter.events(F, 10).unwrap();
        meter.events(2 * F, 20).unwrap();
        let snapshot = meter.snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["events"], 30);
        assert_eq!(json["burst"], 20);
        let back: MeterSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
