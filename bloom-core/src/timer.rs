//! Per-module elapsed-time accumulator.
//!
//! A module may be entered several times; each completed `start`/`end` window
//! is added to the module's running total. An `end` with no open window is
//! ignored, which absorbs duplicate end calls from the caller.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Default, Clone)]
pub struct TimerLedger {
    open: HashMap<String, DateTime<Utc>>,
    totals: BTreeMap<String, Duration>,
}

impl TimerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or re-opens) the timing window for `key` at `at`.
    pub fn start(&mut self, key: &str, at: DateTime<Utc>) {
        self.open.insert(key.to_string(), at);
    }

    /// Closes the window for `key` and returns the interval that was added.
    pub fn end(&mut self, key: &str, at: DateTime<Utc>) -> Option<Duration> {
        let started = self.open.remove(key)?;
        let elapsed = (at - started).max(Duration::zero());
        *self.totals.entry(key.to_string()).or_insert_with(Duration::zero) += elapsed;
        tracing::debug!(module = key, elapsed_ms = elapsed.num_milliseconds(), "timer closed");
        Some(elapsed)
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.open.contains_key(key)
    }

    pub fn total(&self, key: &str) -> Duration {
        self.totals.get(key).copied().unwrap_or_else(Duration::zero)
    }

    /// Total for `key` rounded to whole seconds.
    pub fn total_seconds(&self, key: &str) -> i64 {
        round_seconds(self.total(key))
    }

    /// moduleKey -> total seconds for every module that completed a window.
    pub fn totals_seconds(&self) -> BTreeMap<String, i64> {
        self.totals
            .iter()
            .map(|(k, d)| (k.clone(), round_seconds(*d)))
            .collect()
    }
}

/// Nearest whole second; used for module and session totals.
pub fn round_seconds(d: Duration) -> i64 {
    (d.num_milliseconds().max(0) + 500) / 1000
}

/// Completed whole seconds; used for per-question answer times.
pub fn floor_seconds(d: Duration) -> i64 {
    d.num_milliseconds().max(0) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fixed_clock;

    #[test]
    fn single_window_is_recorded() {
        let mut clock = fixed_clock();
        let mut ledger = TimerLedger::new();
        ledger.start("math", clock.now());
        clock.advance(Duration::seconds(42));
        assert_eq!(ledger.end("math", clock.now()), Some(Duration::seconds(42)));
        assert_eq!(ledger.total_seconds("math"), 42);
    }

    #[test]
    fn repeated_visits_are_summed() {
        let mut clock = fixed_clock();
        let mut ledger = TimerLedger::new();
        let visits = [3, 10, 7];
        for secs in visits {
            ledger.start("reading", clock.now());
            clock.advance(Duration::seconds(secs));
            ledger.end("reading", clock.now());
            clock.advance(Duration::seconds(100));
        }
        assert_eq!(ledger.total_seconds("reading"), 20);
    }

    #[test]
    fn end_without_start_is_noop() {
        let clock = fixed_clock();
        let mut ledger = TimerLedger::new();
        assert_eq!(ledger.end("math", clock.now()), None);
        assert_eq!(ledger.total_seconds("math"), 0);
        assert!(ledger.totals_seconds().is_empty());
    }

    #[test]
    fn double_end_keeps_previous_total() {
        let mut clock = fixed_clock();
        let mut ledger = TimerLedger::new();
        ledger.start("math", clock.now());
        clock.advance(Duration::seconds(5));
        ledger.end("math", clock.now());
        clock.advance(Duration::seconds(5));
        ledger.end("math", clock.now());
        assert_eq!(ledger.total_seconds("math"), 5);
    }

    #[test]
    fn modules_are_tracked_independently() {
        let mut clock = fixed_clock();
        let mut ledger = TimerLedger::new();
        ledger.start("math", clock.now());
        clock.advance(Duration::seconds(4));
        ledger.end("math", clock.now());
        ledger.start("visual", clock.now());
        assert!(ledger.is_running("visual"));
        clock.advance(Duration::seconds(9));
        ledger.end("visual", clock.now());

        let totals = ledger.totals_seconds();
        assert_eq!(totals.get("math"), Some(&4));
        assert_eq!(totals.get("visual"), Some(&9));
    }

    #[test]
    fn sub_second_windows_accumulate_before_rounding() {
        let mut clock = fixed_clock();
        let mut ledger = TimerLedger::new();
        for _ in 0..4 {
            ledger.start("auditory", clock.now());
            clock.advance(Duration::milliseconds(400));
            ledger.end("auditory", clock.now());
        }
        assert_eq!(ledger.total("auditory"), Duration::milliseconds(1600));
        assert_eq!(ledger.total_seconds("auditory"), 2);
    }

    #[test]
    fn second_helpers_round_and_floor() {
        assert_eq!(round_seconds(Duration::milliseconds(4600)), 5);
        assert_eq!(round_seconds(Duration::milliseconds(4499)), 4);
        assert_eq!(floor_seconds(Duration::milliseconds(4600)), 4);
        assert_eq!(floor_seconds(Duration::milliseconds(999)), 0);
        assert_eq!(floor_seconds(Duration::milliseconds(-300)), 0);
        assert_eq!(round_seconds(Duration::milliseconds(-300)), 0);
    }
}
