use chrono::{DateTime, Duration, Utc};

/// Wall-clock source for the wizard and timers; `Fixed` makes tests deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Moves a fixed clock forward. No effect on the system clock.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// 2023-11-14T22:13:20Z, a stable starting point for tests.
#[cfg(test)]
pub(crate) const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

#[cfg(test)]
pub(crate) fn fixed_clock() -> Clock {
    Clock::fixed(DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0).unwrap())
}
