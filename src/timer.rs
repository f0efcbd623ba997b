//! Second-resolution countdowns driven by an external clock.
//!
//! A [`Countdown`] never reads the clock itself. Its owner asks for
//! [`next_tick_at`](Countdown::next_tick_at), waits until then on whatever
//! clock it uses, and calls [`tick`](Countdown::tick). Under
//! `tokio::time::pause()` this makes timer behavior fully deterministic.

use std::time::Duration;

use tokio::time::Instant;

/// Interval between two ticks.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Result of a single [`Countdown::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// Still counting; carries the seconds left.
    Running(u32),
    /// Reached zero on this tick.
    Expired,
}

/// A countdown that loses one second per tick and stops at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    total_secs: u32,
    remaining_secs: u32,
    started_at: Instant,
    ticks: u32,
    expired: bool,
}

impl Countdown {
    /// Start a countdown of `total_secs` at `now`.
    pub fn start(total_secs: u32, now: Instant) -> Self {
        Self {
            total_secs,
            remaining_secs: total_secs,
            started_at: now,
            ticks: 0,
            expired: false,
        }
    }

    /// Seconds left. Never negative.
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    /// Duration the countdown was started with.
    pub fn total_secs(&self) -> u32 {
        self.total_secs
    }

    /// Instant the countdown was started.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// `true` once a tick has reported [`CountdownTick::Expired`].
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// When the next tick is due, or `None` after expiry.
    pub fn next_tick_at(&self) -> Option<Instant> {
        if self.expired {
            return None;
        }
        let elapsed = TICK_PERIOD.saturating_mul(self.ticks.saturating_add(1));
        Some(self.started_at + elapsed)
    }

    /// `true` if a tick is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_tick_at().is_some_and(|at| at <= now)
    }

    /// Advance by one second.
    pub fn tick(&mut self) -> CountdownTick {
        if self.expired {
            return CountdownTick::Expired;
        }
        self.ticks = self.ticks.saturating_add(1);
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.expired = true;
            CountdownTick::Expired
        } else {
            CountdownTick::Running(self.remaining_secs)
        }
    }

    /// Stop the countdown, returning the seconds that were left.
    pub fn cancel(self) -> u32 {
        self.remaining_secs
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn decreases_by_one_per_tick() {
        let now = Instant::now();
        let mut countdown = Countdown::start(3, now);
        assert_eq!(countdown.remaining_secs(), 3);
        assert_eq!(countdown.tick(), CountdownTick::Running(2));
        assert_eq!(countdown.tick(), CountdownTick::Running(1));
        assert_eq!(countdown.tick(), CountdownTick::Expired);
        assert_eq!(countdown.remaining_secs(), 0);
    }

    #[test]
    fn clamps_at_zero_after_expiry() {
        let mut countdown = Countdown::start(1, Instant::now());
        assert_eq!(countdown.tick(), CountdownTick::Expired);
        assert_eq!(countdown.tick(), CountdownTick::Expired);
        assert_eq!(countdown.remaining_secs(), 0);
        assert!(countdown.is_expired());
        assert_eq!(countdown.next_tick_at(), None);
    }

    #[test]
    fn zero_length_countdown_expires_on_first_tick() {
        let mut countdown = Countdown::start(0, Instant::now());
        assert!(!countdown.is_expired());
        assert_eq!(countdown.tick(), CountdownTick::Expired);
    }

    #[test]
    fn ticks_are_scheduled_from_start() {
        let start = Instant::now();
        let mut countdown = Countdown::start(60, start);
        assert_eq!(countdown.next_tick_at(), Some(start + TICK_PERIOD));
        assert!(!countdown.is_due(start));
        assert!(countdown.is_due(start + TICK_PERIOD));

        countdown.tick();
        assert_eq!(countdown.next_tick_at(), Some(start + TICK_PERIOD * 2));
    }

    #[test]
    fn cancel_reports_remaining() {
        let mut countdown = Countdown::start(60, Instant::now());
        countdown.tick();
        assert_eq!(countdown.cancel(), 59);
    }
}
