//! Deadline-based elapsed-time check.
//!
//! A [`Timer`] stores a timeout and an absolute deadline. It never sleeps;
//! callers poll [`Timer::is_time_up`] once per scan cycle. A non-positive
//! timeout means the timer is always expired.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Unit of the magnitude passed to [`Timer::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerUnit {
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
}

impl TimerUnit {
    fn duration(self, magnitude: u64) -> Duration {
        match self {
            TimerUnit::Microseconds => Duration::from_micros(magnitude),
            TimerUnit::Milliseconds => Duration::from_millis(magnitude),
            TimerUnit::Seconds => Duration::from_secs(magnitude),
            TimerUnit::Minutes => Duration::from_secs(magnitude.saturating_mul(60)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    Expired,
    At(Instant),
    /// The timeout reaches past the clock's range.
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    /// `None` for timers that are always expired.
    timeout: Option<Duration>,
    deadline: Deadline,
}

impl Timer {
    /// Creates a timer of `timeout` units. When `autostart` is false the timer
    /// reports expired until the first [`Timer::reset`].
    pub fn new(timeout: i64, unit: TimerUnit, autostart: bool) -> Self {
        let timeout = u64::try_from(timeout)
            .ok()
            .filter(|magnitude| *magnitude > 0)
            .map(|magnitude| unit.duration(magnitude));
        Self::with_timeout(timeout, autostart)
    }

    /// Creates and starts a timer from an exact duration.
    pub fn from_duration(timeout: Duration) -> Self {
        Self::with_timeout(Some(timeout).filter(|timeout| !timeout.is_zero()), true)
    }

    /// Creates and starts a millisecond timer.
    pub fn from_millis(timeout: i64) -> Self {
        Self::new(timeout, TimerUnit::Milliseconds, true)
    }

    fn with_timeout(timeout: Option<Duration>, autostart: bool) -> Self {
        let mut timer = Self {
            timeout,
            deadline: Deadline::Expired,
        };
        if autostart {
            timer.reset();
        }
        timer
    }

    /// Recomputes the deadline as now + timeout.
    pub fn reset(&mut self) {
        self.deadline = match self.timeout {
            Some(timeout) => Instant::now().checked_add(timeout).map_or(Deadline::Never, Deadline::At),
            None => Deadline::Expired,
        };
    }

    /// Forces the timer to expired without touching the configured timeout.
    pub fn invalidate(&mut self) {
        self.deadline = Deadline::Expired;
    }

    /// True once the current time is strictly past the deadline.
    pub fn is_time_up(&self) -> bool {
        match self.deadline {
            Deadline::Expired => true,
            Deadline::At(deadline) => Instant::now() > deadline,
            Deadline::Never => false,
        }
    }

    /// The configured timeout, zero for always-expired timers.
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or_default()
    }

    /// Time left until the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Deadline::Expired => Duration::ZERO,
            Deadline::At(deadline) => deadline.saturating_duration_since(Instant::now()),
            Deadline::Never => self.timeout(),
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(0, TimerUnit::Seconds, true)
    }
}
