//! Deadline clock.
//!
//! Remaining time is always recomputed from the absolute deadline and the
//! caller's current time. There is no counter to decrement, so a late or
//! skipped tick cannot accumulate drift.

/// `max(0, deadline - now)` in milliseconds.
pub fn remaining_ms(deadline_ms: i64, now_ms: i64) -> i64 {
    deadline_ms.saturating_sub(now_ms).max(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub remaining_ms: i64,
    /// True exactly once: on the first tick at or after the deadline.
    pub closed_now: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineClock {
    deadline_ms: i64,
    closed_signalled: bool,
}

impl DeadlineClock {
    pub fn new(deadline_ms: i64) -> Self {
        Self {
            deadline_ms,
            closed_signalled: false,
        }
    }

    pub fn deadline_ms(&self) -> i64 {
        self.deadline_ms
    }

    /// Move the deadline. Re-arms the close edge only if the new deadline is
    /// still ahead of `now_ms`.
    pub fn reschedule(&mut self, deadline_ms: i64, now_ms: i64) {
        self.deadline_ms = deadline_ms;
        if deadline_ms > now_ms {
            self.closed_signalled = false;
        }
    }

    pub fn remaining(&self, now_ms: i64) -> i64 {
        remaining_ms(self.deadline_ms, now_ms)
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.remaining(now_ms) == 0
    }

    pub fn tick(&mut self, now_ms: i64) -> Tick {
        let remaining = self.remaining(now_ms);
        let closed_now = remaining == 0 && !self.closed_signalled;
        if closed_now {
            self.closed_signalled = true;
        }
        Tick {
            remaining_ms: remaining,
            closed_now,
        }
    }
}

/// `HH:MM:SS` for display; hours are not capped.
pub fn format_countdown(remaining_ms: i64) -> String {
    let secs = remaining_ms.max(0) / 1000;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_never_negative() {
        assert_eq!(remaining_ms(1_000, 400), 600);
        assert_eq!(remaining_ms(1_000, 1_000), 0);
        assert_eq!(remaining_ms(1_000, 5_000), 0);
        assert_eq!(remaining_ms(i64::MIN, i64::MAX), 0);
    }

    #[test]
    fn irregular_ticks_do_not_drift() {
        let mut c = DeadlineClock::new(60_000);
        // Ticks that arrive late, early and in bursts still report D - now.
        for now in [0, 999, 1_000, 7_345, 7_346, 59_999] {
            assert_eq!(c.tick(now).remaining_ms, 60_000 - now);
        }
    }

    #[test]
    fn close_edge_fires_once() {
        let mut c = DeadlineClock::new(10);
        assert!(!c.tick(5).closed_now);
        assert!(c.tick(10).closed_now);
        assert!(!c.tick(11).closed_now);
        assert!(!c.tick(500).closed_now);

        c.reschedule(1_000, 500);
        assert!(!c.tick(900).closed_now);
        assert!(c.tick(1_000).closed_now);
    }

    #[test]
    fn countdown_format() {
        assert_eq!(format_countdown(3_723_000), "01:02:03");
        assert_eq!(format_countdown(-5), "00:00:00");
    }
}
