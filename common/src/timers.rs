//! Deadline bookkeeping for the coordinator's timers.
//!
//! Nothing here sleeps. Each timer only remembers when it is due; the host
//! asks the coordinator for its next deadline and calls back once it passes.
//! Re-arming a timer replaces the previous deadline.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneShot {
    due: Option<u64>,
}

impl OneShot {
    pub fn arm(&mut self, now_ms: u64, delay_ms: u64) {
        self.due = Some(now_ms + delay_ms);
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.due.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.due
    }

    /// Disarms and returns true if the deadline has passed
    pub fn take_if_due(&mut self, now_ms: u64) -> bool {
        match self.due {
            Some(due) if due <= now_ms => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period_ms: u64,
    next: u64,
}

impl Interval {
    pub fn start(now_ms: u64, period_ms: u64) -> Self {
        Self {
            period_ms,
            next: now_ms + period_ms,
        }
    }

    pub fn deadline(&self) -> u64 {
        self.next
    }

    /// Returns true and schedules the following tick if due. Missed ticks
    /// are not replayed (throttled background tabs fire late, not often).
    pub fn take_if_due(&mut self, now_ms: u64) -> bool {
        if self.next <= now_ms {
            self.next = now_ms + self.period_ms;
            true
        } else {
            false
        }
    }
}

/// Trailing-edge debouncer: every trigger pushes the deadline out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    delay_ms: u64,
    timer: OneShot,
}

impl Debouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            timer: OneShot::default(),
        }
    }

    pub fn trigger(&mut self, now_ms: u64) {
        self.timer.arm(now_ms, self.delay_ms);
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
    }

    pub fn deadline(&self) -> Option<u64> {
        self.timer.deadline()
    }

    pub fn take_if_due(&mut self, now_ms: u64) -> bool {
        self.timer.take_if_due(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_one_shot_fires_once() {
        let mut timer = OneShot::default();
        timer.arm(100, 50);
        assert!(!timer.take_if_due(149));
        assert!(timer.take_if_due(150));
        assert!(!timer.take_if_due(1_000));
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let mut timer = OneShot::default();
        timer.arm(0, 100);
        timer.arm(50, 100);
        assert_eq!(timer.deadline(), Some(150));
        assert!(!timer.take_if_due(100));
    }

    #[test]
    fn test_interval_does_not_catch_up() {
        let mut interval = Interval::start(0, 1_000);
        assert!(!interval.take_if_due(999));
        assert!(interval.take_if_due(5_500));
        assert_eq!(interval.deadline(), 6_500);
        assert!(!interval.take_if_due(5_500));
    }

    proptest! {
        // Any burst of triggers spaced closer than the delay fires exactly once.
        #[test]
        fn test_debounce_collapses_bursts(gaps in prop::collection::vec(0u64..300, 1..40)) {
            let mut debouncer = Debouncer::new(300);
            let mut now = 0;
            let mut fired = 0;
            for gap in gaps {
                now += gap;
                if debouncer.take_if_due(now) {
                    fired += 1;
                }
                debouncer.trigger(now);
            }
            now += 300;
            if debouncer.take_if_due(now) {
                fired += 1;
            }
            prop_assert_eq!(fired, 1);
        }
    }
}
