use std::time::Duration;

use tokio::time::Instant;

/// Deadline of the next deal tick, and what was left of it when suspended.
///
/// Pausing records the time still owed to the pending tick; resuming
/// reschedules with exactly that remainder instead of a full interval.
#[derive(Debug, Default, Clone)]
pub struct TickTimer {
    deadline: Option<Instant>,
    remaining: Option<Duration>,
}

impl TickTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
        self.remaining = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The tick went off.
    pub fn fire(&mut self) {
        self.deadline = None;
    }

    /// Stops the countdown, remembering the time left until the deadline.
    pub fn suspend(&mut self, now: Instant) -> Option<Duration> {
        if let Some(deadline) = self.deadline.take() {
            self.remaining = Some(deadline.saturating_duration_since(now));
        }
        self.remaining
    }

    /// Delay to use when rescheduling: the suspended remainder if there is
    /// one, otherwise `interval`.
    pub fn resume_delay(&mut self, interval: Duration) -> Duration {
        self.remaining.take().unwrap_or(interval)
    }

    pub fn reset(&mut self) {
        self.deadline = None;
        self.remaining = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspend_records_time_left() {
        let start = Instant::now();
        let mut timer = TickTimer::new();
        timer.arm(start, Duration::from_millis(500));
        assert!(timer.is_armed());

        let left = timer.suspend(start + Duration::from_millis(200));
        assert_eq!(left, Some(Duration::from_millis(300)));
        assert!(!timer.is_armed());
        assert_eq!(timer.resume_delay(Duration::from_secs(1)), Duration::from_millis(300));
        assert_eq!(timer.resume_delay(Duration::from_secs(1)), Duration::from_secs(1));
    }

    #[test]
    fn overdue_deadline_resumes_immediately() {
        let start = Instant::now();
        let mut timer = TickTimer::new();
        timer.arm(start, Duration::from_millis(100));
        assert_eq!(timer.suspend(start + Duration::from_secs(3)), Some(Duration::ZERO));
    }

    #[test]
    fn fired_or_reset_timer_has_nothing_owed() {
        let start = Instant::now();
        let mut timer = TickTimer::new();
        timer.arm(start, Duration::from_millis(100));
        timer.fire();
        assert_eq!(timer.suspend(start), None);

        timer.arm(start, Duration::from_millis(100));
        timer.suspend(start);
        timer.reset();
        assert_eq!(timer.resume_delay(Duration::from_millis(700)), Duration::from_millis(700));
    }
}
