use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;

/// A fixed, ordered list of delays to wait between attempts.
///
/// The schedule itself is immutable. Each dispatch takes a fresh
/// [`ScheduledBackoff`] from it, so no state carries over between calls.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RetrySchedule {
    delays: Arc<[Duration]>,
}

impl RetrySchedule {
    /// Creates a schedule from the given delays, consumed in order.
    #[inline]
    pub fn new(delays: impl Into<Vec<Duration>>) -> Self {
        let delays: Vec<Duration> = delays.into();
        Self {
            delays: delays.into(),
        }
    }

    /// A schedule that never retries.
    #[inline]
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    /// Returns the delays of this schedule.
    #[inline]
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Returns how many attempts a dispatch makes at most, i.e. the first
    /// attempt plus one retry per delay.
    #[inline]
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Returns the time spent waiting when every attempt fails.
    #[inline]
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }

    /// Starts walking the schedule from its first delay.
    #[inline]
    pub fn start(&self) -> ScheduledBackoff {
        ScheduledBackoff {
            delays: Arc::clone(&self.delays),
            next_idx: 0,
        }
    }
}

impl Default for RetrySchedule {
    /// 800ms, then 1600ms.
    fn default() -> Self {
        Self::new([Duration::from_millis(800), Duration::from_millis(1600)])
    }
}

/// The per-dispatch cursor over a [`RetrySchedule`].
#[derive(Clone, Debug)]
pub struct ScheduledBackoff {
    delays: Arc<[Duration]>,
    next_idx: usize,
}

impl Backoff for ScheduledBackoff {
    fn reset(&mut self) {
        self.next_idx = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        let delay = self.delays.get(self.next_idx).copied()?;
        self.next_idx += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let schedule = RetrySchedule::default();
        assert_eq!(
            schedule.delays(),
            [Duration::from_millis(800), Duration::from_millis(1600)]
        );
        assert_eq!(schedule.max_attempts(), 3);
        assert_eq!(schedule.total_delay(), Duration::from_millis(2400));

        let mut backoff = schedule.start();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(800)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1600)));
        assert_eq!(backoff.next_backoff(), None);
        assert_eq!(backoff.next_backoff(), None);

        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(800)));
    }

    #[test]
    fn test_cursors_are_independent() {
        let schedule = RetrySchedule::default();
        let mut first = schedule.start();
        first.next_backoff();
        first.next_backoff();

        let mut second = schedule.start();
        assert_eq!(second.next_backoff(), Some(Duration::from_millis(800)));
    }

    #[test]
    fn test_empty_schedule() {
        let schedule = RetrySchedule::none();
        assert_eq!(schedule.max_attempts(), 1);
        assert_eq!(schedule.start().next_backoff(), None);
    }
}
