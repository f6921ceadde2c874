use std::time::Duration;
use tokio::time::Instant;

/// Cancellable single-shot deadline. Every `schedule` supersedes the
/// previous one.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the deadline if it has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// A value shown until a fixed instant, e.g. a transient indicator.
#[derive(Debug)]
pub struct TimedFlag<T> {
    value: Option<(T, Instant)>,
}

impl<T> Default for TimedFlag<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> TimedFlag<T> {
    pub fn show(&mut self, value: T, now: Instant, duration: Duration) {
        self.value = Some((value, now + duration));
    }

    pub fn get(&self, now: Instant) -> Option<&T> {
        self.value
            .as_ref()
            .filter(|(_, until)| now < *until)
            .map(|(value, _)| value)
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        self.get(now).is_some()
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.value.as_ref().map(|(_, until)| *until)
    }

    pub fn clear(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reschedule_supersedes() {
        let now = Instant::now();
        let mut timer = DebounceTimer::new();
        timer.schedule(now, Duration::from_millis(500));
        timer.schedule(now + Duration::from_millis(200), Duration::from_millis(500));
        assert!(!timer.take_due(now + Duration::from_millis(500)));
        assert!(timer.take_due(now + Duration::from_millis(700)));
        assert!(timer.deadline().is_none());
    }

    #[test]
    fn test_cancel_clears_deadline() {
        let now = Instant::now();
        let mut timer = DebounceTimer::new();
        timer.schedule(now, Duration::from_millis(500));
        timer.cancel();
        assert!(timer.deadline().is_none());
        assert!(!timer.take_due(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_flag_expires() {
        let now = Instant::now();
        let mut flag = TimedFlag::default();
        flag.show("Room XYZ not found", now, Duration::from_secs(3));
        assert_eq!(flag.get(now + Duration::from_secs(2)), Some(&"Room XYZ not found"));
        assert!(!flag.is_visible(now + Duration::from_secs(3)));
    }
}
