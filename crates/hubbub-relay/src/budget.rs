use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window action budget for one connection or user.
///
/// Keeps the timestamps of recent actions and evicts entries older
/// than the window lazily on each check, so an idle bucket costs
/// nothing and memory stays bounded by `max_actions`.
#[derive(Debug)]
pub struct RateWindow {
    window: Duration,
    max_actions: usize,
    hits: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new(max_actions: usize, window: Duration) -> Self {
        Self {
            window,
            max_actions,
            hits: VecDeque::with_capacity(max_actions),
        }
    }

    /// Record an attempted action at `now`. Returns whether the action
    /// fits in the budget; a rejected action is not recorded.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        while let Some(&front) = self.hits.front() {
            if now.duration_since(front) > self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        if self.hits.len() >= self.max_actions {
            return false;
        }
        self.hits.push_back(now);
        true
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_capacity() {
        let mut w = RateWindow::new(3, Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(w.allow_at(t0));
        assert!(w.allow_at(t0));
        assert!(w.allow_at(t0));
        assert!(!w.allow_at(t0));
    }

    #[test]
    fn old_entries_are_evicted() {
        let mut w = RateWindow::new(2, Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(w.allow_at(t0));
        assert!(w.allow_at(t0));
        assert!(!w.allow_at(t0 + Duration::from_millis(50)));
        // Past the window both entries expire and the budget refills.
        let later = t0 + Duration::from_millis(150);
        assert!(w.allow_at(later));
        assert!(w.allow_at(later));
        assert!(!w.allow_at(later));
    }

    #[test]
    fn rejected_actions_do_not_consume_budget() {
        let mut w = RateWindow::new(1, Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(w.allow_at(t0));
        for i in 1..10 {
            assert!(!w.allow_at(t0 + Duration::from_millis(i)));
        }
        assert!(w.allow_at(t0 + Duration::from_millis(150)));
    }
}
