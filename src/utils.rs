use std::time::{Duration, Instant};

/// An endless schedule of retry deadlines with doubling wait times.
///
/// Bound it with `take` when giving up is an option.
pub struct ExponentialBackoff {
    next_wait: Duration,
    max_wait: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial_wait: Duration, max_wait: Duration) -> Self {
        Self {
            next_wait: initial_wait,
            max_wait,
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Instant;

    fn next(&mut self) -> Option<Self::Item> {
        let deadline = Instant::now() + self.next_wait;
        self.next_wait = std::cmp::min(self.next_wait * 2, self.max_wait);
        Some(deadline)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn waits_double_up_to_the_cap() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(250));

        let now = Instant::now();
        let first = backoff.next().unwrap() - now;
        let second = backoff.next().unwrap() - now;
        let third = backoff.next().unwrap() - now;

        assert!(first >= Duration::from_millis(100));
        assert!(second >= Duration::from_millis(200));
        // Capped, not quadrupled.
        assert!(third < Duration::from_millis(400));
    }
}
