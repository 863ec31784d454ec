//! # Fibonacci Backoff
//!
//! Per-object requeue delays after a failed reconciliation.
//! Grows more slowly than the exponential per-operation retry in `retry.rs`,
//! so an object that keeps failing is revisited regularly without hammering the store.
//!
//! Sequence for `min = 100ms, max = 1s`: 100ms, 100ms, 200ms, 300ms, 500ms, 800ms, 1s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min.min(max),
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min.min(self.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(ms(100), ms(1000));

        assert_eq!(backoff.next_backoff(), ms(100));
        assert_eq!(backoff.next_backoff(), ms(100));
        assert_eq!(backoff.next_backoff(), ms(200));
        assert_eq!(backoff.next_backoff(), ms(300));
        assert_eq!(backoff.next_backoff(), ms(500));
        assert_eq!(backoff.next_backoff(), ms(800));
        assert_eq!(backoff.next_backoff(), ms(1000)); // capped
        assert_eq!(backoff.next_backoff(), ms(1000));
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(ms(100), ms(1000));
        for _ in 0..4 {
            backoff.next_backoff();
        }

        backoff.reset();

        assert_eq!(backoff.next_backoff(), ms(100));
        assert_eq!(backoff.next_backoff(), ms(100));
        assert_eq!(backoff.next_backoff(), ms(200));
    }
}
