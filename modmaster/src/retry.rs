use std::time::Duration;

/// Trait that controls how the TCP executor retries failed connection attempts
pub trait RetryStrategy: Send {
    /// Reset internal state. Called when a connection is successful
    fn reset(&mut self);
    /// Return the next delay before making another connection attempt
    fn after_failed_connect(&mut self) -> Duration;
    /// Return the delay to wait after a disconnect before attempting to reconnect
    fn after_disconnect(&mut self) -> Duration;
}

/// Return the default [`RetryStrategy`]: doubling from 1 second up to 1 minute
pub fn default_retry_strategy() -> Box<dyn RetryStrategy> {
    doubling_retry_strategy(Duration::from_millis(1000), Duration::from_millis(60000))
}

/// Return a [`RetryStrategy`] that doubles on failure up to a maximum value
pub fn doubling_retry_strategy(min: Duration, max: Duration) -> Box<dyn RetryStrategy> {
    Box::new(Doubling::new(min, max))
}

struct Doubling {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Doubling {
    fn new(min: Duration, max: Duration) -> Self {
        Doubling {
            min,
            max,
            current: min,
        }
    }
}

impl RetryStrategy for Doubling {
    fn reset(&mut self) {
        self.current = self.min;
    }

    fn after_failed_connect(&mut self) -> Duration {
        let ret = self.current;
        self.current = std::cmp::min(self.current.saturating_mul(2), self.max);
        ret
    }

    fn after_disconnect(&mut self) -> Duration {
        self.min
    }
}
