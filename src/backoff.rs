/// Exponential delay between image pull retries.
///
/// Each call to `next_delay()` returns the current delay and multiplies
/// the next one, capped at `max_delay`. `reset()` starts over for the
/// next image.
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: u32,
    current_delay: Duration,
    /// Failed attempts since the last `reset()`.
    pub attempt: u32,
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            current_delay: initial_delay,
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay;
        self.attempt += 1;
        self.current_delay = (self.current_delay * self.multiplier).min(self.max_delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt = 0;
    }

    pub fn exhausted(&self, max_attempts: u32) -> bool {
        self.attempt >= max_attempts
    }
}

impl Default for Backoff {
    /// 1s, 2s, 4s … capped at 30s
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 2)
    }
}
