use std::time::Duration;

/// Exponential backoff used by HTTP drivers when an API answers with a
/// rate-limit status.
#[derive(Clone, Debug)]
pub struct Backoff {
    pub initial: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    sleep: fn(Duration),
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            max_delay: Duration::from_secs(180),
            max_retries: 6,
            sleep: std::thread::sleep,
        }
    }
}

impl Backoff {
    pub fn new(initial: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            initial,
            max_delay,
            max_retries,
            ..Default::default()
        }
    }

    /// Replaces the sleep function, mostly so tests don't wait.
    pub fn with_sleeper(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// Delay before retry number `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or
    /// the retry budget is exhausted. The last error is returned.
    pub fn run<T, E>(
        &self,
        what: &str,
        is_transient: impl Fn(&E) -> bool,
        mut op: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(err) if attempt < self.max_retries && is_transient(&err) => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        request = what,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        "Rate limited, retrying"
                    );
                    (self.sleep)(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Statuses providers use to signal "slow down".
pub fn is_rate_limit_status(status: u16) -> bool {
    matches!(status, 429 | 503)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn no_sleep(_: Duration) {}

    #[test]
    fn delays_grow_and_cap() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::from_secs(10));
        assert_eq!(backoff.delay(1), Duration::from_secs(20));
        assert_eq!(backoff.delay(3), Duration::from_secs(80));
        assert_eq!(backoff.delay(4), Duration::from_secs(160));
        assert_eq!(backoff.delay(5), Duration::from_secs(180));
        assert_eq!(backoff.delay(40), Duration::from_secs(180));
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let backoff = Backoff::default().with_sleeper(no_sleep);
        let result: Result<u32, u16> = backoff.run("test", |s| is_rate_limit_status(*s), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(429)
            } else {
                Ok(7)
            }
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_budget() {
        let calls = Cell::new(0);
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(2), 5)
            .with_sleeper(no_sleep);
        let result: Result<(), u16> = backoff.run("test", |s| is_rate_limit_status(*s), || {
            calls.set(calls.get() + 1);
            Err(503)
        });
        assert_eq!(result, Err(503));
        assert_eq!(calls.get(), 6);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let backoff = Backoff::default().with_sleeper(no_sleep);
        let result: Result<(), u16> = backoff.run("test", |s| is_rate_limit_status(*s), || {
            calls.set(calls.get() + 1);
            Err(403)
        });
        assert_eq!(result, Err(403));
        assert_eq!(calls.get(), 1);
    }
}
