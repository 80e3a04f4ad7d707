use rand::Rng;
use std::thread;
use std::time::Duration;

/// Jittered exponential backoff for synchronous storage calls.
///
/// Only transient storage failures should pass the `retryable` predicate;
/// every other error class is terminal for the user action and surfaces
/// on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: usize,
        base_delay_ms: u64,
        max_delay_ms: u64,
        jitter_pct: f64,
    ) -> Self {
        let clamped_attempts = max_attempts.max(1);
        let clamped_base = base_delay_ms.max(1);
        let clamped_max_delay = max_delay_ms.max(clamped_base);
        let clamped_jitter = jitter_pct.clamp(0.0, 1.0);
        Self {
            max_attempts: clamped_attempts,
            base_delay_ms: clamped_base,
            max_delay_ms: clamped_max_delay,
            jitter_pct: clamped_jitter,
        }
    }

    pub fn default_storage() -> Self {
        Self::new(4, 50, 1_000, 0.25)
    }

    fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt as u32);
        let mut delay = self.base_delay_ms.saturating_mul(exp);
        if delay > self.max_delay_ms {
            delay = self.max_delay_ms;
        }
        let jitter = if self.jitter_pct > 0.0 {
            let mut rng = rand::thread_rng();
            let spread = (delay as f64 * self.jitter_pct) as i64;
            let delta = rng.gen_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, the error stops being retryable, or
    /// the attempt budget is spent.
    pub fn retry<F, P, T, E>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut(usize) -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(val) => return Ok(val),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&err) {
                        return Err(err);
                    }
                    thread::sleep(self.next_delay(attempt - 1));
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, 50, 1_000, 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_input_parameters() {
        let policy = RetryPolicy::new(0, 0, 0, 2.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay_ms, 1);
        assert_eq!(policy.max_delay_ms, 1);
        assert_eq!(policy.jitter_pct, 1.0);
    }

    #[test]
    fn next_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 100, 500, 0.0);
        let delays: Vec<_> = (0..5).map(|attempt| policy.next_delay(attempt)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(500)); // capped
        assert_eq!(delays[4], Duration::from_millis(500));
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let policy = RetryPolicy::new(3, 1, 1, 0.0);
        let mut calls = 0;
        let result: Result<&str, &str> = policy.retry(
            |attempt| {
                calls += 1;
                if attempt < 2 {
                    Err("transient")
                } else {
                    Ok("ok")
                }
            },
            |_| true,
        );
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls, 3);
    }

    #[test]
    fn terminal_errors_fail_on_first_attempt() {
        let policy = RetryPolicy::new(5, 1, 1, 0.0);
        let mut calls = 0;
        let result: Result<(), &str> = policy.retry(
            |_| {
                calls += 1;
                Err("forbidden")
            },
            |err| *err != "forbidden",
        );
        assert_eq!(result, Err("forbidden"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn stops_after_max_attempts() {
        let policy = RetryPolicy::new(2, 1, 1, 0.0);
        let mut calls = 0;
        let result: Result<(), &str> = policy.retry(
            |_| {
                calls += 1;
                Err("transient")
            },
            |_| true,
        );
        assert_eq!(result, Err("transient"));
        assert_eq!(calls, 2);
    }
}
