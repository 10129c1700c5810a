use rand::random_range;
use std::future::Future;
use tokio::time::{Duration, sleep};
use tracing::debug;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,    // transport errors, 5xx, 429
    NonRetryable, // other 4xx, checksum mismatch
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub jitter_frac: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            per_attempt_timeout: DEFAULT_PER_ATTEMPT_TIMEOUT,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            jitter_frac: 0.0,
        }
    }
}

impl RetryConfig {
    /// Delay slept before attempt `attempt + 1` (attempts are 0-based):
    /// base, 2*base, 4*base, ... capped at `backoff_max`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

fn jitter(d: Duration, frac: f32) -> Duration {
    if frac <= 0.0 {
        return d;
    }
    let ms = d.as_millis() as i64;
    let delta = (ms as f32 * frac) as i64;
    let j = random_range(-delta..=delta);
    Duration::from_millis((ms + j).max(0) as u64)
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` attempts have been made. Returns the last error.
pub async fn retry_with_backoff<E, F, Fut, C, T>(
    cfg: &RetryConfig,
    mut op: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryClass,
    E: std::fmt::Display,
{
    let max_attempts = cfg.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op(attempt).await {
            Ok(res) => return Ok(res),
            Err(e) => {
                if classify(&e) == RetryClass::NonRetryable || attempt + 1 >= max_attempts {
                    return Err(e);
                }
                let sleep_dur = jitter(cfg.backoff_for(attempt), cfg.jitter_frac);
                debug!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = sleep_dur.as_millis() as u64,
                    "retrying after error: {e}"
                );
                sleep(sleep_dur).await;
                attempt += 1;
            }
        }
    }
}

pub fn classify_status(status: reqwest::StatusCode) -> RetryClass {
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        RetryClass::Retryable
    } else {
        RetryClass::NonRetryable
    }
}

pub fn classify_reqwest(err: &reqwest::Error) -> RetryClass {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        return RetryClass::Retryable;
    }
    match err.status() {
        Some(st) => classify_status(st),
        None => RetryClass::Retryable,
    }
}
