//! The retry engine layered over every provider call
//!
//! Calls are retried only when their error classifies as transient, with
//! exponential backoff between attempts. Each wait is jittered within ±25%
//! so concurrent callers do not stampede the provider in lockstep.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Error;

/// Helps serde default the max attempts to 5
fn default_max_attempts() -> u32 {
    5
}

/// Helps serde default the minimum backoff to 100ms
fn default_min_delay_ms() -> u64 {
    100
}

/// Helps serde default the maximum backoff to 5s
fn default_max_delay_ms() -> u64 {
    5_000
}

/// The settings for retrying provider calls
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RetryConf {
    /// The maximum number of attempts for a single call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// The first backoff delay in milliseconds
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// The cap on backoff delays in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConf {
    /// Default the retry settings to sane values
    fn default() -> Self {
        RetryConf {
            max_attempts: default_max_attempts(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConf {
    /// Get the backoff delay for an attempt, jittered within ±25%
    ///
    /// Delays start at the minimum and double each attempt until they hit
    /// the cap.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The 1-indexed attempt that just failed
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        // double the minimum delay once per completed attempt
        let exp = attempt.saturating_sub(1).min(32);
        let base = self
            .min_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        // spread the delay across 75%..125% of its nominal value
        let jittered = base as f64 * rand::rng().random_range(0.75..=1.25);
        Duration::from_millis(jittered as u64)
    }
}

/// Call an operation, retrying transient failures with backoff
///
/// Retrying stops when the operation succeeds, its error is not
/// retryable, the attempt cap is reached, or the cancellation token
/// fires. Cancellation interrupts a backoff sleep immediately.
///
/// # Arguments
///
/// * `conf` - The retry settings to follow
/// * `token` - The cancellation token to honor between attempts
/// * `op_name` - The name of the operation for error context
/// * `op` - The operation to call
pub async fn retry<T, F, Fut>(
    conf: &RetryConf,
    token: Option<&CancellationToken>,
    op_name: &str,
    mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 1;
    loop {
        // bail before doing any work if the caller already cancelled
        if let Some(token) = token {
            if token.is_cancelled() {
                return Err(Error::Cancelled(format!("{op_name}: cancelled")));
            }
        }
        match op().await {
            Ok(val) => return Ok(val),
            Err(err) if err.retryable() && attempt < conf.max_attempts => {
                let wait = conf.backoff(attempt);
                tracing::event!(
                    tracing::Level::DEBUG,
                    op = op_name,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "retrying transient failure"
                );
                match token {
                    Some(token) => {
                        tokio::select! {
                            () = token.cancelled() => {
                                return Err(Error::Cancelled(format!("{op_name}: cancelled")));
                            }
                            () = tokio::time::sleep(wait) => {}
                        }
                    }
                    None => tokio::time::sleep(wait).await,
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_cap() {
        let conf = RetryConf {
            max_attempts: 10,
            min_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        // each nominal delay is jittered within ±25%
        for (attempt, nominal) in [(1u32, 100u64), (2, 200), (3, 400), (4, 800), (5, 1_000)] {
            let wait = conf.backoff(attempt).as_millis() as u64;
            let low = nominal * 3 / 4;
            let high = nominal * 5 / 4;
            assert!(
                wait >= low && wait <= high,
                "attempt {attempt} waited {wait}ms, expected {low}..={high}"
            );
        }
    }

    #[tokio::test]
    async fn stops_on_non_retryable() {
        let conf = RetryConf::default();
        let mut calls = 0;
        let res: Result<(), Error> = retry(&conf, None, "test", || {
            calls += 1;
            async { Err(Error::InvalidInput("bad input".to_owned())) }
        })
        .await;
        assert_eq!(calls, 1);
        assert!(matches!(res, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn stops_at_attempt_cap() {
        let conf = RetryConf {
            max_attempts: 3,
            min_delay_ms: 1,
            max_delay_ms: 2,
        };
        let mut calls = 0;
        let res: Result<(), Error> = retry(&conf, None, "test", || {
            calls += 1;
            async { Err(Error::Transient("throttled".to_owned())) }
        })
        .await;
        assert_eq!(calls, 3);
        assert!(matches!(res, Err(Error::Transient(_))));
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let conf = RetryConf {
            max_attempts: 5,
            min_delay_ms: 60_000,
            max_delay_ms: 60_000,
        };
        let token = CancellationToken::new();
        token.cancel();
        let res: Result<(), Error> = retry(&conf, Some(&token), "test", || async {
            Err(Error::Transient("throttled".to_owned()))
        })
        .await;
        assert!(matches!(res, Err(Error::Cancelled(_))));
    }
}
