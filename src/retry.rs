//! Bounded readiness polling with exponential backoff and jitter.
//!
//! The credential-provisioning path has to wait for the control plane to
//! materialize a token secret after a ServiceAccount is created. That wait is
//! a readiness poll, not a failure retry: a probe may report "not ready yet"
//! any number of times (bounded), but a remote error aborts immediately.
//!
//! # Example
//!
//! ```ignore
//! use labspace::retry::{poll_until, RetryConfig};
//!
//! let secret = poll_until(&RetryConfig::default(), "token_secret", || async {
//!     control.service_account_secret("ns-demo-jane-doe", "jane-doe").await
//! })
//! .await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Configuration for bounded readiness polls.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of probe attempts before giving up
    pub max_attempts: u32,
    /// Initial delay between probes
    pub initial_delay: Duration,
    /// Maximum delay between probes
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }
}

/// Poll an async probe until it reports ready, with backoff and jitter.
///
/// The probe returns `Ok(Some(value))` when the awaited state is ready,
/// `Ok(None)` when it is not ready yet, and `Err` on a remote failure.
///
/// # Returns
///
/// `Ok(Some(value))` on readiness, `Ok(None)` when `max_attempts` probes all
/// reported not-ready, or the probe's error unchanged - remote failures are
/// never retried.
pub async fn poll_until<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut probe: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, E>>,
{
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_attempts {
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }

        if attempt == config.max_attempts {
            break;
        }

        // Jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        debug!(
            operation = %operation_name,
            attempt = attempt,
            delay_ms = jittered_delay.as_millis(),
            "Not ready yet, polling again"
        );

        tokio::time::sleep(jittered_delay).await;

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier)
                .min(config.max_delay.as_secs_f64()),
        );
    }

    warn!(
        operation = %operation_name,
        attempts = config.max_attempts,
        "Gave up waiting for readiness"
    );
    Ok(None)
}
