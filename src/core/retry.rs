use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::error::{ProvisionError, Result};

const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_TIMEOUT_SECS: u64 = 45 * 60;
const POLL_TIMEOUT_ENV: &str = "EDGE_PROVISION_POLL_TIMEOUT_SECS";

/// Exponential backoff schedule for polling eventually-consistent resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub initial: Duration,
    pub max_interval: Duration,
    pub multiplier: u32,
    pub timeout: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            multiplier: 2,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl PollSchedule {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Applies the `EDGE_PROVISION_POLL_TIMEOUT_SECS` override, if set and valid.
    pub fn with_env_override(self) -> Self {
        match resolve_timeout(std::env::var(POLL_TIMEOUT_ENV).ok().as_deref()) {
            Some(timeout) => self.with_timeout(timeout),
            None => self,
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.multiplier.max(1))
            .min(self.max_interval)
    }
}

fn resolve_timeout(raw: Option<&str>) -> Option<Duration> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            warn!("[poll] invalid {POLL_TIMEOUT_ENV} value {raw:?}; using default");
            None
        }
    }
}

/// Calls `attempt` on the backoff schedule until it yields a value.
///
/// The attempt returns:
/// - `Ok(Some(value))` when the awaited condition holds
/// - `Ok(None)` when it should be polled again
/// - `Err(_)` to stop immediately
///
/// The attempt may borrow its captures mutably between attempts. Dropping the
/// returned future cancels the in-flight attempt.
pub async fn poll_until<T, F>(operation: &str, schedule: PollSchedule, mut attempt: F) -> Result<T>
where
    F: AsyncFnMut() -> Result<Option<T>>,
{
    let started = Instant::now();
    let mut interval = schedule.initial;
    let mut attempt_no = 0u32;

    loop {
        attempt_no += 1;
        debug!("[poll] {operation} attempt {attempt_no}");

        if let Some(value) = attempt().await? {
            debug!(
                "[poll] {operation} settled after {}ms (attempt {attempt_no})",
                started.elapsed().as_millis()
            );
            return Ok(value);
        }

        let elapsed = started.elapsed();
        if elapsed >= schedule.timeout {
            warn!(
                "[poll] {operation} still pending after {}ms (attempt {attempt_no})",
                elapsed.as_millis()
            );
            return Err(ProvisionError::Timeout(format!(
                "{operation} did not settle within {}s",
                schedule.timeout.as_secs()
            )));
        }

        let remaining = schedule.timeout.saturating_sub(elapsed);
        let wait = interval.min(remaining);
        debug!(
            "[poll] {operation} pending, waiting {}ms before next check ({}ms remaining)",
            wait.as_millis(),
            remaining.as_millis()
        );
        tokio::time::sleep(wait).await;
        interval = schedule.next_interval(interval);
    }
}
