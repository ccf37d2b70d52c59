//! Fixed-interval polling and retry under a deadline and cancellation token

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Timing of polling loops and transient-failure retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay between two state queries
    pub interval: Duration,
    /// Delay before retrying a call that failed transiently
    pub retry_delay: Duration,
    /// Overall budget for one operation; `None` waits forever
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            retry_delay: Duration::from_secs(10),
            deadline: None,
        }
    }
}

/// Drives the waits of one operation
///
/// The deadline is measured from construction, so every wait of the operation
/// shares the same budget.
#[derive(Debug, Clone)]
pub struct Poller {
    policy: PollPolicy,
    token: CancellationToken,
    expires_at: Option<Instant>,
}

impl Poller {
    /// Start the operation clock
    pub fn new(policy: PollPolicy, token: CancellationToken) -> Self {
        let expires_at = policy.deadline.map(|d| Instant::now() + d);
        Self {
            policy,
            token,
            expires_at,
        }
    }

    /// Fail if the operation was already cancelled
    pub(crate) fn ensure_active(&self, what: &str) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled(what.to_string()));
        }
        Ok(())
    }

    /// Run `fut` unless cancellation wins the race
    pub(crate) async fn guarded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.ensure_active(what)?;
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Error::Cancelled(what.to_string())),
            result = fut => result,
        }
    }

    /// Sleep for `delay`, failing if the deadline would pass or the token fires
    async fn pause(&self, what: &str, delay: Duration) -> Result<()> {
        if let Some(expires_at) = self.expires_at {
            if Instant::now() + delay > expires_at {
                return Err(Error::Timeout(what.to_string()));
            }
        }
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Error::Cancelled(what.to_string())),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Query `check` every interval until it reports `true`
    pub async fn wait_until<F, Fut>(&self, what: &str, mut check: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let mut polls: u64 = 0;
        loop {
            polls += 1;
            if self.guarded(what, check()).await? {
                debug!(what, polls, "wait condition reached");
                return Ok(());
            }
            debug!(what, polls, "wait condition not reached yet");
            self.pause(what, self.policy.interval).await?;
        }
    }

    /// Call `operation`, retrying after `retry_delay` while `is_transient` holds
    ///
    /// Any other failure is returned immediately.
    pub async fn retry_transient<F, Fut, T, P>(
        &self,
        what: &str,
        is_transient: P,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.guarded(what, operation()).await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) => {
                    debug!(
                        what,
                        attempt,
                        delay_ms = self.policy.retry_delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    self.pause(what, self.policy.retry_delay).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
