//! Waiter - Poll a refresh operation until the backend reaches a status
//!
//! Create and delete calls on the backend return before the object is
//! usable (or gone). `StateChangeConf` re-reads the object until its
//! status enters the target set, leaves the pending set, or time runs out.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::provider::{ProviderError, ProviderResult};
use crate::timeouts::DEFAULT_TIMEOUT;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// How a wait ended successfully
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<T> {
    /// The status entered the target set
    Reached { object: T, status: String },
    /// The object disappeared while waiting with `until_gone`
    Gone,
}

impl<T> Settled<T> {
    pub fn into_object(self) -> Option<T> {
        match self {
            Settled::Reached { object, .. } => Some(object),
            Settled::Gone => None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match self {
            Settled::Reached { status, .. } => Some(status),
            Settled::Gone => None,
        }
    }
}

/// Configuration of one wait
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pending: Vec<String>,
    target: Vec<String>,
    timeout: Duration,
    delay: Duration,
    min_timeout: Duration,
    poll_interval: Option<Duration>,
    transient_codes: Vec<u16>,
    until_gone: bool,
    describe: String,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout: DEFAULT_TIMEOUT,
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: None,
            transient_codes: Vec::new(),
            until_gone: false,
            describe: "resource".to_string(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait before the first refresh
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Smallest spacing between two refreshes
    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    /// Fixed spacing between refreshes instead of exponential backoff
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Backend status codes that mean "try again" instead of failure
    pub fn transient_codes(mut self, codes: &[u16]) -> Self {
        self.transient_codes = codes.to_vec();
        self
    }

    /// Treat a not-found refresh as success
    pub fn until_gone(mut self) -> Self {
        self.until_gone = true;
        self
    }

    /// Name used in log lines (e.g., "subnet 4f6c...")
    pub fn describe(mut self, what: impl Into<String>) -> Self {
        self.describe = what.into();
        self
    }

    /// Poll `refresh` until the status settles
    ///
    /// `refresh` returns the object with its current status. Errors other
    /// than not-found (with `until_gone`) and allowlisted status codes
    /// abort the wait.
    pub async fn wait_for_state<T, F, Fut>(&self, mut refresh: F) -> ProviderResult<Settled<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<(T, String)>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut backoff = INITIAL_BACKOFF;
        let mut last_status = String::new();

        debug!(
            "Waiting for {} to become {:?} (timeout {:?})",
            self.describe, self.target, self.timeout
        );

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay.min(self.timeout)).await;
        }

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out(last_status, now - start));
            }

            let outcome = match tokio::time::timeout(deadline - now, refresh()).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(self.timed_out(last_status, start.elapsed())),
            };

            match outcome {
                Ok((object, status)) => {
                    if self.target.contains(&status) {
                        debug!("{} reached {}", self.describe, status);
                        return Ok(Settled::Reached { object, status });
                    }
                    // An empty pending set accepts any non-target status
                    if !self.pending.is_empty() && !self.pending.contains(&status) {
                        return Err(ProviderError::UnexpectedStatus {
                            status,
                            target: self.target.clone(),
                        });
                    }
                    debug!("{} is {}, still waiting", self.describe, status);
                    last_status = status;
                }
                Err(e) if self.until_gone && e.is_not_found() => {
                    debug!("{} is gone", self.describe);
                    return Ok(Settled::Gone);
                }
                Err(e) => match e.status_code() {
                    Some(code) if self.transient_codes.contains(&code) => {
                        warn!(
                            "Transient error while waiting for {}, retrying: {}",
                            self.describe, e
                        );
                    }
                    _ => return Err(e),
                },
            }

            let wait = self.poll_interval.unwrap_or(backoff).max(self.min_timeout);
            backoff = (backoff * 2).min(MAX_BACKOFF);
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(wait.min(remaining)).await;
        }
    }

    fn timed_out(&self, last_status: String, elapsed: Duration) -> ProviderError {
        ProviderError::Timeout {
            target: self.target.clone(),
            last_status,
            elapsed,
        }
    }
}
