use std::future::Future;
use std::time::Duration;

use log::{info, warn};

/// Attempts made by the default policy.
pub const MAX_RETRIES: usize = 5;
pub(crate) const DEFAULT_RETRY_DELAYS_SECS: [u64; MAX_RETRIES] = [0, 5, 5, 5, 5];

/// How one attempt ended.
pub(crate) enum Attempt<E> {
    /// Worth trying again (timeouts, connection errors, bad status).
    Transient(E),
    /// Retrying cannot help.
    Fatal(E),
}

pub(crate) enum RetryError<E> {
    Exhausted { attempts: usize, last: E },
    Fatal(E),
}

/// Fixed retry budget: one attempt per entry, each preceded by its delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// Build a policy from per-attempt delays in seconds. An empty list still
    /// makes one attempt.
    #[must_use]
    pub fn from_secs(delays_secs: &[u64]) -> Self {
        let delays = if delays_secs.is_empty() {
            vec![Duration::ZERO]
        } else {
            delays_secs.iter().copied().map(Duration::from_secs).collect()
        };
        Self { delays }
    }

    /// `attempts` tries with no waiting in between.
    #[must_use]
    pub fn immediate(attempts: usize) -> Self {
        Self {
            delays: vec![Duration::ZERO; attempts.max(1)],
        }
    }

    #[must_use]
    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    pub(crate) async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, Attempt<E>>>,
    {
        let attempts = self.attempts();
        let mut last = None;

        for (idx, delay) in self.delays.iter().enumerate() {
            let attempt = idx + 1;
            if !delay.is_zero() {
                info!("Retrying {label} in {}s", delay.as_secs());
                tokio::time::sleep(*delay).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(Attempt::Fatal(error)) => return Err(RetryError::Fatal(error)),
                Err(Attempt::Transient(error)) => {
                    warn!("[{attempt}/{attempts}] {label} failed: {error}");
                    last = Some(error);
                }
            }
        }

        match last {
            Some(last) => Err(RetryError::Exhausted { attempts, last }),
            None => unreachable!("retry policy always makes at least one attempt"),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_secs(&DEFAULT_RETRY_DELAYS_SECS)
    }
}
