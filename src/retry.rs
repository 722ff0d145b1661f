use log::{ debug, warn };
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Result of a single attempt handed back to [`RetryPolicy::run`].
#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    /// Soft miss: nothing went wrong but the value is not usable yet.
    Retry,
    Failed(E),
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success {
        value: T,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        /// Error of the final attempt only; `None` when it was a soft miss.
        last_error: Option<E>,
    },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. } => *attempts,
            RetryOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            RetryOutcome::Success { value, .. } => Some(value),
            RetryOutcome::Exhausted { .. } => None,
        }
    }
}

/// Flat fixed-delay retry: no growth, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Runs `op` until it returns [`Attempt::Done`] or the attempt ceiling is hit.
    /// `op` receives the 1-based attempt number. No sleep follows the final attempt.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> RetryOutcome<T, E>
        where F: FnMut(u32) -> Fut, Fut: Future<Output = Attempt<T, E>>, E: Display
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match op(attempt).await {
                Attempt::Done(value) => {
                    debug!("{} succeeded on attempt {}/{}", label, attempt, max_attempts);
                    return RetryOutcome::Success { value, attempts: attempt };
                }
                Attempt::Retry => {
                    debug!("{} returned nothing on attempt {}/{}", label, attempt, max_attempts);
                    last_error = None;
                }
                Attempt::Failed(e) => {
                    warn!("{} failed on attempt {}/{}: {}", label, attempt, max_attempts, e);
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        RetryOutcome::Exhausted { attempts: max_attempts, last_error }
    }
}
