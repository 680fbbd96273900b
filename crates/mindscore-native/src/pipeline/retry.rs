//! Bounded retry with backoff and cancellation
//!
//! Attempts run on the calling thread. Between attempts the thread waits on
//! the cancellation token, so a cancel wakes it immediately instead of after
//! the full backoff.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use mindscore_core::error::PredictingError;

use crate::config::RetryConfig;

/// Decides whether an attempt's error is worth another attempt.
pub trait Recoverable {
    /// True if a later attempt may succeed
    fn is_recoverable(&self) -> bool;
}

impl Recoverable for PredictingError {
    fn is_recoverable(&self) -> bool {
        PredictingError::is_recoverable(self)
    }
}

/// Shared flag that stops a retry loop.
///
/// Clones share state; cancelling any clone cancels them all.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    /// Create an uncancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and wake every waiter
    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        let mut cancelled = match flag.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *cancelled = true;
        cvar.notify_all();
    }

    /// Whether [`Self::cancel`] has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        flag.lock().map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
    }

    /// Sleep up to `timeout`. Returns `true` if cancelled before or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = match flag.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match cvar.wait_timeout_while(guard, timeout, |cancelled| !*cancelled) {
            Ok((guard, _)) => *guard,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

/// How a retry loop ended without success.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Every attempt failed with a recoverable error
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: E,
    },
    /// An attempt failed with an unrecoverable error
    Aborted(E),
    /// The token was cancelled
    Cancelled,
    /// The deadline passed
    DeadlineExceeded {
        /// Attempts made
        attempts: u32,
    },
}

impl From<RetryError<PredictingError>> for PredictingError {
    fn from(err: RetryError<PredictingError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, .. } => Self::ExceedMaximumAttempts { attempts },
            RetryError::Aborted(e) => e,
            RetryError::Cancelled => Self::Cancelled,
            RetryError::DeadlineExceeded { attempts } => Self::DeadlineExceeded { attempts },
        }
    }
}

/// Attempt bound and wait between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up (at least one attempt always runs)
    pub max_attempts: u32,
    /// Wait after a recoverable failure
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: config.backoff(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }

    /// Run `attempt` until it succeeds, fails unrecoverably, or the bound is hit.
    ///
    /// `attempt` receives the 1-based attempt number.
    pub fn run<T, E, F>(&self, token: &CancellationToken, attempt: F) -> Result<T, RetryError<E>>
    where
        E: Recoverable + std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        self.run_with_deadline(token, None, attempt)
    }

    /// [`Self::run`] that also stops once `deadline` has passed.
    pub fn run_with_deadline<T, E, F>(
        &self,
        token: &CancellationToken,
        deadline: Option<Instant>,
        mut attempt: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Recoverable + std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut made = 0;

        loop {
            if token.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(RetryError::DeadlineExceeded { attempts: made });
            }

            made += 1;
            let err = match attempt(made) {
                Ok(value) => {
                    debug!(attempt = made, "Attempt succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_recoverable() {
                warn!(attempt = made, error = %err, "Unrecoverable error, giving up");
                return Err(RetryError::Aborted(err));
            }
            if made >= max_attempts {
                warn!(attempts = made, error = %err, "Retry attempts exhausted");
                return Err(RetryError::Exhausted { attempts: made, last: err });
            }

            warn!(attempt = made, max_attempts, error = %err, "Recoverable error, retrying");

            let wait = match deadline {
                Some(d) => self.backoff.min(d.saturating_duration_since(Instant::now())),
                None => self.backoff,
            };
            if token.wait_timeout(wait) {
                return Err(RetryError::Cancelled);
            }
        }
    }
}
