//! Bounded retry around a single file's transform.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use notegen_core::{DocumentFile, Error, ProcessingOptions};

use crate::steps::{FileTransform, StepOutcome};

/// A successful value and the retries it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub retries: u32,
}

/// The last error after the retry budget ran out.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub error: E,
    /// Retries attempted after the first failure (equals the budget).
    pub retries: u32,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} retries)", self.error, self.retries)
    }
}

/// Pure retry wrapper: calls an operation until it succeeds or the budget
/// of `max_retries` is spent, sleeping a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryableStep {
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryableStep {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn from_options(options: &ProcessingOptions) -> Self {
        Self::new(
            options.max_retries,
            Duration::from_millis(options.retry_delay_ms),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `op` with retries. `op` receives the zero-based retry number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<Attempted<T>, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut retries = 0;
        loop {
            match op(retries).await {
                Ok(value) => return Ok(Attempted { value, retries }),
                Err(error) if retries < self.max_retries => {
                    retries += 1;
                    debug!(
                        retry = retries,
                        max_retries = self.max_retries,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    if !self.retry_delay.is_zero() {
                        sleep(self.retry_delay).await;
                    }
                }
                Err(error) => return Err(RetryExhausted { error, retries }),
            }
        }
    }

    /// Apply `transform` to `file` with retries.
    pub async fn execute(
        &self,
        file: &DocumentFile,
        transform: &dyn FileTransform,
    ) -> Result<Attempted<StepOutcome>, RetryExhausted<Error>> {
        self.run(|_| transform.apply(file)).await
    }
}
