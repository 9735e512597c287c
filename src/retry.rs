//! Capped exponential backoff with jitter and an overall deadline for the
//! completion call.

use std::future::Future;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use crate::error::{Error, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const INITIAL_INTERVAL_MILLIS: u64 = 500;
const MAX_INTERVAL_SECS: u64 = 8;
const DEADLINE_SECS: u64 = 90;
const RANDOMIZATION_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  /// Total number of attempts, the first one included
  pub max_attempts:     u32,
  pub initial_interval: Duration,
  pub max_interval:     Duration,
  /// Wall-clock budget for all attempts and the sleeps between them
  pub deadline:         Duration
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts:     DEFAULT_MAX_ATTEMPTS,
      initial_interval: Duration::from_millis(INITIAL_INTERVAL_MILLIS),
      max_interval:     Duration::from_secs(MAX_INTERVAL_SECS),
      deadline:         Duration::from_secs(DEADLINE_SECS)
    }
  }
}

impl RetryPolicy {
  pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
    self.max_attempts = max_attempts;
    self
  }

  fn backoff(&self) -> ExponentialBackoff {
    let mut backoff = ExponentialBackoff {
      initial_interval: self.initial_interval,
      current_interval: self.initial_interval,
      max_interval: self.max_interval,
      randomization_factor: RANDOMIZATION_FACTOR,
      max_elapsed_time: Some(self.deadline),
      ..Default::default()
    };
    backoff.reset();
    backoff
  }
}

/// Errors worth another attempt: provider failures other than bad
/// credentials. Everything else is returned straight away.
fn is_retryable(error: &Error) -> bool {
  matches!(error, Error::ExternalService { .. }) && !error.is_auth_error()
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, the
/// attempts run out or the deadline passes. `attempt` receives the 1-based
/// attempt number. The last failure is returned.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T>>
{
  let started = Instant::now();
  let mut backoff = policy.backoff();
  let max_attempts = policy.max_attempts.max(1);
  let mut attempts = 0;

  loop {
    attempts += 1;
    let remaining = policy.deadline.saturating_sub(started.elapsed());

    let error = match tokio::time::timeout(remaining, attempt(attempts)).await {
      Ok(Ok(value)) => return Ok(value),
      Ok(Err(error)) => error,
      Err(_) =>
        Error::ExternalService {
          code:    "timeout".to_string(),
          message: format!("No response within {:?}", policy.deadline)
        },
    };

    if !is_retryable(&error) || attempts >= max_attempts {
      return Err(error);
    }

    let wait = match backoff.next_backoff() {
      Some(wait) if started.elapsed() + wait < policy.deadline => wait,
      _ => return Err(error)
    };

    log::warn!("Attempt {attempts}/{max_attempts} failed: {error}. Retrying in {wait:?}");
    tokio::time::sleep(wait).await;
  }
}
