//! Stage call wrapper: per-call deadline plus bounded transient retry.
//!
//! Transient backend errors are retried with exponential backoff up to
//! a fixed attempt budget. This budget is entirely separate from the
//! Checker refinement bound, which governs audit-driven redrafts, not
//! infrastructure hiccups. A deadline overrun is not retried: the
//! deadline already is the per-call patience budget.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::adapters::BackendError;
use crate::domain::{FailureKind, Stage};

/// Retry policy for transient stage failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    250
}
fn default_max_delay() -> u64 {
    5000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// No retries: one attempt only.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Terminal failure of one stage call.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error("stage {stage} exceeded its {deadline:?} deadline")]
    Timeout { stage: Stage, deadline: Duration },

    #[error("stage {stage} failed after {attempts} attempts: {source}")]
    Backend {
        stage: Stage,
        attempts: u32,
        #[source]
        source: BackendError,
    },
}

impl StageFailure {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Timeout { stage, .. } | Self::Backend { stage, .. } => *stage,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Backend { .. } => FailureKind::Backend,
        }
    }
}

/// Run one stage call under a deadline, retrying transient backend
/// errors per `policy`. `call` is invoked once per attempt.
pub async fn run_stage<T, F, Fut>(
    stage: Stage,
    deadline: Duration,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, StageFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match tokio::time::timeout(deadline, call()).await {
            Err(_) => return Err(StageFailure::Timeout { stage, deadline }),
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                if policy.should_retry(attempt) {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        %stage,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "stage call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                return Err(StageFailure::Backend {
                    stage,
                    attempts: attempt,
                    source: e,
                });
            }
        }
    }
}
