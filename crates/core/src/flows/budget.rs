//! Contract with the external budget estimation service and the bounded
//! retry policy used around it.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetRequest {
    pub doc_ids: Vec<String>,
    pub difficulty: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetEstimate {
    pub max_questions: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<Value>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    #[error("budget service transport failure: {0}")]
    Transport(String),
    #[error("budget service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("budget service returned an unusable payload: {0}")]
    InvalidResponse(String),
    #[error("budget service is not configured")]
    NotConfigured,
}

#[async_trait]
pub trait BudgetEstimator: Send + Sync {
    async fn estimate(&self, request: &BudgetRequest) -> Result<BudgetEstimate, BudgetError>;
}

/// Answers every request with the same estimate. Used offline and in tests.
#[derive(Clone, Debug)]
pub struct FixedBudgetEstimator {
    estimate: BudgetEstimate,
}

impl FixedBudgetEstimator {
    pub fn new(max_questions: i64) -> Self {
        Self { estimate: BudgetEstimate { max_questions, rationale: None } }
    }

    pub fn with_rationale(mut self, rationale: Value) -> Self {
        self.estimate.rationale = Some(rationale);
        self
    }
}

#[async_trait]
impl BudgetEstimator for FixedBudgetEstimator {
    async fn estimate(&self, _request: &BudgetRequest) -> Result<BudgetEstimate, BudgetError> {
        Ok(self.estimate.clone())
    }
}

/// Stands in when no budget service URL is configured; flows fall back to
/// their defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredBudgetEstimator;

#[async_trait]
impl BudgetEstimator for UnconfiguredBudgetEstimator {
    async fn estimate(&self, _request: &BudgetRequest) -> Result<BudgetEstimate, BudgetError> {
        Err(BudgetError::NotConfigured)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(150),
            max_jitter: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, base_delay: Duration::ZERO, max_jitter: Duration::ZERO }
    }

    /// Delay after the zero-based `attempt` failed: `base * 2^attempt` plus
    /// uniform jitter in `[0, max_jitter]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        exponential + jitter
    }
}

/// Calls the estimator up to `policy.max_attempts` times and returns the
/// first usable estimate or the last error.
pub async fn estimate_with_retry(
    estimator: &dyn BudgetEstimator,
    request: &BudgetRequest,
    policy: &RetryPolicy,
) -> Result<BudgetEstimate, BudgetError> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = BudgetError::NotConfigured;

    for attempt in 0..attempts {
        let error = match estimator.estimate(request).await {
            Ok(estimate) if estimate.max_questions > 0 => return Ok(estimate),
            Ok(estimate) => BudgetError::InvalidResponse(format!(
                "maxQuestions must be positive, got {}",
                estimate.max_questions
            )),
            Err(BudgetError::NotConfigured) => return Err(BudgetError::NotConfigured),
            Err(error) => error,
        };

        tracing::warn!(
            event_name = "clarifier.budget.attempt_failed",
            attempt = attempt + 1,
            max_attempts = attempts,
            error = %error,
            "budget estimate attempt failed"
        );
        last_error = error;

        if attempt + 1 < attempts {
            tokio::time::sleep(policy.backoff(attempt)).await;
        }
    }

    Err(last_error)
}

/// Operator window every budget figure is clamped into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub min_count: i64,
    pub max_count_cap: i64,
    pub default_max: i64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self { min_count: 5, max_count_cap: 50, default_max: 10 }
    }
}

impl BudgetLimits {
    pub fn clamp(&self, max_questions: i64) -> i64 {
        let low = self.min_count.min(self.max_count_cap);
        let high = self.min_count.max(self.max_count_cap);
        max_questions.clamp(low, high)
    }

    pub fn fallback(&self) -> i64 {
        self.clamp(self.default_max)
    }
}
