pub mod chat;
pub mod config;
pub mod flows;
pub mod migrate;

use std::sync::Arc;

use clarifier_agent::ExtractionFallback;
use clarifier_core::config::AppConfig;
use clarifier_core::flows::{
    BudgetEstimator, BulletSummaryFlow, FixedBudgetEstimator, FlowRunner, QuizSetupFlow,
    UnconfiguredBudgetEstimator,
};
use clarifier_core::session::InMemorySessionStore;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\
             \"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Runner over an in-memory store with both built-in flows registered.
/// Without `max_questions` the quiz flow falls back to its default budget.
pub fn local_runner(config: &AppConfig, max_questions: Option<i64>) -> FlowRunner {
    let store = match config.sessions.ttl() {
        Some(ttl) => InMemorySessionStore::with_ttl(ttl),
        None => InMemorySessionStore::new(),
    };
    let estimator: Arc<dyn BudgetEstimator> = match max_questions {
        Some(max_questions) => Arc::new(FixedBudgetEstimator::new(max_questions)),
        None => Arc::new(UnconfiguredBudgetEstimator),
    };

    let mut runner =
        FlowRunner::new(Arc::new(store)).with_settings(config.sessions.runner_settings());
    if let Some(extractor) = ExtractionFallback::from_config(&config.extractor) {
        runner = runner.with_extractor(Arc::new(extractor));
    }
    runner.register_flow(QuizSetupFlow::new(
        estimator,
        config.budget.limits(),
        config.budget.retry_policy(),
    ));
    runner.register_flow(BulletSummaryFlow::default());
    runner
}

fn runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}
