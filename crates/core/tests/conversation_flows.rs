use std::sync::Arc;

use async_trait::async_trait;
use clarifier_core::audit::{
    InMemoryAuditSink, SESSION_COMPLETED, SESSION_STARTED, SLOT_COMMITTED, TURN_REDIRECTED,
};
use clarifier_core::flows::{
    BudgetError, BudgetEstimate, BudgetEstimator, BudgetLimits, BudgetRequest, BulletSummaryFlow,
    FixedBudgetEstimator, FlowRunner, QuizSetupFlow, RetryPolicy, RunnerSettings, Stage,
};
use clarifier_core::session::{InMemorySessionStore, SessionMeta};
use clarifier_core::slots::SlotValue;
use serde_json::json;

fn meta(session_id: &str, docs: usize) -> SessionMeta {
    SessionMeta {
        session_id: session_id.to_string(),
        user_id: "instructor-7".to_string(),
        subject_id: "chem-201".to_string(),
        doc_ids: (0..docs).map(|n| format!("doc-{n}")).collect(),
    }
}

fn runner_with(estimator: Arc<dyn BudgetEstimator>, audit: InMemoryAuditSink) -> FlowRunner {
    let runner = FlowRunner::new(Arc::new(InMemorySessionStore::new()))
        .with_audit(Arc::new(audit))
        .with_settings(RunnerSettings { max_slot_failures: Some(3) });
    runner.register_flow(QuizSetupFlow::new(
        estimator,
        BudgetLimits::default(),
        RetryPolicy::immediate(3),
    ));
    runner.register_flow(BulletSummaryFlow::default());
    runner
}

struct Unreachable;

#[async_trait]
impl BudgetEstimator for Unreachable {
    async fn estimate(&self, _request: &BudgetRequest) -> Result<BudgetEstimate, BudgetError> {
        Err(BudgetError::Transport("connection refused".to_string()))
    }
}

#[tokio::test]
async fn quiz_setup_conversation_end_to_end() {
    let audit = InMemoryAuditSink::default();
    let runner = runner_with(Arc::new(FixedBudgetEstimator::new(30)), audit.clone());

    let started = runner.start("quiz_setup", meta("chat-1", 2)).await.expect("start");
    assert_eq!(started.extra.get("maxQuestions"), Some(&json!(30)));

    let redirected = runner.ingest("chat-1", "can you explain covalent bonds?").await.expect("q");
    assert_eq!(redirected.stage, Stage::Redirect);

    let types = runner.ingest("chat-1", "multiple choice and short answer").await.expect("types");
    assert_eq!(types.stage, Stage::NextSlot);

    let difficulty = runner.ingest("chat-1", "make it hard").await.expect("difficulty");
    assert_eq!(difficulty.filled.get("difficulty"), Some(&SlotValue::Text("hard".to_string())));

    let done = runner.ingest("chat-1", "twenty five questions").await.expect("count");
    assert_eq!(done.stage, Stage::Complete);
    assert!(done.done);
    let result = done.finalize_result.expect("finalized");
    assert_eq!(result.status, 200);
    assert_eq!(result.body["count"], json!(25));
    assert_eq!(result.body["questionTypes"], json!(["mcq", "short_answer"]));
    assert_eq!(result.body["subjectId"], json!("chem-201"));

    assert_eq!(
        audit.event_types(),
        vec![
            SESSION_STARTED,
            TURN_REDIRECTED,
            SLOT_COMMITTED,
            SLOT_COMMITTED,
            SLOT_COMMITTED,
            SESSION_COMPLETED,
        ]
    );
}

#[tokio::test]
async fn budget_outage_degrades_start_but_not_the_conversation() {
    let runner = runner_with(Arc::new(Unreachable), InMemoryAuditSink::default());

    let started = runner.start("quiz_setup", meta("chat-2", 1)).await.expect("start");
    assert_eq!(started.extra.get("maxQuestions"), Some(&json!(10)));
    assert!(started.next_prompt.contains("question types"));

    runner.ingest("chat-2", "true/false").await.expect("types");
    let count_prompt = runner.ingest("chat-2", "easy").await.expect("difficulty");
    assert!(count_prompt.next_prompt.as_deref().is_some_and(|prompt| prompt.contains("10")));
}

#[tokio::test]
async fn bullet_summary_reports_not_implemented_on_completion() {
    let runner = runner_with(Arc::new(FixedBudgetEstimator::new(20)), InMemoryAuditSink::default());

    let started = runner.start("bullet_summary", meta("sum-1", 2)).await.expect("start");
    assert_eq!(started.extra.get("maxHighlights"), Some(&json!(10)));

    runner.ingest("sum-1", "6 highlights").await.expect("count");
    let done = runner.ingest("sum-1", "no thanks").await.expect("citations");
    assert_eq!(done.stage, Stage::Complete);
    assert_eq!(done.filled.get("include_citations"), Some(&SlotValue::Flag(false)));

    let result = done.finalize_result.expect("fixed payload");
    assert_eq!(result.status, 501);
    assert_eq!(result.body["error"], json!("not_implemented"));
}

#[tokio::test]
async fn turn_outcome_serializes_to_wire_shape() {
    let runner = runner_with(Arc::new(FixedBudgetEstimator::new(20)), InMemoryAuditSink::default());
    runner.start("quiz_setup", meta("wire-1", 1)).await.expect("start");

    let outcome = runner.ingest("wire-1", "fill in the blank").await.expect("types");
    let wire = serde_json::to_value(&outcome).expect("serializes");

    assert_eq!(wire["stage"], json!("next_slot"));
    assert_eq!(wire["filled"], json!({ "question_types": ["fill_blank"] }));
    assert!(wire["nextPrompt"].is_string());
    assert!(wire["ui"]["quick"].is_array());
    assert!(wire.get("done").is_none());
    assert!(wire.get("finalizeResult").is_none());
}

#[tokio::test]
async fn repeated_nonsense_gives_up_at_the_configured_cap() {
    let runner = runner_with(Arc::new(FixedBudgetEstimator::new(20)), InMemoryAuditSink::default());
    runner.start("quiz_setup", meta("cap-1", 1)).await.expect("start");

    for _ in 0..2 {
        let outcome = runner.ingest("cap-1", "banana").await.expect("turn");
        assert_eq!(outcome.stage, Stage::Clarification);
    }
    let gave_up = runner.ingest("cap-1", "banana").await.expect("turn");
    assert_eq!(gave_up.stage, Stage::GaveUp);

    let after = runner.ingest("cap-1", "mcq").await.expect("turn");
    assert_eq!(after.stage, Stage::GaveUp);
}
