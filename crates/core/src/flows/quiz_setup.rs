use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::flows::budget::{
    estimate_with_retry, BudgetError, BudgetEstimator, BudgetLimits, BudgetRequest, RetryPolicy,
};
use crate::flows::spec::{check_filled, FinalizeError, FinalizeResult, Flow, Validation};
use crate::session::SessionMeta;
use crate::slots::{Filled, IntBounds, ParserHint, SlotSpec, SlotType, UiHints};

pub const QUIZ_SETUP: &str = "quiz_setup";

pub const QUESTION_TYPES: &[&str] = &["mcq", "true_false", "fill_blank", "short_answer"];
pub const DIFFICULTIES: &[&str] = &["easy", "medium", "hard"];

const INITIAL_DIFFICULTY: &str = "medium";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizContext {
    pub subject_id: String,
    pub doc_ids: Vec<String>,
    pub min_questions: i64,
    pub max_questions: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<Value>,
    /// Set when the start-time estimate failed and the default was used.
    #[serde(default)]
    pub budget_degraded: bool,
}

impl QuizContext {
    fn count_bounds(&self) -> IntBounds {
        IntBounds::new(self.min_questions, self.max_questions)
    }
}

/// Collects question types, difficulty, and question count for a quiz job.
pub struct QuizSetupFlow {
    estimator: Arc<dyn BudgetEstimator>,
    limits: BudgetLimits,
    retry: RetryPolicy,
    slots: Vec<SlotSpec<QuizContext>>,
}

impl QuizSetupFlow {
    pub fn new(
        estimator: Arc<dyn BudgetEstimator>,
        limits: BudgetLimits,
        retry: RetryPolicy,
    ) -> Self {
        Self { estimator, limits, retry, slots: quiz_slots() }
    }

    async fn estimate(
        &self,
        doc_ids: &[String],
        difficulty: &str,
    ) -> Result<(i64, Option<Value>), BudgetError> {
        let request =
            BudgetRequest { doc_ids: doc_ids.to_vec(), difficulty: difficulty.to_string() };
        let estimate = estimate_with_retry(self.estimator.as_ref(), &request, &self.retry).await?;
        Ok((self.limits.clamp(estimate.max_questions), estimate.rationale))
    }
}

fn quiz_slots() -> Vec<SlotSpec<QuizContext>> {
    vec![
        SlotSpec::new("question_types", SlotType::MultiEnum, |_: &QuizContext| {
            "Which question types would you like? You can pick several: multiple choice, \
             true/false, fill in the blank, or short answer."
                .to_string()
        })
        .with_allowed(QUESTION_TYPES)
        .with_hint(ParserHint::QuestionType)
        .with_ui(|_| {
            UiHints::quick([
                "Multiple choice",
                "True/False",
                "Fill in the blank",
                "Short answer",
                "All types",
            ])
        }),
        SlotSpec::new("difficulty", SlotType::SingleEnum, |_: &QuizContext| {
            "How difficult should the quiz be: easy, medium, or hard?".to_string()
        })
        .with_allowed(DIFFICULTIES)
        .with_hint(ParserHint::Difficulty)
        .with_ui(|_| UiHints::quick(["Easy", "Medium", "Hard"])),
        SlotSpec::new("requested_count", SlotType::BoundedInt, |ctx: &QuizContext| {
            format!(
                "How many questions would you like? Your documents support between {} and {}.",
                ctx.min_questions, ctx.max_questions
            )
        })
        .with_bounds(QuizContext::count_bounds)
        .with_hint(ParserHint::Count)
        .with_ui(|ctx| {
            let middle = (ctx.min_questions + ctx.max_questions) / 2;
            let mut quick = vec![ctx.min_questions, middle, ctx.max_questions];
            quick.dedup();
            UiHints::quick(quick.into_iter().map(|count| count.to_string()))
        }),
    ]
}

#[async_trait]
impl Flow for QuizSetupFlow {
    type Context = QuizContext;

    fn id(&self) -> &'static str {
        QUIZ_SETUP
    }

    fn slots(&self) -> &[SlotSpec<QuizContext>] {
        &self.slots
    }

    async fn init(&self, meta: &SessionMeta) -> QuizContext {
        let (max_questions, rationale, budget_degraded) =
            match self.estimate(&meta.doc_ids, INITIAL_DIFFICULTY).await {
                Ok((max_questions, rationale)) => (max_questions, rationale, false),
                Err(error) => {
                    tracing::warn!(
                        event_name = "clarifier.budget.degraded",
                        session_id = %meta.session_id,
                        flow_id = QUIZ_SETUP,
                        error = %error,
                        fallback = self.limits.fallback(),
                        "budget estimate unavailable, using default question budget"
                    );
                    (self.limits.fallback(), None, true)
                }
            };

        QuizContext {
            subject_id: meta.subject_id.clone(),
            doc_ids: meta.doc_ids.clone(),
            min_questions: self.limits.min_count.min(max_questions),
            max_questions,
            rationale,
            budget_degraded,
        }
    }

    async fn validate(&self, filled: &Filled, ctx: &QuizContext) -> Validation {
        let mut errors = check_filled(&self.slots, filled, ctx);
        let no_types = filled
            .get("question_types")
            .and_then(|value| value.as_list())
            .is_some_and(<[String]>::is_empty);
        if no_types {
            errors.push("Pick at least one question type.".to_string());
        }

        if errors.is_empty() {
            Validation::accept(filled.clone())
        } else {
            Validation::reject(errors, filled.clone())
        }
    }

    async fn finalize(
        &self,
        filled: &Filled,
        ctx: &QuizContext,
    ) -> Result<FinalizeResult, FinalizeError> {
        let question_types = filled
            .get("question_types")
            .and_then(|value| value.as_list())
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let difficulty = filled
            .get("difficulty")
            .and_then(|value| value.as_text())
            .unwrap_or(INITIAL_DIFFICULTY)
            .to_string();
        let requested_count = filled
            .get("requested_count")
            .and_then(|value| value.as_integer())
            .unwrap_or(ctx.min_questions);

        let (max_questions, rationale, budget_degraded) =
            match self.estimate(&ctx.doc_ids, &difficulty).await {
                Ok((max_questions, rationale)) => (max_questions, rationale, false),
                Err(BudgetError::NotConfigured) => {
                    (ctx.max_questions, ctx.rationale.clone(), ctx.budget_degraded)
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "clarifier.budget.finalize_degraded",
                        flow_id = QUIZ_SETUP,
                        subject_id = %ctx.subject_id,
                        error = %error,
                        fallback_max = ctx.max_questions,
                        "budget re-estimate failed at finalize; using the start budget"
                    );
                    (ctx.max_questions, ctx.rationale.clone(), true)
                }
            };
        let count = IntBounds::new(ctx.min_questions.min(max_questions), max_questions)
            .clamp(requested_count);

        Ok(FinalizeResult::ok(json!({
            "flow": QUIZ_SETUP,
            "subjectId": ctx.subject_id,
            "docIds": ctx.doc_ids,
            "questionTypes": question_types,
            "difficulty": difficulty,
            "count": count,
            "requestedCount": requested_count,
            "maxQuestions": max_questions,
            "rationale": rationale,
            "budgetDegraded": budget_degraded,
        })))
    }

    fn redirect_message(&self, _ctx: &QuizContext) -> String {
        "I can only help set up your quiz right now. Let's finish the quiz settings first."
            .to_string()
    }

    fn start_fields(&self, ctx: &QuizContext) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("maxQuestions".to_string(), json!(ctx.max_questions));
        fields.insert("minQuestions".to_string(), json!(ctx.min_questions));
        if let Some(rationale) = &ctx.rationale {
            fields.insert("rationale".to_string(), rationale.clone());
        }
        fields
    }
}
