pub mod budget;
pub mod bullet_summary;
pub mod engine;
pub mod quiz_setup;
pub mod spec;
pub mod states;

pub use budget::{
    estimate_with_retry, BudgetError, BudgetEstimate, BudgetEstimator, BudgetLimits,
    BudgetRequest, FixedBudgetEstimator, RetryPolicy, UnconfiguredBudgetEstimator,
};
pub use bullet_summary::{BulletContext, BulletSummaryFlow, BULLET_SUMMARY};
pub use engine::{FlowRunner, RunnerSettings};
pub use quiz_setup::{QuizContext, QuizSetupFlow, QUIZ_SETUP};
pub use spec::{
    check_filled, DynFlow, FinalizeError, FinalizeResult, Flow, Validation, DEFAULT_REDIRECT,
};
pub use states::{Stage, StartOutcome, TurnOutcome};
