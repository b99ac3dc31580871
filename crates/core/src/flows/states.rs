use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flows::spec::FinalizeResult;
use crate::slots::{Filled, ResolvedSlot, UiHints};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NextSlot,
    Clarification,
    Redirect,
    Error,
    Complete,
    AlreadyComplete,
    GaveUp,
}

/// Result of one `ingest` or `confirm` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub stage: Stage,
    pub filled: Filled,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiHints>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize_result: Option<FinalizeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl TurnOutcome {
    pub fn new(stage: Stage, filled: Filled) -> Self {
        Self {
            stage,
            filled,
            next_prompt: None,
            ui: None,
            done: false,
            finalize_result: None,
            errors: Vec::new(),
        }
    }

    /// Points the caller at `slot`, prefixing its prompt when `lead` is set.
    pub fn prompting(mut self, slot: &ResolvedSlot, lead: Option<&str>) -> Self {
        self.next_prompt = Some(match lead {
            Some(lead) => format!("{lead} {}", slot.prompt),
            None => slot.prompt.clone(),
        });
        self.ui = Some(slot.ui.clone());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.next_prompt = Some(message.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn completed(mut self, result: FinalizeResult) -> Self {
        self.done = true;
        self.finalize_result = Some(result);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub session_id: String,
    pub flow: String,
    pub next_prompt: String,
    pub ui: UiHints,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resumed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
