//! Seam for the optional extraction fallback consulted when the parser bank
//! produces nothing for the current slot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::slots::parser::normalize_choice;
use crate::slots::{ParserHint, ResolvedSlot, SlotType, SlotValue};

/// The only keys an extractor may carry forward. Lives for a single turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub out_of_scope: bool,
}

impl ExtractorResult {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Picks the field answering `slot`, by slot key first and parser hint
    /// second, and shapes it to the slot type. Enum strings are normalized
    /// through the slot's synonym table; integers are left unclamped so the
    /// runner's bounds check can reject them.
    pub fn value_for(&self, slot: &ResolvedSlot) -> Option<SlotValue> {
        let field = match slot.key.as_str() {
            "question_types" => Field::Choices,
            "difficulty" => Field::Choice,
            "requested_count" | "count" => Field::Number,
            _ => match slot.hint? {
                ParserHint::QuestionType => Field::Choices,
                ParserHint::Difficulty => Field::Choice,
                ParserHint::Count => Field::Number,
            },
        };

        let choices = match field {
            Field::Choices => self.question_types.clone()?,
            Field::Choice => vec![self.difficulty.clone()?],
            Field::Number => {
                let number = match slot.key.as_str() {
                    "count" => self.count.or(self.requested_count),
                    _ => self.requested_count.or(self.count),
                }?;
                return (slot.slot_type == SlotType::BoundedInt)
                    .then_some(SlotValue::Integer(number));
            }
        };

        let mut normalized = Vec::with_capacity(choices.len());
        for choice in choices.iter().filter(|choice| !choice.trim().is_empty()) {
            let value = normalize_choice(slot, choice);
            if !normalized.contains(&value) {
                normalized.push(value);
            }
        }

        match slot.slot_type {
            SlotType::MultiEnum if !normalized.is_empty() => Some(SlotValue::List(normalized)),
            SlotType::SingleEnum => normalized.into_iter().next().map(SlotValue::Text),
            _ => None,
        }
    }
}

enum Field {
    Choices,
    Choice,
    Number,
}

/// Implementations must never fail outward: any internal problem degrades to
/// an empty [`ExtractorResult`].
#[async_trait]
pub trait SlotExtractor: Send + Sync {
    async fn extract(&self, text: &str, slot_key: &str, hint: Option<ParserHint>)
        -> ExtractorResult;
}
