use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    MultiEnum,
    SingleEnum,
    BoundedInt,
    Boolean,
    FreeText,
}

/// Selects the specialized synonym or number table used to read a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParserHint {
    #[serde(rename = "qtype")]
    QuestionType,
    #[serde(rename = "difficulty")]
    Difficulty,
    #[serde(rename = "count")]
    Count,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Flag(bool),
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl SlotValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Flag(_) => "a yes/no answer",
            Self::Integer(_) => "a number",
            Self::Text(_) => "a single choice",
            Self::List(_) => "a list of choices",
        }
    }
}

/// Slot key to validated value. Ordering carries no meaning.
pub type Filled = BTreeMap<String, SlotValue>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntBounds {
    pub min: i64,
    pub max: i64,
}

impl IntBounds {
    /// Builds inclusive bounds, swapping the ends if they arrive reversed.
    pub fn new(min: i64, max: i64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiHints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick: Vec<String>,
}

impl UiHints {
    pub fn quick<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { quick: options.into_iter().map(Into::into).collect() }
    }
}

/// One question a flow can ask, parameterized by the flow's context type.
///
/// Prompts, UI hints, and integer bounds are plain functions of the context so
/// a slot stays declarative data while still reflecting values computed at
/// session start (for example a budget-derived maximum).
pub struct SlotSpec<C> {
    pub key: &'static str,
    pub slot_type: SlotType,
    pub prompt: fn(&C) -> String,
    pub ui: Option<fn(&C) -> UiHints>,
    pub allowed: &'static [&'static str],
    pub bounds: Option<fn(&C) -> IntBounds>,
    pub required: bool,
    pub hint: Option<ParserHint>,
}

impl<C> Clone for SlotSpec<C> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            slot_type: self.slot_type,
            prompt: self.prompt,
            ui: self.ui,
            allowed: self.allowed,
            bounds: self.bounds,
            required: self.required,
            hint: self.hint,
        }
    }
}

impl<C> SlotSpec<C> {
    pub fn new(key: &'static str, slot_type: SlotType, prompt: fn(&C) -> String) -> Self {
        Self {
            key,
            slot_type,
            prompt,
            ui: None,
            allowed: &[],
            bounds: None,
            required: true,
            hint: None,
        }
    }

    pub fn with_allowed(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn with_bounds(mut self, bounds: fn(&C) -> IntBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_hint(mut self, hint: ParserHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_ui(mut self, ui: fn(&C) -> UiHints) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn resolve(&self, ctx: &C) -> ResolvedSlot {
        ResolvedSlot {
            key: self.key.to_string(),
            slot_type: self.slot_type,
            hint: self.hint,
            allowed: self.allowed.iter().map(|value| (*value).to_string()).collect(),
            bounds: self.bounds.map(|bounds| bounds(ctx)),
            required: self.required,
            prompt: (self.prompt)(ctx),
            ui: self.ui.map(|ui| ui(ctx)).unwrap_or_default(),
        }
    }
}

/// A slot with every context-dependent part already evaluated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSlot {
    pub key: String,
    pub slot_type: SlotType,
    pub hint: Option<ParserHint>,
    pub allowed: Vec<String>,
    pub bounds: Option<IntBounds>,
    pub required: bool,
    pub prompt: String,
    pub ui: UiHints,
}

impl ResolvedSlot {
    /// Per-slot post-parse validation. The error is a corrective message
    /// suitable for showing to the user.
    pub fn check(&self, value: &SlotValue) -> Result<(), String> {
        match (self.slot_type, value) {
            (SlotType::MultiEnum, SlotValue::List(values)) => {
                let unknown =
                    values.iter().filter(|value| !self.is_allowed(value)).collect::<Vec<_>>();
                if unknown.is_empty() {
                    Ok(())
                } else {
                    Err(format!(
                        "I can't use {}. Please choose from: {}.",
                        join_quoted(&unknown),
                        self.allowed.join(", ")
                    ))
                }
            }
            (SlotType::SingleEnum, SlotValue::Text(value)) => {
                if self.is_allowed(value) {
                    Ok(())
                } else {
                    Err(format!(
                        "\"{value}\" isn't an option here. Please choose one of: {}.",
                        self.allowed.join(", ")
                    ))
                }
            }
            (SlotType::BoundedInt, SlotValue::Integer(value)) => match self.bounds {
                Some(bounds) if !bounds.contains(*value) => Err(format!(
                    "Please pick a number between {} and {}.",
                    bounds.min, bounds.max
                )),
                _ => Ok(()),
            },
            (SlotType::Boolean, SlotValue::Flag(_)) | (SlotType::FreeText, SlotValue::Text(_)) => {
                Ok(())
            }
            (expected, other) => Err(format!(
                "Expected {} for `{}` but got {}.",
                expected_kind(expected),
                self.key,
                other.kind()
            )),
        }
    }

    fn is_allowed(&self, value: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|allowed| allowed == value)
    }
}

fn expected_kind(slot_type: SlotType) -> &'static str {
    match slot_type {
        SlotType::MultiEnum => "a list of choices",
        SlotType::SingleEnum => "a single choice",
        SlotType::BoundedInt => "a number",
        SlotType::Boolean => "a yes/no answer",
        SlotType::FreeText => "some text",
    }
}

fn join_quoted(values: &[&String]) -> String {
    values.iter().map(|value| format!("\"{value}\"")).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::{IntBounds, ResolvedSlot, SlotSpec, SlotType, SlotValue, UiHints};

    struct Ctx {
        max: i64,
    }

    fn count_slot() -> ResolvedSlot {
        SlotSpec::<Ctx>::new("requested_count", SlotType::BoundedInt, |ctx| {
            format!("How many (up to {})?", ctx.max)
        })
        .with_bounds(|ctx| IntBounds::new(5, ctx.max))
        .with_ui(|_| UiHints::quick(["5", "10"]))
        .resolve(&Ctx { max: 50 })
    }

    #[test]
    fn resolve_evaluates_context_dependent_parts() {
        let slot = count_slot();
        assert_eq!(slot.prompt, "How many (up to 50)?");
        assert_eq!(slot.bounds, Some(IntBounds { min: 5, max: 50 }));
        assert_eq!(slot.ui.quick, vec!["5".to_string(), "10".to_string()]);
        assert!(slot.required);
    }

    #[test]
    fn bounds_are_normalized_when_reversed() {
        let bounds = IntBounds::new(40, 10);
        assert_eq!(bounds, IntBounds { min: 10, max: 40 });
        assert_eq!(bounds.clamp(99), 40);
        assert_eq!(bounds.clamp(-3), 10);
    }

    #[test]
    fn check_rejects_out_of_range_integers() {
        let slot = count_slot();
        assert!(slot.check(&SlotValue::Integer(10)).is_ok());
        let message = slot.check(&SlotValue::Integer(51)).expect_err("51 is above the maximum");
        assert!(message.contains("between 5 and 50"));
    }

    #[test]
    fn check_rejects_values_outside_allowed_set() {
        let slot = SlotSpec::<()>::new("question_types", SlotType::MultiEnum, |_| String::new())
            .with_allowed(&["mcq", "true_false"])
            .resolve(&());

        assert!(slot.check(&SlotValue::List(vec!["mcq".to_string()])).is_ok());
        let message = slot
            .check(&SlotValue::List(vec!["mcq".to_string(), "essay".to_string()]))
            .expect_err("essay is not allowed");
        assert!(message.contains("\"essay\""));
    }

    #[test]
    fn check_reports_type_mismatch() {
        let slot = count_slot();
        let message =
            slot.check(&SlotValue::Text("ten".to_string())).expect_err("text is not a number");
        assert!(message.contains("Expected a number"));
    }

    #[test]
    fn slot_values_serialize_untagged() {
        let list = SlotValue::List(vec!["mcq".to_string()]);
        assert_eq!(serde_json::to_value(&list).expect("serialize"), serde_json::json!(["mcq"]));

        let parsed: SlotValue = serde_json::from_value(serde_json::json!(12)).expect("deserialize");
        assert_eq!(parsed, SlotValue::Integer(12));
    }
}
