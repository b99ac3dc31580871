//! Deterministic parser bank.
//!
//! Dispatch is a pure function of `(SlotType, ParserHint)`. Every parser is
//! total over its input: "no value" is `None` (or an empty match set), never
//! an error.

use std::collections::HashSet;

use serde_json::Value;

use crate::slots::spec::{IntBounds, ParserHint, ResolvedSlot, SlotType, SlotValue};
use crate::slots::tables::{
    ALL_QUESTION_TYPES, DIFFICULTY_SYNONYMS, FALSE_WORDS, MAX_SENTINELS, MIN_SENTINELS,
    QUESTION_TYPE_SYNONYMS, SEPARATORS, SKIP_PHRASES, TENS_WORDS, TRUE_WORDS, UNIT_WORDS,
};

/// Resolves free text against one slot. An empty multi-valued match counts as
/// no value so the runner can fall back or reprompt.
pub fn parse_slot(slot: &ResolvedSlot, text: &str) -> Option<SlotValue> {
    match slot.slot_type {
        SlotType::MultiEnum => {
            let values = if slot.hint == Some(ParserHint::QuestionType) && selects_all(text) {
                all_values(slot)
            } else {
                parse_multi_enum(text, &synonym_table(slot))
            };
            (!values.is_empty()).then_some(SlotValue::List(values))
        }
        SlotType::SingleEnum => parse_single_enum(text, &synonym_table(slot)).map(SlotValue::Text),
        SlotType::BoundedInt => {
            let value = match slot.bounds {
                Some(bounds) => parse_int_clamped(text, bounds),
                None => parse_int(text),
            };
            value.map(SlotValue::Integer)
        }
        SlotType::Boolean => parse_bool(text).map(SlotValue::Flag),
        SlotType::FreeText => Some(SlotValue::Text(text.trim().to_string())),
    }
}

/// Coerces a client-supplied JSON value into a slot value. Strings go through
/// the parser bank; typed JSON is taken as-is and left to validation.
pub fn coerce_json(slot: &ResolvedSlot, value: &Value) -> Option<SlotValue> {
    match (slot.slot_type, value) {
        (_, Value::String(text)) => parse_slot(slot, text),
        (SlotType::Boolean, Value::Bool(flag)) => Some(SlotValue::Flag(*flag)),
        (SlotType::BoundedInt, Value::Number(number)) => number.as_i64().map(SlotValue::Integer),
        (SlotType::MultiEnum, Value::Array(items)) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                let choice = normalize_choice(slot, item.as_str()?);
                if !values.contains(&choice) {
                    values.push(choice);
                }
            }
            (!values.is_empty()).then_some(SlotValue::List(values))
        }
        _ => None,
    }
}

/// Maps a loosely phrased choice ("Multiple Choice") onto its canonical value
/// when the slot's table knows it, otherwise lowercases it.
pub fn normalize_choice(slot: &ResolvedSlot, raw: &str) -> String {
    parse_single_enum(raw, &synonym_table(slot)).unwrap_or_else(|| raw.trim().to_lowercase())
}

pub fn is_skip(text: &str) -> bool {
    let normalized = Normalized::new(text);
    SKIP_PHRASES.iter().any(|phrase| normalized.has(phrase))
}

/// Case-insensitive substring match that also splits on list separators and
/// unions the matches of each part. Output follows canonical table order.
pub fn parse_multi_enum<S>(text: &str, table: &[(S, S)]) -> Vec<String>
where
    S: AsRef<str>,
{
    let mut found = HashSet::new();
    collect_matches(&text.to_lowercase(), table, &mut found);

    let mut ordered = Vec::with_capacity(found.len());
    for (_, canonical) in table {
        let canonical = canonical.as_ref();
        if found.contains(canonical) && !ordered.iter().any(|value: &String| value == canonical) {
            ordered.push(canonical.to_string());
        }
    }
    ordered
}

fn collect_matches<S>(text: &str, table: &[(S, S)], found: &mut HashSet<String>)
where
    S: AsRef<str>,
{
    let mut claimed = Vec::new();
    for (synonym, canonical) in table {
        let synonym = synonym.as_ref();
        for (start, _) in text.match_indices(synonym) {
            found.insert(canonical.as_ref().to_string());
            claimed.push(start..start + synonym.len());
        }
    }

    // Matched spans are blanked out so a separator inside a synonym
    // ("true and false") cannot split it into unmatched halves.
    let mut remaining = text.to_string();
    for span in claimed {
        remaining.replace_range(span.clone(), &"|".repeat(span.len()));
    }
    let remaining = remaining.replace('|', "");

    let parts = split_on_separators(&remaining);
    if parts.len() > 1 {
        for part in parts {
            collect_matches(part, table, found);
        }
    }
}

fn split_on_separators(text: &str) -> Vec<&str> {
    let mut parts = vec![text];
    for separator in SEPARATORS {
        parts = parts.into_iter().flat_map(|part| part.split(separator)).collect();
    }
    parts.into_iter().map(str::trim).filter(|part| !part.is_empty()).collect()
}

/// First synonym hit wins under a fixed rule: the longest matching synonym,
/// then the earliest position in the text, then table order.
pub fn parse_single_enum<S>(text: &str, table: &[(S, S)]) -> Option<String>
where
    S: AsRef<str>,
{
    let lowered = text.to_lowercase();
    let mut best: Option<(usize, usize, &str)> = None;

    for (synonym, canonical) in table {
        let synonym = synonym.as_ref();
        let Some(position) = lowered.find(synonym) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((best_len, best_position, _)) => {
                synonym.len() > best_len
                    || (synonym.len() == best_len && position < best_position)
            }
        };
        if better {
            best = Some((synonym.len(), position, canonical.as_ref()));
        }
    }

    best.map(|(_, _, canonical)| canonical.to_string())
}

/// Reads a count and clamps it into `bounds`. The `max`/`min` sentinels and
/// word numbers are read first; a digit run is the fallback, so "max 20"
/// resolves to the upper bound.
pub fn parse_int_clamped(text: &str, bounds: IntBounds) -> Option<i64> {
    let normalized = Normalized::new(text);
    if MAX_SENTINELS.iter().any(|phrase| normalized.has(phrase)) {
        return Some(bounds.max);
    }
    if MIN_SENTINELS.iter().any(|phrase| normalized.has(phrase)) {
        return Some(bounds.min);
    }
    parse_int(text).map(|value| bounds.clamp(value))
}

fn parse_int(text: &str) -> Option<i64> {
    let normalized = Normalized::new(text);
    let tokens = normalized.tokens().collect::<Vec<_>>();
    word_number(&tokens).or_else(|| first_decimal_run(text))
}

fn word_number(tokens: &[&str]) -> Option<i64> {
    for (index, token) in tokens.iter().enumerate() {
        if let Some(tens) = lookup(TENS_WORDS, token) {
            let unit = tokens
                .get(index + 1)
                .and_then(|next| lookup(UNIT_WORDS, next))
                .filter(|unit| (1..=9).contains(unit))
                .unwrap_or(0);
            return Some(tens + unit);
        }
        if let Some(value) = lookup(UNIT_WORDS, token) {
            return Some(value);
        }
    }
    None
}

fn lookup(table: &[(&str, i64)], token: &str) -> Option<i64> {
    table.iter().find(|(word, _)| *word == token).map(|(_, value)| *value)
}

fn first_decimal_run(text: &str) -> Option<i64> {
    let start = text.find(|ch: char| ch.is_ascii_digit())?;
    let run = text[start..].split(|ch: char| !ch.is_ascii_digit()).next()?;
    // Only overflow can fail here; saturate and let the clamp handle it.
    Some(run.parse::<i64>().unwrap_or(i64::MAX))
}

/// Negative vocabulary wins when both sets appear ("don't include").
pub fn parse_bool(text: &str) -> Option<bool> {
    let normalized = Normalized::new(text);
    if FALSE_WORDS.iter().any(|word| normalized.has(word)) {
        return Some(false);
    }
    if TRUE_WORDS.iter().any(|word| normalized.has(word)) {
        return Some(true);
    }
    None
}

fn selects_all(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ALL_QUESTION_TYPES.iter().any(|phrase| lowered.contains(phrase))
}

fn all_values(slot: &ResolvedSlot) -> Vec<String> {
    if !slot.allowed.is_empty() {
        return slot.allowed.clone();
    }
    let mut values: Vec<String> = Vec::new();
    for (_, canonical) in QUESTION_TYPE_SYNONYMS {
        if !values.iter().any(|value| value == canonical) {
            values.push((*canonical).to_string());
        }
    }
    values
}

fn synonym_table(slot: &ResolvedSlot) -> Vec<(String, String)> {
    let fixed = match slot.hint {
        Some(ParserHint::QuestionType) => Some(QUESTION_TYPE_SYNONYMS),
        Some(ParserHint::Difficulty) => Some(DIFFICULTY_SYNONYMS),
        Some(ParserHint::Count) | None => None,
    };

    if let Some(table) = fixed {
        return table
            .iter()
            .map(|(synonym, canonical)| ((*synonym).to_string(), (*canonical).to_string()))
            .collect();
    }

    let mut table = Vec::with_capacity(slot.allowed.len() * 2);
    for value in &slot.allowed {
        table.push((value.to_lowercase(), value.clone()));
        if value.contains('_') {
            table.push((value.replace('_', " ").to_lowercase(), value.clone()));
        }
    }
    table
}

/// Lowercased text with punctuation collapsed to single spaces and padded on
/// both ends, so whole-word and whole-phrase checks are plain substring tests.
struct Normalized {
    padded: String,
}

impl Normalized {
    fn new(text: &str) -> Self {
        let mut padded = String::with_capacity(text.len() + 2);
        padded.push(' ');
        let mut last_was_space = true;

        for ch in text.chars() {
            let ch = if ch == '\u{2019}' { '\'' } else { ch };
            if ch.is_alphanumeric() || ch == '\'' {
                padded.extend(ch.to_lowercase());
                last_was_space = false;
            } else if !last_was_space {
                padded.push(' ');
                last_was_space = true;
            }
        }
        if !last_was_space {
            padded.push(' ');
        }

        Self { padded }
    }

    fn has(&self, phrase: &str) -> bool {
        self.padded.contains(&format!(" {phrase} "))
    }

    fn tokens(&self) -> impl Iterator<Item = &str> {
        self.padded.split_whitespace()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        coerce_json, is_skip, parse_bool, parse_int_clamped, parse_multi_enum,
        parse_single_enum, parse_slot,
    };
    use crate::slots::spec::{IntBounds, ParserHint, ResolvedSlot, SlotType, SlotValue, UiHints};
    use crate::slots::tables::{DIFFICULTY_SYNONYMS, QUESTION_TYPE_SYNONYMS};

    fn slot(slot_type: SlotType, hint: Option<ParserHint>, allowed: &[&str]) -> ResolvedSlot {
        ResolvedSlot {
            key: "slot".to_string(),
            slot_type,
            hint,
            allowed: allowed.iter().map(|value| value.to_string()).collect(),
            bounds: None,
            required: true,
            prompt: "?".to_string(),
            ui: UiHints::default(),
        }
    }

    #[test]
    fn multi_enum_splits_and_unions_parts() {
        let values = parse_multi_enum("mcq and true/false", QUESTION_TYPE_SYNONYMS);
        assert_eq!(values, vec!["mcq".to_string(), "true_false".to_string()]);

        let values = parse_multi_enum(
            "Short answer, fill in the blank & Multiple Choice",
            QUESTION_TYPE_SYNONYMS,
        );
        assert_eq!(
            values,
            vec!["mcq".to_string(), "fill_blank".to_string(), "short_answer".to_string()]
        );
    }

    #[test]
    fn multi_enum_keeps_phrases_that_contain_a_separator() {
        assert_eq!(
            parse_multi_enum("true and false", QUESTION_TYPE_SYNONYMS),
            vec!["true_false".to_string()]
        );
        assert_eq!(
            parse_multi_enum("mcq and true and false", QUESTION_TYPE_SYNONYMS),
            vec!["mcq".to_string(), "true_false".to_string()]
        );
    }

    #[test]
    fn multi_enum_returns_empty_set_when_nothing_matches() {
        assert!(parse_multi_enum("whatever you think", QUESTION_TYPE_SYNONYMS).is_empty());

        let qtype = slot(SlotType::MultiEnum, Some(ParserHint::QuestionType), &[]);
        assert_eq!(parse_slot(&qtype, "whatever you think"), None);
    }

    #[test]
    fn multi_enum_all_phrase_selects_every_allowed_value() {
        let qtype =
            slot(SlotType::MultiEnum, Some(ParserHint::QuestionType), &["mcq", "true_false"]);
        assert_eq!(
            parse_slot(&qtype, "all of them please"),
            Some(SlotValue::List(vec!["mcq".to_string(), "true_false".to_string()]))
        );
    }

    #[test]
    fn single_enum_prefers_longest_synonym() {
        assert_eq!(
            parse_single_enum("not too hard please", DIFFICULTY_SYNONYMS),
            Some("medium".to_string())
        );
        assert_eq!(parse_single_enum("HARD", DIFFICULTY_SYNONYMS), Some("hard".to_string()));
        assert_eq!(parse_single_enum("surprise me", DIFFICULTY_SYNONYMS), None);
    }

    #[test]
    fn single_enum_breaks_length_ties_by_position() {
        // "easy" and "hard" have the same length; the earlier mention wins.
        assert_eq!(
            parse_single_enum("easy, not hard", DIFFICULTY_SYNONYMS),
            Some("easy".to_string())
        );
        assert_eq!(
            parse_single_enum("hard, not easy", DIFFICULTY_SYNONYMS),
            Some("hard".to_string())
        );
    }

    #[test]
    fn single_enum_without_hint_matches_allowed_values() {
        let tone = slot(SlotType::SingleEnum, None, &["formal", "casual_chat"]);
        assert_eq!(parse_slot(&tone, "Casual chat"), Some(SlotValue::Text("casual_chat".into())));
        assert_eq!(parse_slot(&tone, "formal"), Some(SlotValue::Text("formal".into())));
    }

    #[test]
    fn count_reads_words_digits_and_sentinels() {
        let bounds = IntBounds::new(5, 50);
        assert_eq!(parse_int_clamped("ten", bounds), Some(10));
        assert_eq!(parse_int_clamped("twenty-five questions", bounds), Some(25));
        assert_eq!(parse_int_clamped("let's do 12", bounds), Some(12));
        assert_eq!(parse_int_clamped("max", bounds), Some(50));
        assert_eq!(parse_int_clamped("as many as possible", bounds), Some(50));
        assert_eq!(parse_int_clamped("the minimum", bounds), Some(5));
        assert_eq!(parse_int_clamped("a few", bounds), None);
    }

    #[test]
    fn count_sentinels_win_over_digit_runs() {
        let bounds = IntBounds::new(5, 50);
        assert_eq!(parse_int_clamped("max 20", bounds), Some(50));
        assert_eq!(parse_int_clamped("as many as possible, say 30", bounds), Some(50));
        assert_eq!(parse_int_clamped("minimum 12", bounds), Some(5));
        assert_eq!(parse_int_clamped("20 minutes worth", bounds), Some(20));
    }

    #[test]
    fn count_is_always_clamped_into_bounds() {
        let bounds = IntBounds::new(5, 50);
        for input in ["0", "1", "two", "4", "5", "49", "50", "51", "999999999999999999999999"] {
            let value = parse_int_clamped(input, bounds).expect("numeric input parses");
            assert!(bounds.contains(value), "{input} produced {value}");
        }
    }

    #[test]
    fn bool_keyword_sets() {
        assert_eq!(parse_bool("Yes please"), Some(true));
        assert_eq!(parse_bool("sure"), Some(true));
        assert_eq!(parse_bool("nope"), Some(false));
        assert_eq!(parse_bool("don't include them"), Some(false));
        assert_eq!(parse_bool("banana"), None);
    }

    #[test]
    fn free_text_trims_and_always_succeeds() {
        let notes = slot(SlotType::FreeText, None, &[]);
        assert_eq!(
            parse_slot(&notes, "  chapter 3 only  "),
            Some(SlotValue::Text("chapter 3 only".into()))
        );
    }

    #[test]
    fn skip_phrases_are_whole_words() {
        assert!(is_skip("no preference"));
        assert!(is_skip("Skip"));
        assert!(!is_skip("skipping rope"));
    }

    #[test]
    fn any_type_selects_all_types_rather_than_skipping() {
        assert!(!is_skip("any type"));

        let qtype = slot(SlotType::MultiEnum, Some(ParserHint::QuestionType), &["mcq", "cloze"]);
        assert_eq!(
            parse_slot(&qtype, "any type"),
            Some(SlotValue::List(vec!["mcq".to_string(), "cloze".to_string()]))
        );
    }

    #[test]
    fn coerce_json_normalizes_client_values() {
        let qtype = slot(SlotType::MultiEnum, Some(ParserHint::QuestionType), &[]);
        assert_eq!(
            coerce_json(&qtype, &json!(["Multiple Choice", "mcq", "true_false"])),
            Some(SlotValue::List(vec!["mcq".to_string(), "true_false".to_string()]))
        );

        let count = slot(SlotType::BoundedInt, Some(ParserHint::Count), &[]);
        assert_eq!(coerce_json(&count, &json!(12)), Some(SlotValue::Integer(12)));
        assert_eq!(coerce_json(&count, &json!("fifteen")), Some(SlotValue::Integer(15)));
        assert_eq!(coerce_json(&count, &json!(true)), None);

        let flag = slot(SlotType::Boolean, None, &[]);
        assert_eq!(coerce_json(&flag, &json!(false)), Some(SlotValue::Flag(false)));
    }
}
