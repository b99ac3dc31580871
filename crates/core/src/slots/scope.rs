use crate::slots::tables::{EXPLANATORY_PREFIXES, WH_WORDS};

/// Prefix/substring heuristic for input that reads like a content question
/// rather than an answer. False positives only cost a soft redirect.
pub fn is_out_of_scope(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.contains('?') {
        return true;
    }

    let lowered = trimmed.to_lowercase();
    let first_word = lowered
        .split(|ch: char| !ch.is_alphanumeric() && ch != '\'')
        .find(|word| !word.is_empty());
    if first_word.is_some_and(|word| WH_WORDS.contains(&word)) {
        return true;
    }

    EXPLANATORY_PREFIXES.iter().any(|prefix| starts_with_phrase(&lowered, prefix))
}

fn starts_with_phrase(text: &str, phrase: &str) -> bool {
    text.strip_prefix(phrase)
        .is_some_and(|rest| !rest.starts_with(|ch: char| ch.is_alphanumeric()))
}
