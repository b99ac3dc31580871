//! Synonym and vocabulary tables consulted by the parser bank.
//!
//! Each synonym table maps a lowercase phrase to its canonical value. Table
//! order is the canonical output order for multi-valued matches.

pub const QUESTION_TYPE_SYNONYMS: &[(&str, &str)] = &[
    ("multiple choice", "mcq"),
    ("multiple-choice", "mcq"),
    ("multi choice", "mcq"),
    ("mcq", "mcq"),
    ("true/false", "true_false"),
    ("true or false", "true_false"),
    ("true and false", "true_false"),
    ("true-false", "true_false"),
    ("true false", "true_false"),
    ("true_false", "true_false"),
    ("t/f", "true_false"),
    ("fill in the blank", "fill_blank"),
    ("fill-in-the-blank", "fill_blank"),
    ("fill-in", "fill_blank"),
    ("fill blank", "fill_blank"),
    ("fill_blank", "fill_blank"),
    ("blanks", "fill_blank"),
    ("cloze", "fill_blank"),
    ("short answer", "short_answer"),
    ("short-answer", "short_answer"),
    ("short_answer", "short_answer"),
    ("open ended", "short_answer"),
    ("open-ended", "short_answer"),
    ("written answer", "short_answer"),
];

/// Phrases that select every allowed question type at once.
pub const ALL_QUESTION_TYPES: &[&str] =
    &["all types", "all of them", "all of the above", "any type", "every type", "everything"];

pub const DIFFICULTY_SYNONYMS: &[(&str, &str)] = &[
    ("easy", "easy"),
    ("simple", "easy"),
    ("beginner", "easy"),
    ("basic", "easy"),
    ("introductory", "easy"),
    ("medium", "medium"),
    ("moderate", "medium"),
    ("intermediate", "medium"),
    ("normal", "medium"),
    ("average", "medium"),
    ("standard", "medium"),
    ("in between", "medium"),
    ("not too hard", "medium"),
    ("not too easy", "medium"),
    ("hard", "hard"),
    ("difficult", "hard"),
    ("challenging", "hard"),
    ("advanced", "hard"),
    ("tough", "hard"),
    ("expert", "hard"),
];

pub const SEPARATORS: &[&str] = &[" and ", " + ", " & ", ", ", "; "];

pub const UNIT_WORDS: &[(&str, i64)] = &[
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("dozen", 12),
    ("couple", 2),
    ("pair", 2),
];

pub const TENS_WORDS: &[(&str, i64)] = &[
    ("twenty", 20),
    ("thirty", 30),
    ("forty", 40),
    ("fifty", 50),
    ("sixty", 60),
    ("seventy", 70),
    ("eighty", 80),
    ("ninety", 90),
];

/// Stands for "as many as possible": resolves to the slot maximum.
pub const MAX_SENTINELS: &[&str] =
    &["max", "maximum", "as many as possible", "as many as you can", "the most"];

pub const MIN_SENTINELS: &[&str] = &["min", "minimum", "fewest", "as few as possible"];

pub const TRUE_WORDS: &[&str] = &[
    "yes",
    "y",
    "yeah",
    "yep",
    "yup",
    "sure",
    "ok",
    "okay",
    "true",
    "include",
    "please",
    "definitely",
    "absolutely",
    "affirmative",
    "of course",
];

pub const FALSE_WORDS: &[&str] = &[
    "no",
    "n",
    "nope",
    "nah",
    "false",
    "exclude",
    "without",
    "skip",
    "never",
    "none",
    "don't",
    "dont",
    "do not",
    "no thanks",
    "not really",
];

/// Phrases that leave an optional slot empty.
pub const SKIP_PHRASES: &[&str] =
    &["skip", "none", "no preference", "doesn't matter", "does not matter", "pass"];

pub const WH_WORDS: &[&str] = &["what", "how", "why", "when", "where", "who", "which"];

pub const EXPLANATORY_PREFIXES: &[&str] =
    &["explain", "define", "describe", "tell me about", "what is", "how does"];
