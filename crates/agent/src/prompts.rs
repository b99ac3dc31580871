use clarifier_core::slots::ParserHint;

const QUESTION_TYPES_TEMPLATE: &str = "You read quiz preferences. From the user's message, \
identify which question types they want. Allowed values: mcq, true_false, fill_blank, \
short_answer. Reply with JSON only, exactly {\"question_types\": [\"mcq\"]}. If the message \
is a question about course content rather than an answer, reply {\"out_of_scope\": true}. \
If nothing matches, reply {}.";

const DIFFICULTY_TEMPLATE: &str = "You read quiz preferences. From the user's message, \
identify the difficulty they want. Allowed values: easy, medium, hard. Reply with JSON only, \
exactly {\"difficulty\": \"medium\"}. If the message is a question about course content \
rather than an answer, reply {\"out_of_scope\": true}. If nothing matches, reply {}.";

const REQUESTED_COUNT_TEMPLATE: &str = "You read quiz preferences. From the user's message, \
identify how many questions they want as a whole number. Reply with JSON only, exactly \
{\"requested_count\": 10}. If the message is a question about course content rather than an \
answer, reply {\"out_of_scope\": true}. If no number is stated, reply {}.";

const COUNT_TEMPLATE: &str = "From the user's message, identify the number they are asking \
for as a whole number. Reply with JSON only, exactly {\"count\": 5}. If the message is an \
unrelated question, reply {\"out_of_scope\": true}. If no number is stated, reply {}.";

const GENERIC_TEMPLATE: &str = "Decide whether the user's message answers a setup question \
or asks about something else. Reply with JSON only: {\"out_of_scope\": true} when it asks \
about something else, otherwise {}.";

/// Instruction prompt for one slot. Slot keys with a dedicated template win
/// over the parser hint.
pub fn system_prompt(slot_key: &str, hint: Option<ParserHint>) -> &'static str {
    match slot_key {
        "question_types" => QUESTION_TYPES_TEMPLATE,
        "difficulty" => DIFFICULTY_TEMPLATE,
        "requested_count" => REQUESTED_COUNT_TEMPLATE,
        _ => match hint {
            Some(ParserHint::QuestionType) => QUESTION_TYPES_TEMPLATE,
            Some(ParserHint::Difficulty) => DIFFICULTY_TEMPLATE,
            Some(ParserHint::Count) => COUNT_TEMPLATE,
            None => GENERIC_TEMPLATE,
        },
    }
}
