use std::io::{self, BufRead, Write};

use clarifier_core::config::{AppConfig, LoadOptions};
use clarifier_core::errors::EngineError;
use clarifier_core::flows::{FlowRunner, Stage, TurnOutcome};
use clarifier_core::session::SessionMeta;
use clarifier_core::slots::UiHints;
use serde_json::{json, Map, Value};

use crate::commands::{local_runner, runtime, CommandResult};

const CONFIRM_PREFIX: &str = "/confirm";

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub flow: String,
    pub session_id: Option<String>,
    pub doc_ids: Vec<String>,
    pub max_questions: Option<i64>,
}

pub fn run(options: ChatOptions) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runner = local_runner(&config, options.max_questions);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    converse(&runner, options, stdin.lock(), &mut stdout)
}

/// Drives one session from `input` line by line. Plain lines are ingested,
/// `/confirm {json}` submits explicit values and `/quit` stops early.
pub fn converse(
    runner: &FlowRunner,
    options: ChatOptions,
    input: impl BufRead,
    output: &mut impl Write,
) -> CommandResult {
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let session_id =
        options.session_id.unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4()));
    let meta = SessionMeta {
        session_id: session_id.clone(),
        user_id: "cli".to_string(),
        doc_ids: options.doc_ids,
        ..SessionMeta::default()
    };

    let started = match runtime.block_on(runner.start(&options.flow, meta)) {
        Ok(started) => started,
        Err(error) => return engine_failure(&error),
    };
    say(output, &started.next_prompt);
    show_quick_replies(output, &started.ui);

    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                return CommandResult::failure("chat", "io", error.to_string(), 5);
            }
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            return CommandResult::failure("chat", "aborted", "conversation ended by user", 1);
        }

        let turn = match text.strip_prefix(CONFIRM_PREFIX) {
            Some(raw) => match parse_confirm_values(raw) {
                Ok(values) => runtime.block_on(runner.confirm(&session_id, &values)),
                Err(problem) => {
                    say(output, &problem);
                    continue;
                }
            },
            None => runtime.block_on(runner.ingest(&session_id, text)),
        };

        match turn {
            Ok(turn) => {
                if let Some(result) = report_turn(output, &session_id, &options.flow, turn) {
                    return result;
                }
            }
            Err(EngineError::Validation { errors }) => {
                for error in errors {
                    say(output, &error);
                }
            }
            Err(error) => return engine_failure(&error),
        }
    }

    CommandResult::failure("chat", "incomplete", "input ended before the flow completed", 1)
}

fn report_turn(
    output: &mut impl Write,
    session_id: &str,
    flow: &str,
    turn: TurnOutcome,
) -> Option<CommandResult> {
    for error in &turn.errors {
        say(output, error);
    }
    if let Some(prompt) = &turn.next_prompt {
        say(output, prompt);
    }
    if let Some(ui) = &turn.ui {
        show_quick_replies(output, ui);
    }

    match turn.stage {
        Stage::Complete | Stage::AlreadyComplete => Some(CommandResult::success_with(
            "chat",
            "flow completed",
            Some(json!({
                "sessionId": session_id,
                "flow": flow,
                "filled": turn.filled,
                "finalizeResult": turn.finalize_result,
            })),
        )),
        Stage::GaveUp => Some(CommandResult::failure(
            "chat",
            "gave_up",
            turn.next_prompt.unwrap_or_else(|| "the session gave up".to_string()),
            1,
        )),
        _ => None,
    }
}

fn parse_confirm_values(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(values)) => Ok(values),
        Ok(_) => Err("`/confirm` expects a JSON object, e.g. /confirm {\"difficulty\":\"easy\"}"
            .to_string()),
        Err(error) => Err(format!("could not read `/confirm` values: {error}")),
    }
}

fn engine_failure(error: &EngineError) -> CommandResult {
    let (error_class, exit_code) = match error {
        EngineError::FlowNotFound { .. } | EngineError::EmptySlotSequence { .. } => ("flow", 2),
        EngineError::Finalize(_) => ("finalize", 4),
        _ => ("engine", 4),
    };
    CommandResult::failure("chat", error_class, error.to_string(), exit_code)
}

fn say(output: &mut impl Write, line: &str) {
    // A closed stdout only loses the transcript; the result line still reports.
    let _ = writeln!(output, "> {line}");
}

fn show_quick_replies(output: &mut impl Write, ui: &UiHints) {
    if !ui.quick.is_empty() {
        let _ = writeln!(output, "  [{}]", ui.quick.join(" | "));
    }
}
