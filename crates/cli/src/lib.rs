pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "clarifier",
    about = "Clarifier operator CLI",
    long_about = "Inspect Clarifier configuration, list its flows, or chat with one of them.",
    after_help = "Examples:\n  clarifier config\n  clarifier flows\n  clarifier chat --doc d1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "List the flows a runner built from the current config would serve")]
    Flows,
    #[command(about = "Apply pending session-store migrations to the configured database")]
    Migrate,
    #[command(about = "Run an interactive conversation against one flow on stdin/stdout")]
    Chat {
        #[arg(long, default_value = "quiz_setup", help = "Flow id to open")]
        flow: String,
        #[arg(long, help = "Session id to open or resume (random when omitted)")]
        session_id: Option<String>,
        #[arg(long = "doc", help = "Document id attached to the session (repeatable)")]
        doc_ids: Vec<String>,
        #[arg(long, help = "Answer budget lookups with a fixed question budget")]
        max_questions: Option<i64>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Flows => commands::flows::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Chat { flow, session_id, doc_ids, max_questions } => {
            commands::chat::run(commands::chat::ChatOptions {
                flow,
                session_id,
                doc_ids,
                max_questions,
            })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
