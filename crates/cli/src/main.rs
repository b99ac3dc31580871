use std::process::ExitCode;

fn main() -> ExitCode {
    clarifier_cli::run()
}
