use clarifier_core::config::{AppConfig, LoadOptions};
use serde_json::json;

use crate::commands::{local_runner, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "flows",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let flows = local_runner(&config, None).flow_ids();
    CommandResult::success_with(
        "flows",
        format!("{} flow(s) registered", flows.len()),
        Some(json!({ "flows": flows })),
    )
}
