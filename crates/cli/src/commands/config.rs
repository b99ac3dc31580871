use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clarifier_core::config::{redact_secret, AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.to_string(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let api_key = match &config.extractor.api_key {
        Some(secret) => redact_secret(secret.expose_secret()),
        None => "<unset>".to_string(),
    };

    vec![
        Field::new(
            "server.bind_address",
            &config.server.bind_address,
            &["CLARIFIER_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port, &["CLARIFIER_SERVER_PORT"]),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs,
            &["CLARIFIER_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new("database.url", &config.database.url, &["CLARIFIER_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections,
            &["CLARIFIER_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs,
            &["CLARIFIER_DATABASE_TIMEOUT_SECS"],
        ),
        Field::new(
            "sessions.backend",
            format!("{:?}", config.sessions.backend),
            &["CLARIFIER_SESSIONS_BACKEND"],
        ),
        Field::new("sessions.ttl_secs", config.sessions.ttl_secs, &["CLARIFIER_SESSIONS_TTL_SECS"]),
        Field::new(
            "sessions.sweep_interval_secs",
            config.sessions.sweep_interval_secs,
            &["CLARIFIER_SESSIONS_SWEEP_INTERVAL_SECS"],
        ),
        Field::new(
            "sessions.max_slot_failures",
            config.sessions.max_slot_failures,
            &["CLARIFIER_SESSIONS_MAX_SLOT_FAILURES"],
        ),
        Field::new("extractor.enabled", config.extractor.enabled, &["CLARIFIER_EXTRACTOR_ENABLED"]),
        Field::new(
            "extractor.url",
            config.extractor.url.as_deref().unwrap_or("<unset>"),
            &["CLARIFIER_EXTRACTOR_URL"],
        ),
        Field::new("extractor.api_key", api_key, &["CLARIFIER_EXTRACTOR_API_KEY"]),
        Field::new(
            "budget.base_url",
            config.budget.base_url.as_deref().unwrap_or("<unset>"),
            &["CLARIFIER_BUDGET_BASE_URL"],
        ),
        Field::new("budget.min_count", config.budget.min_count, &["CLARIFIER_BUDGET_MIN_COUNT"]),
        Field::new(
            "budget.max_count_cap",
            config.budget.max_count_cap,
            &["CLARIFIER_BUDGET_MAX_COUNT_CAP"],
        ),
        Field::new(
            "budget.max_attempts",
            config.budget.max_attempts,
            &["CLARIFIER_BUDGET_MAX_ATTEMPTS"],
        ),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["CLARIFIER_LOGGING_LEVEL", "CLARIFIER_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["CLARIFIER_LOGGING_FORMAT", "CLARIFIER_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
