use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flows::budget::{BudgetLimits, RetryPolicy};
use crate::flows::engine::RunnerSettings;

pub const ENV_PREFIX: &str = "CLARIFIER_";
pub const DEFAULT_CONFIG_FILE: &str = "clarifier.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sessions: SessionsConfig,
    pub extractor: ExtractorConfig,
    pub budget: BudgetConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SessionsConfig {
    pub backend: SessionBackend,
    /// Idle lifetime of a session; 0 keeps sessions forever.
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Consecutive failures on one slot before giving up; 0 never gives up.
    pub max_slot_failures: u32,
}

#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct BudgetConfig {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub min_count: i64,
    pub max_count_cap: i64,
    pub default_max_questions: i64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    Memory,
    Sqlite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub session_backend: Option<SessionBackend>,
    pub extractor_enabled: Option<bool>,
    pub extractor_url: Option<String>,
    pub budget_url: Option<String>,
    pub max_slot_failures: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            database: DatabaseConfig {
                url: "sqlite://clarifier.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            sessions: SessionsConfig {
                backend: SessionBackend::Memory,
                ttl_secs: 3_600,
                sweep_interval_secs: 300,
                max_slot_failures: 5,
            },
            extractor: ExtractorConfig {
                enabled: false,
                url: None,
                api_key: None,
                timeout_secs: 10,
                max_tokens: 200,
            },
            budget: BudgetConfig {
                base_url: None,
                timeout_secs: 5,
                min_count: 5,
                max_count_cap: 50,
                default_max_questions: 10,
                max_attempts: 3,
                base_delay_ms: 150,
                max_jitter_ms: 50,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for SessionBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported session backend `{other}` (expected memory|sqlite)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl SessionsConfig {
    pub fn ttl(&self) -> Option<chrono::Duration> {
        (self.ttl_secs > 0).then(|| chrono::Duration::seconds(self.ttl_secs as i64))
    }

    pub fn max_slot_failures(&self) -> Option<u32> {
        (self.max_slot_failures > 0).then_some(self.max_slot_failures)
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings { max_slot_failures: self.max_slot_failures() }
    }
}

impl ExtractorConfig {
    /// The extraction endpoint, only when the fallback is switched on and a
    /// URL is configured.
    pub fn endpoint(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.url.as_deref().map(str::trim).filter(|url| !url.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BudgetConfig {
    pub fn limits(&self) -> BudgetLimits {
        BudgetLimits {
            min_count: self.min_count,
            max_count_cap: self.max_count_cap,
            default_max: self.default_max_questions,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(sessions) = patch.sessions {
            if let Some(backend) = sessions.backend {
                self.sessions.backend = backend;
            }
            if let Some(ttl_secs) = sessions.ttl_secs {
                self.sessions.ttl_secs = ttl_secs;
            }
            if let Some(sweep_interval_secs) = sessions.sweep_interval_secs {
                self.sessions.sweep_interval_secs = sweep_interval_secs;
            }
            if let Some(max_slot_failures) = sessions.max_slot_failures {
                self.sessions.max_slot_failures = max_slot_failures;
            }
        }

        if let Some(extractor) = patch.extractor {
            if let Some(enabled) = extractor.enabled {
                self.extractor.enabled = enabled;
            }
            if let Some(url) = extractor.url {
                self.extractor.url = Some(url);
            }
            if let Some(api_key) = extractor.api_key {
                self.extractor.api_key = Some(api_key.into());
            }
            if let Some(timeout_secs) = extractor.timeout_secs {
                self.extractor.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = extractor.max_tokens {
                self.extractor.max_tokens = max_tokens;
            }
        }

        if let Some(budget) = patch.budget {
            if let Some(base_url) = budget.base_url {
                self.budget.base_url = Some(base_url);
            }
            if let Some(timeout_secs) = budget.timeout_secs {
                self.budget.timeout_secs = timeout_secs;
            }
            if let Some(min_count) = budget.min_count {
                self.budget.min_count = min_count;
            }
            if let Some(max_count_cap) = budget.max_count_cap {
                self.budget.max_count_cap = max_count_cap;
            }
            if let Some(default_max_questions) = budget.default_max_questions {
                self.budget.default_max_questions = default_max_questions;
            }
            if let Some(max_attempts) = budget.max_attempts {
                self.budget.max_attempts = max_attempts;
            }
            if let Some(base_delay_ms) = budget.base_delay_ms {
                self.budget.base_delay_ms = base_delay_ms;
            }
            if let Some(max_jitter_ms) = budget.max_jitter_ms {
                self.budget.max_jitter_ms = max_jitter_ms;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CLARIFIER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CLARIFIER_SERVER_PORT") {
            self.server.port = parse_u16("CLARIFIER_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CLARIFIER_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CLARIFIER_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CLARIFIER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CLARIFIER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CLARIFIER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CLARIFIER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CLARIFIER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CLARIFIER_SESSIONS_BACKEND") {
            self.sessions.backend = value.parse()?;
        }
        if let Some(value) = read_env("CLARIFIER_SESSIONS_TTL_SECS") {
            self.sessions.ttl_secs = parse_u64("CLARIFIER_SESSIONS_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("CLARIFIER_SESSIONS_SWEEP_INTERVAL_SECS") {
            self.sessions.sweep_interval_secs =
                parse_u64("CLARIFIER_SESSIONS_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("CLARIFIER_SESSIONS_MAX_SLOT_FAILURES") {
            self.sessions.max_slot_failures =
                parse_u32("CLARIFIER_SESSIONS_MAX_SLOT_FAILURES", &value)?;
        }

        if let Some(value) = read_env("CLARIFIER_EXTRACTOR_ENABLED") {
            self.extractor.enabled = parse_bool("CLARIFIER_EXTRACTOR_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CLARIFIER_EXTRACTOR_URL") {
            self.extractor.url = Some(value);
        }
        if let Some(value) = read_env("CLARIFIER_EXTRACTOR_API_KEY") {
            self.extractor.api_key = Some(value.into());
        }
        if let Some(value) = read_env("CLARIFIER_EXTRACTOR_TIMEOUT_SECS") {
            self.extractor.timeout_secs = parse_u64("CLARIFIER_EXTRACTOR_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CLARIFIER_EXTRACTOR_MAX_TOKENS") {
            self.extractor.max_tokens = parse_u32("CLARIFIER_EXTRACTOR_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("CLARIFIER_BUDGET_BASE_URL") {
            self.budget.base_url = Some(value);
        }
        if let Some(value) = read_env("CLARIFIER_BUDGET_TIMEOUT_SECS") {
            self.budget.timeout_secs = parse_u64("CLARIFIER_BUDGET_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CLARIFIER_BUDGET_MIN_COUNT") {
            self.budget.min_count = parse_i64("CLARIFIER_BUDGET_MIN_COUNT", &value)?;
        }
        if let Some(value) = read_env("CLARIFIER_BUDGET_MAX_COUNT_CAP") {
            self.budget.max_count_cap = parse_i64("CLARIFIER_BUDGET_MAX_COUNT_CAP", &value)?;
        }
        if let Some(value) = read_env("CLARIFIER_BUDGET_DEFAULT_MAX_QUESTIONS") {
            self.budget.default_max_questions =
                parse_i64("CLARIFIER_BUDGET_DEFAULT_MAX_QUESTIONS", &value)?;
        }
        if let Some(value) = read_env("CLARIFIER_BUDGET_MAX_ATTEMPTS") {
            self.budget.max_attempts = parse_u32("CLARIFIER_BUDGET_MAX_ATTEMPTS", &value)?;
        }

        let log_level =
            read_env("CLARIFIER_LOGGING_LEVEL").or_else(|| read_env("CLARIFIER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLARIFIER_LOGGING_FORMAT").or_else(|| read_env("CLARIFIER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(backend) = overrides.session_backend {
            self.sessions.backend = backend;
        }
        if let Some(enabled) = overrides.extractor_enabled {
            self.extractor.enabled = enabled;
        }
        if let Some(url) = overrides.extractor_url {
            self.extractor.url = Some(url);
        }
        if let Some(url) = overrides.budget_url {
            self.budget.base_url = Some(url);
        }
        if let Some(max_slot_failures) = overrides.max_slot_failures {
            self.sessions.max_slot_failures = max_slot_failures;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_database(&self.database)?;
        validate_sessions(&self.sessions)?;
        validate_extractor(&self.extractor)?;
        validate_budget(&self.budget)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Effective configuration as JSON with secrets masked.
    pub fn redacted(&self) -> serde_json::Value {
        let api_key = self.extractor.api_key.as_ref().map(|key| redact_secret(key.expose_secret()));
        serde_json::json!({
            "server": {
                "bind_address": self.server.bind_address,
                "port": self.server.port,
                "graceful_shutdown_secs": self.server.graceful_shutdown_secs,
            },
            "database": {
                "url": self.database.url,
                "max_connections": self.database.max_connections,
                "timeout_secs": self.database.timeout_secs,
            },
            "sessions": {
                "backend": self.sessions.backend,
                "ttl_secs": self.sessions.ttl_secs,
                "sweep_interval_secs": self.sessions.sweep_interval_secs,
                "max_slot_failures": self.sessions.max_slot_failures,
            },
            "extractor": {
                "enabled": self.extractor.enabled,
                "active": self.extractor.endpoint().is_some(),
                "url": self.extractor.url,
                "api_key": api_key,
                "timeout_secs": self.extractor.timeout_secs,
                "max_tokens": self.extractor.max_tokens,
            },
            "budget": {
                "base_url": self.budget.base_url,
                "timeout_secs": self.budget.timeout_secs,
                "min_count": self.budget.min_count,
                "max_count_cap": self.budget.max_count_cap,
                "default_max_questions": self.budget.default_max_questions,
                "max_attempts": self.budget.max_attempts,
                "base_delay_ms": self.budget.base_delay_ms,
                "max_jitter_ms": self.budget.max_jitter_ms,
            },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format,
            },
        })
    }
}

/// Keeps the first four characters of a secret and masks the rest.
pub fn redact_secret(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        return "****".to_string();
    }
    let prefix = secret.chars().take(4).collect::<String>();
    format!("{prefix}****")
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_sessions(sessions: &SessionsConfig) -> Result<(), ConfigError> {
    if sessions.ttl_secs > 0 && sessions.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sessions.sweep_interval_secs must be greater than zero when sessions.ttl_secs is set"
                .to_string(),
        ));
    }
    if sessions.ttl_secs > i64::MAX as u64 / 1_000 {
        return Err(ConfigError::Validation("sessions.ttl_secs is out of range".to_string()));
    }

    Ok(())
}

fn validate_extractor(extractor: &ExtractorConfig) -> Result<(), ConfigError> {
    if extractor.timeout_secs == 0 || extractor.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "extractor.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if extractor.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "extractor.max_tokens must be greater than zero".to_string(),
        ));
    }

    if let Some(url) = extractor.url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        validate_http_url("extractor.url", url)?;
    }

    Ok(())
}

fn validate_budget(budget: &BudgetConfig) -> Result<(), ConfigError> {
    if budget.min_count <= 0 {
        return Err(ConfigError::Validation(
            "budget.min_count must be greater than zero".to_string(),
        ));
    }

    if budget.max_count_cap < budget.min_count {
        return Err(ConfigError::Validation(
            "budget.max_count_cap must be at least budget.min_count".to_string(),
        ));
    }

    if budget.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "budget.max_attempts must be greater than zero".to_string(),
        ));
    }

    if budget.timeout_secs == 0 || budget.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "budget.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if let Some(url) = budget.base_url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        validate_http_url("budget.base_url", url)?;
    }

    Ok(())
}

fn validate_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{field} must start with http:// or https://")))
    }
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    database: Option<DatabasePatch>,
    sessions: Option<SessionsPatch>,
    extractor: Option<ExtractorPatch>,
    budget: Option<BudgetPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionsPatch {
    backend: Option<SessionBackend>,
    ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    max_slot_failures: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractorPatch {
    enabled: Option<bool>,
    url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct BudgetPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    min_count: Option<i64>,
    max_count_cap: Option<i64>,
    default_max_questions: Option<i64>,
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_jitter_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
