use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::requirements::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::domain::session::{DEFAULT_SESSION_TTL_SECS, MAX_SESSION_TTL_SECS};
use crate::pagination::DEFAULT_BATCH_SIZE;
use crate::search::SearchSettings;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub llm: LlmConfig,
    pub conversation: ConversationConfig,
    pub search: SearchConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub enabled: bool,
    pub app_token: SecretString,
    pub bot_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub confidence_threshold: f64,
    pub batch_size: usize,
    pub session_ttl_secs: u64,
    pub extraction_timeout_secs: u64,
    pub extractor: ExtractorKind,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub max_results: usize,
    pub query_timeout_ms: u64,
    pub parallel_relaxation: bool,
    pub currency: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    Rules,
    Llm,
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
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub slack_enabled: Option<bool>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub extractor: Option<ExtractorKind>,
    pub batch_size: Option<usize>,
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
            database: DatabaseConfig {
                url: "sqlite://proptalk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                enabled: false,
                app_token: String::new().into(),
                bot_token: String::new().into(),
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            conversation: ConversationConfig {
                confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
                batch_size: DEFAULT_BATCH_SIZE,
                session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
                extraction_timeout_secs: 10,
                extractor: ExtractorKind::Rules,
            },
            search: SearchConfig {
                max_results: 100,
                query_timeout_ms: 3_000,
                parallel_relaxation: true,
                currency: "AED".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for ExtractorKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::Validation(format!(
                "unsupported extractor `{other}` (expected rules|llm)"
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

impl ConversationConfig {
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }
}

impl SearchConfig {
    pub fn settings(&self) -> SearchSettings {
        SearchSettings {
            max_results: self.max_results,
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            parallel_relaxation: self.parallel_relaxation,
            currency: self.currency.clone(),
        }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("proptalk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
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

        if let Some(slack) = patch.slack {
            if let Some(enabled) = slack.enabled {
                self.slack.enabled = enabled;
            }
            if let Some(app_token) = slack.app_token {
                self.slack.app_token = secret_value(app_token);
            }
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(threshold) = conversation.confidence_threshold {
                self.conversation.confidence_threshold = threshold;
            }
            if let Some(batch_size) = conversation.batch_size {
                self.conversation.batch_size = batch_size;
            }
            if let Some(ttl) = conversation.session_ttl_secs {
                self.conversation.session_ttl_secs = ttl;
            }
            if let Some(timeout) = conversation.extraction_timeout_secs {
                self.conversation.extraction_timeout_secs = timeout;
            }
            if let Some(extractor) = conversation.extractor {
                self.conversation.extractor = extractor;
            }
        }

        if let Some(search) = patch.search {
            if let Some(max_results) = search.max_results {
                self.search.max_results = max_results;
            }
            if let Some(timeout) = search.query_timeout_ms {
                self.search.query_timeout_ms = timeout;
            }
            if let Some(parallel) = search.parallel_relaxation {
                self.search.parallel_relaxation = parallel;
            }
            if let Some(currency) = search.currency {
                self.search.currency = currency;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("PROPTALK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PROPTALK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_number("PROPTALK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_number("PROPTALK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROPTALK_SLACK_ENABLED") {
            self.slack.enabled = parse_number("PROPTALK_SLACK_ENABLED", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_SLACK_APP_TOKEN") {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env("PROPTALK_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }

        if let Some(value) = read_env("PROPTALK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("PROPTALK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PROPTALK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PROPTALK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PROPTALK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_number("PROPTALK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_number("PROPTALK_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("PROPTALK_CONVERSATION_CONFIDENCE_THRESHOLD") {
            self.conversation.confidence_threshold =
                parse_number("PROPTALK_CONVERSATION_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_CONVERSATION_BATCH_SIZE") {
            self.conversation.batch_size =
                parse_number("PROPTALK_CONVERSATION_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_CONVERSATION_SESSION_TTL_SECS") {
            self.conversation.session_ttl_secs =
                parse_number("PROPTALK_CONVERSATION_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_CONVERSATION_EXTRACTION_TIMEOUT_SECS") {
            self.conversation.extraction_timeout_secs =
                parse_number("PROPTALK_CONVERSATION_EXTRACTION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_CONVERSATION_EXTRACTOR") {
            self.conversation.extractor = value.parse()?;
        }

        if let Some(value) = read_env("PROPTALK_SEARCH_MAX_RESULTS") {
            self.search.max_results = parse_number("PROPTALK_SEARCH_MAX_RESULTS", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_SEARCH_QUERY_TIMEOUT_MS") {
            self.search.query_timeout_ms = parse_number("PROPTALK_SEARCH_QUERY_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_SEARCH_PARALLEL_RELAXATION") {
            self.search.parallel_relaxation =
                parse_number("PROPTALK_SEARCH_PARALLEL_RELAXATION", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_SEARCH_CURRENCY") {
            self.search.currency = value;
        }

        if let Some(value) = read_env("PROPTALK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PROPTALK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_number("PROPTALK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("PROPTALK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_number("PROPTALK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("PROPTALK_LOGGING_LEVEL").or_else(|| read_env("PROPTALK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PROPTALK_LOGGING_FORMAT").or_else(|| read_env("PROPTALK_LOG_FORMAT"));
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
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(enabled) = overrides.slack_enabled {
            self.slack.enabled = enabled;
        }
        if let Some(app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(app_token);
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(extractor) = overrides.extractor {
            self.conversation.extractor = extractor;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.conversation.batch_size = batch_size;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        if self.slack.enabled {
            validate_slack(&self.slack)?;
        }
        validate_llm(&self.llm, self.conversation.extractor)?;
        validate_conversation(&self.conversation)?;
        validate_search(&self.search)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("proptalk.toml"), PathBuf::from("config/proptalk.toml")]
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

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required when slack.enabled = true. Create an app-level token under Basic Information > App-Level Tokens".to_string(),
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required when slack.enabled = true. Copy the Bot User OAuth Token from OAuth & Permissions".to_string(),
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}"
        )));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig, extractor: ExtractorKind) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if extractor != ExtractorKind::Llm {
        return Ok(());
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    let threshold = conversation.confidence_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(ConfigError::Validation(
            "conversation.confidence_threshold must be in range (0, 1]".to_string(),
        ));
    }
    if conversation.batch_size == 0 {
        return Err(ConfigError::Validation(
            "conversation.batch_size must be at least 1".to_string(),
        ));
    }
    if conversation.session_ttl_secs == 0 || conversation.session_ttl_secs > MAX_SESSION_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "conversation.session_ttl_secs must be in range 1..={MAX_SESSION_TTL_SECS}"
        )));
    }
    if conversation.extraction_timeout_secs == 0 || conversation.extraction_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "conversation.extraction_timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.max_results == 0 {
        return Err(ConfigError::Validation(
            "search.max_results must be greater than zero".to_string(),
        ));
    }
    if search.query_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "search.query_timeout_ms must be greater than zero".to_string(),
        ));
    }
    if search.currency.trim().is_empty() {
        return Err(ConfigError::Validation("search.currency must not be empty".to_string()));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
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

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    llm: Option<LlmPatch>,
    conversation: Option<ConversationPatch>,
    search: Option<SearchPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    enabled: Option<bool>,
    app_token: Option<String>,
    bot_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    confidence_threshold: Option<f64>,
    batch_size: Option<usize>,
    session_ttl_secs: Option<u64>,
    extraction_timeout_secs: Option<u64>,
    extractor: Option<ExtractorKind>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    max_results: Option<usize>,
    query_timeout_ms: Option<u64>,
    parallel_relaxation: Option<bool>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, ExtractorKind, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_slack_credentials() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.slack.enabled, "slack should be disabled by default")?;
        ensure(config.conversation.batch_size == 10, "batch size should default to 10")?;
        ensure(
            (config.conversation.confidence_threshold - 0.7).abs() < f64::EPSILON,
            "confidence threshold should default to 0.7",
        )?;
        ensure(config.conversation.session_ttl_secs == 86_400, "ttl should default to 24h")?;
        ensure(config.search.currency == "AED", "currency should default to AED")?;
        ensure(
            config.conversation.extractor == ExtractorKind::Rules,
            "rule-based extraction should be the default",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_PROPTALK_APP_TOKEN", "xapp-from-env");
        env::set_var("TEST_PROPTALK_BOT_TOKEN", "xoxb-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("proptalk.toml");
            fs::write(
                &path,
                r#"
[slack]
enabled = true
app_token = "${TEST_PROPTALK_APP_TOKEN}"
bot_token = "${TEST_PROPTALK_BOT_TOKEN}"

[conversation]
batch_size = 5
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.slack.app_token.expose_secret() == "xapp-from-env",
                "app token should be loaded from environment",
            )?;
            ensure(
                config.slack.bot_token.expose_secret() == "xoxb-from-env",
                "bot token should be loaded from environment",
            )?;
            ensure(config.conversation.batch_size == 5, "batch size should come from file")
        })();

        clear_vars(&["TEST_PROPTALK_APP_TOKEN", "TEST_PROPTALK_BOT_TOKEN"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROPTALK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("PROPTALK_SEARCH_MAX_RESULTS", "40");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("proptalk.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[search]
max_results = 20
currency = "USD"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.search.max_results == 40, "env max_results should win over file")?;
            ensure(config.search.currency == "USD", "file currency should win over default")
        })();

        clear_vars(&["PROPTALK_DATABASE_URL", "PROPTALK_SEARCH_MAX_RESULTS"]);
        result
    }

    #[test]
    fn enabled_slack_requires_well_formed_tokens() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROPTALK_SLACK_ENABLED", "true");
        env::set_var("PROPTALK_SLACK_APP_TOKEN", "bad");
        env::set_var("PROPTALK_SLACK_BOT_TOKEN", "xoxb-valid");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("slack.app_token")
            );
            ensure(has_message, "validation failure should mention slack.app_token")
        })();

        clear_vars(&[
            "PROPTALK_SLACK_ENABLED",
            "PROPTALK_SLACK_APP_TOKEN",
            "PROPTALK_SLACK_BOT_TOKEN",
        ]);
        result
    }

    #[test]
    fn invalid_threshold_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROPTALK_CONVERSATION_CONFIDENCE_THRESHOLD", "1.5");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("threshold above 1 should be rejected".to_string()),
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("confidence_threshold"), "message should name the field")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["PROPTALK_CONVERSATION_CONFIDENCE_THRESHOLD"]);
        result
    }

    #[test]
    fn session_ttl_beyond_a_year_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROPTALK_CONVERSATION_SESSION_TTL_SECS", "10000000000000000");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("an oversized ttl should be rejected".to_string()),
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("session_ttl_secs"), "message should name the field")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["PROPTALK_CONVERSATION_SESSION_TTL_SECS"]);
        result
    }

    #[test]
    fn malformed_env_number_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROPTALK_CONVERSATION_BATCH_SIZE", "ten");
        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "PROPTALK_CONVERSATION_BATCH_SIZE", "key should be reported")
            }
            Ok(_) => Err("non-numeric batch size should fail".to_string()),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["PROPTALK_CONVERSATION_BATCH_SIZE"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROPTALK_SLACK_APP_TOKEN", "xapp-secret-value");
        env::set_var("PROPTALK_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("xapp-secret-value"),
                "debug output should not contain app token",
            )?;
            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["PROPTALK_SLACK_APP_TOKEN", "PROPTALK_LLM_API_KEY"]);
        result
    }
}
