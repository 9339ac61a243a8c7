use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use proptalk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

/// Effective configuration with source attribution (env > file > default).
pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_path = options
        .config_path
        .clone()
        .filter(|path| path.exists())
        .or_else(detect_config_path);
    let document = load_config_file_doc(config_path.as_deref());

    let entries: Vec<ConfigEntry> = effective_values(&config)
        .into_iter()
        .map(|(key, value)| ConfigEntry {
            key,
            value,
            source: field_source(key, document.as_ref(), config_path.as_deref()),
        })
        .collect();

    let message = format!("{} settings resolved (source precedence: env > file > default)", entries.len());
    CommandResult::success_with_data("config", message, serde_json::to_value(&entries).ok())
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("slack.enabled", config.slack.enabled.to_string()),
        ("slack.app_token", redact_token(config.slack.app_token.expose_secret())),
        ("slack.bot_token", redact_token(config.slack.bot_token.expose_secret())),
        ("llm.provider", format!("{:?}", config.llm.provider)),
        ("llm.model", config.llm.model.clone()),
        ("llm.base_url", config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string())),
        ("llm.api_key", llm_api_key.to_string()),
        ("conversation.extractor", format!("{:?}", config.conversation.extractor)),
        ("conversation.confidence_threshold", config.conversation.confidence_threshold.to_string()),
        ("conversation.batch_size", config.conversation.batch_size.to_string()),
        ("conversation.session_ttl_secs", config.conversation.session_ttl_secs.to_string()),
        ("search.max_results", config.search.max_results.to_string()),
        ("search.parallel_relaxation", config.search.parallel_relaxation.to_string()),
        ("search.currency", config.search.currency.clone()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.health_check_port", config.server.health_check_port.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ]
}

fn env_key(key_path: &str) -> String {
    format!("PROPTALK_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("proptalk.toml"), PathBuf::from("config/proptalk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(key_path: &str, document: Option<&Value>, config_path: Option<&Path>) -> String {
    let env_key = env_key(key_path);
    if env::var_os(&env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = document {
        if contains_path(doc, key_path) {
            let file_path = config_path
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
