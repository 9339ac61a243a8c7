//! Language-model backed requirement extraction.
//!
//! The model only translates a message into candidate fields. Everything it
//! returns is normalised here before the merger sees it: textual sentinels
//! become absence, confidences are clamped and budget text goes through the
//! same parser the rule-based extractor uses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use proptalk_core::config::{LlmConfig, LlmProvider};
use proptalk_core::domain::budget::{parse_budget, BudgetRange};
use proptalk_core::domain::requirements::{
    PartialRequirementSet, PropertyType, RequirementField, RequirementSet, TransactionType,
};
use proptalk_core::errors::ExtractionError;
use proptalk_core::ports::RequirementExtractor;
use proptalk_core::search::AreaDirectory;

const DEFAULT_FIELD_CONFIDENCE: f64 = 0.75;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 400;
const RETRY_BACKOFF_MS: u64 = 250;

const SENTINELS: &[&str] = &["", "null", "none", "nil", "unknown", "n/a", "na", "undefined", "-"];

const SYSTEM_PROMPT: &str = "You extract property search criteria from one chat message. \
Reply with a single JSON object and nothing else. Keys: transaction_type (\"buy\" or \"rent\"), \
location (area name), budget (the budget exactly as the user wrote it, e.g. \"80-100k\" or \"1.5M\"), \
property_type (apartment, penthouse, studio, villa, townhouse or duplex), bedrooms (integer). \
Each key maps to {\"value\": ..., \"confidence\": number between 0 and 1}. \
Omit keys the message does not mention. Never guess.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request timed out")]
    Timeout,
    #[error("llm endpoint unreachable: {0}")]
    Connection(String),
    #[error("llm endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm client misconfigured: {0}")]
    Configuration(String),
}

impl LlmError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Configuration(_) => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connection(error.to_string())
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Connection(error.to_string())
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &LlmPrompt) -> Result<String, LlmError>;
}

/// Chat client for OpenAI-compatible, Anthropic and Ollama endpoints.
pub struct HttpLlmClient {
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
    client: Client,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;
        let base_url = config
            .base_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            client,
        })
    }

    pub fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            LlmProvider::Anthropic => format!("{}/v1/messages", self.base_url),
            LlmProvider::Ollama => format!("{}/api/chat", self.base_url),
        }
    }

    fn request_body(&self, prompt: &LlmPrompt) -> Value {
        request_body(self.provider, &self.model, prompt)
    }

    async fn send_once(&self, prompt: &LlmPrompt) -> Result<String, LlmError> {
        let mut request = self.client.post(self.endpoint()).json(&self.request_body(prompt));
        match (self.provider, &self.api_key) {
            (LlmProvider::Anthropic, Some(key)) => {
                request = request
                    .header("x-api-key", key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION);
            }
            (LlmProvider::Anthropic, None) => {
                return Err(LlmError::Configuration("anthropic requires an api key".to_string()));
            }
            (_, Some(key)) => request = request.bearer_auth(key.expose_secret()),
            (_, None) => {}
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }
        let payload: Value = response.json().await?;
        response_content(self.provider, &payload)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &LlmPrompt) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(content) => return Ok(content),
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.request_retry",
                        attempt,
                        error = %error,
                        "retrying llm request"
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)))
                        .await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

fn request_body(provider: LlmProvider, model: &str, prompt: &LlmPrompt) -> Value {
    match provider {
        LlmProvider::OpenAi => json!({
            "model": model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        }),
        LlmProvider::Anthropic => json!({
            "model": model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "system": prompt.system,
            "messages": [{"role": "user", "content": prompt.user}],
        }),
        LlmProvider::Ollama => json!({
            "model": model,
            "stream": false,
            "format": "json",
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        }),
    }
}

fn response_content(provider: LlmProvider, payload: &Value) -> Result<String, LlmError> {
    let content = match provider {
        LlmProvider::OpenAi => payload.pointer("/choices/0/message/content"),
        LlmProvider::Anthropic => payload.pointer("/content/0/text"),
        LlmProvider::Ollama => payload.pointer("/message/content"),
    };
    content
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| LlmError::Decode("response carried no message content".to_string()))
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(default)]
    value: Value,
    #[serde(default)]
    confidence: Option<Value>,
}

/// Requirement extraction through an [`LlmClient`].
pub struct LlmRequirementExtractor {
    client: Arc<dyn LlmClient>,
    areas: AreaDirectory,
}

impl LlmRequirementExtractor {
    pub fn new(client: Arc<dyn LlmClient>, areas: AreaDirectory) -> Self {
        Self { client, areas }
    }

    fn prompt(text: &str, current: &RequirementSet) -> LlmPrompt {
        let known = current.summary();
        let user = if known.is_empty() {
            format!("Message: {text}")
        } else {
            format!("Already known: {known}\nMessage: {text}")
        };
        LlmPrompt { system: SYSTEM_PROMPT.to_string(), user }
    }

    /// Normalises raw model output into a requirement set.
    pub fn interpret(&self, content: &str) -> Result<PartialRequirementSet, ExtractionError> {
        let object = json_object(content)?;
        let mut extracted = RequirementSet::default();

        if let Some(field) = raw_field(&object, "transaction_type")? {
            extracted.transaction_type = text_value(&field.value)
                .and_then(|value| value.parse::<TransactionType>().ok())
                .map(|value| RequirementField::new(value, confidence(&field)));
        }
        if let Some(field) = raw_field(&object, "location")? {
            extracted.location = text_value(&field.value).map(|value| {
                let canonical = self.areas.canonicalize(&value).unwrap_or(value);
                RequirementField::new(canonical, confidence(&field))
            });
        }
        if let Some(field) = raw_field(&object, "property_type")? {
            extracted.property_type = text_value(&field.value)
                .and_then(|value| value.parse::<PropertyType>().ok())
                .map(|value| RequirementField::new(value, confidence(&field)));
        }
        if let Some(field) = raw_field(&object, "bedrooms")? {
            extracted.bedrooms = integer_value(&field.value)
                .and_then(|value| u32::try_from(value).ok())
                .map(|value| RequirementField::new(value, confidence(&field)));
        }
        if let Some(field) = raw_field(&object, "budget")? {
            if let Some(range) = budget_value(&field.value) {
                extracted.set_budget(range, confidence(&field));
            }
        }

        Ok(extracted.sanitized())
    }
}

#[async_trait]
impl RequirementExtractor for LlmRequirementExtractor {
    async fn extract(
        &self,
        text: &str,
        current: &RequirementSet,
    ) -> Result<PartialRequirementSet, ExtractionError> {
        let content = self.client.complete(&Self::prompt(text, current)).await.map_err(|error| {
            match error {
                LlmError::Timeout => ExtractionError::Timeout,
                LlmError::Decode(message) => ExtractionError::Malformed(message),
                other => ExtractionError::Backend(other.to_string()),
            }
        })?;
        debug!(event_name = "llm.extraction_received", bytes = content.len(), "llm replied");
        self.interpret(&content)
    }
}

/// Accepts bare JSON, fenced JSON, or JSON wrapped in prose.
fn json_object(content: &str) -> Result<serde_json::Map<String, Value>, ExtractionError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => return Err(ExtractionError::Malformed("no JSON object in reply".to_string())),
    };
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ExtractionError::Malformed("reply is not a JSON object".to_string())),
        Err(error) => Err(ExtractionError::Malformed(error.to_string())),
    }
}

/// A key may hold `{"value", "confidence"}` or a bare value.
fn raw_field(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<RawField>, ExtractionError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(nested @ Value::Object(_)) => serde_json::from_value(nested.clone())
            .map(Some)
            .map_err(|error| ExtractionError::Malformed(format!("{key}: {error}"))),
        Some(bare) => Ok(Some(RawField { value: bare.clone(), confidence: None })),
    }
}

fn confidence(field: &RawField) -> f64 {
    match &field.confidence {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(DEFAULT_FIELD_CONFIDENCE),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(DEFAULT_FIELD_CONFIDENCE),
        _ => DEFAULT_FIELD_CONFIDENCE,
    }
}

fn text_value(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    if SENTINELS.contains(&text.to_ascii_lowercase().as_str()) {
        None
    } else {
        Some(text.to_string())
    }
}

fn integer_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(_) => text_value(value)?.parse().ok(),
        _ => None,
    }
}

fn budget_value(value: &Value) -> Option<BudgetRange> {
    match value {
        Value::Number(number) => number.as_u64().filter(|max| *max > 0).map(BudgetRange::ceiling),
        Value::String(_) => parse_budget(&text_value(value)?),
        Value::Object(bounds) => {
            let min = bounds.get("min").and_then(integer_value).filter(|min| *min > 0);
            let max = bounds.get("max").and_then(integer_value).filter(|max| *max > 0);
            (min.is_some() || max.is_some()).then_some(BudgetRange { min, max })
        }
        _ => None,
    }
}
