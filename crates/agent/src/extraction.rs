use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use clarifier_core::config::ExtractorConfig;
use clarifier_core::extraction::{ExtractorResult, SlotExtractor};
use clarifier_core::slots::ParserHint;
use regex::Regex;
use serde_json::{Map, Value};

use crate::llm::{CompletionRequest, HttpLlmClient, LlmClient};
use crate::prompts::system_prompt;

static JSON_OBJECT: OnceLock<Option<Regex>> = OnceLock::new();

fn json_object_pattern() -> Option<&'static Regex> {
    JSON_OBJECT.get_or_init(|| Regex::new(r"\{[\s\S]*\}").ok()).as_ref()
}

/// Language-model backed [`SlotExtractor`]. Every failure path ends in an
/// empty result.
pub struct ExtractionFallback {
    client: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl ExtractionFallback {
    pub fn new(client: Arc<dyn LlmClient>, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    /// Builds the fallback when it is switched on and has somewhere to call.
    /// The flag without a URL disables it.
    pub fn from_config(config: &ExtractorConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let Some(endpoint) = config.endpoint() else {
            tracing::info!(
                event_name = "clarifier.extractor.disabled",
                reason = "missing_url",
                "extraction fallback enabled without a url, leaving it off"
            );
            return None;
        };

        match HttpLlmClient::new(endpoint, config.api_key.clone(), config.timeout()) {
            Ok(client) => {
                tracing::info!(
                    event_name = "clarifier.extractor.enabled",
                    endpoint,
                    "extraction fallback enabled"
                );
                Some(Self::new(Arc::new(client), config.max_tokens))
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "clarifier.extractor.disabled",
                    reason = "client_build_failed",
                    error = %error,
                    "extraction fallback could not be built"
                );
                None
            }
        }
    }
}

#[async_trait]
impl SlotExtractor for ExtractionFallback {
    async fn extract(
        &self,
        text: &str,
        slot_key: &str,
        hint: Option<ParserHint>,
    ) -> ExtractorResult {
        let request = CompletionRequest {
            system_prompt: system_prompt(slot_key, hint).to_string(),
            user_input: text.to_string(),
            max_tokens: self.max_tokens,
        };

        match self.client.complete(&request).await {
            Ok(body) => {
                let result = read_extraction(&body);
                tracing::debug!(
                    event_name = "clarifier.extractor.completed",
                    slot = slot_key,
                    empty = result.is_empty(),
                    out_of_scope = result.out_of_scope,
                    "extraction fallback answered"
                );
                result
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "clarifier.extractor.failed",
                    slot = slot_key,
                    error = %error,
                    "extraction fallback failed, treating as no value"
                );
                ExtractorResult::default()
            }
        }
    }
}

/// Reads an extraction response body.
///
/// Accepts a bare JSON object, `{"content": "..."}`, or a chat completion
/// `{"choices": [{"message": {"content": "..."}}]}`. Text payloads go through
/// a JSON object search before parsing. Only whitelisted keys survive.
pub fn read_extraction(body: &str) -> ExtractorResult {
    let Some(object) = locate_object(body) else {
        return ExtractorResult::default();
    };

    let payload = match embedded_text(&object) {
        Some(text) => match locate_object(text) {
            Some(inner) => inner,
            None => return ExtractorResult::default(),
        },
        None => object,
    };

    whitelist(&payload)
}

fn locate_object(text: &str) -> Option<Map<String, Value>> {
    let candidate = json_object_pattern()
        .and_then(|pattern| pattern.find(text))
        .map_or(text, |found| found.as_str());
    match serde_json::from_str::<Value>(candidate).ok()? {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

fn embedded_text(object: &Map<String, Value>) -> Option<&str> {
    if let Some(content) = object
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    {
        return Some(content);
    }
    object.get("content").and_then(Value::as_str)
}

fn whitelist(payload: &Map<String, Value>) -> ExtractorResult {
    ExtractorResult {
        question_types: payload.get("question_types").and_then(Value::as_array).map(|values| {
            values.iter().filter_map(Value::as_str).map(str::to_string).collect()
        }),
        difficulty: payload.get("difficulty").and_then(Value::as_str).map(str::to_string),
        requested_count: payload.get("requested_count").and_then(whole_number),
        count: payload.get("count").and_then(whole_number),
        out_of_scope: payload.get("out_of_scope").and_then(Value::as_bool) == Some(true),
    }
}

fn whole_number(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value.as_f64().filter(|number| number.is_finite()).map(|number| number.round() as i64)
    })
}
