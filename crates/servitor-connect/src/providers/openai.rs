//! OpenAI Chat Completions provider.
//!
//! The wire format here is shared with [`local`](super::local), which speaks
//! the same protocol to a self-hosted server.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use super::sse::{StreamDecoder, data_payload};
use super::{HttpCompletion, Wire, http_client, request_cost, request_timeout};
use crate::completion::Completion;
use crate::config::Config;
use crate::connector::Connector;
use crate::error::{ConnectorError, Result};
use crate::throttle::{ThrottleLimits, ThrottleRegistry};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const CREDENTIAL_KEY: &str = "openai_api_key";

const KNOWN_MODELS: &[&str] = &[
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
    "gpt-4",
    "gpt-4-32k",
    "gpt-4-turbo",
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
    "gpt-4.1-mini",
    "o1",
    "o1-mini",
    "o3",
    "o3-mini",
];

/// Whether `model` names an OpenAI chat model.
pub fn is_known_model(model: &str) -> bool {
    KNOWN_MODELS.contains(&model)
        || model.starts_with("gpt-")
        || model.starts_with("o1-")
        || model.starts_with("o3-")
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Connector for the hosted OpenAI API.
#[derive(Debug)]
pub struct OpenAiConnector {
    http: reqwest::Client,
    throttles: Arc<ThrottleRegistry>,
}

impl OpenAiConnector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            throttles: Arc::new(ThrottleRegistry::new()),
        })
    }
}

#[async_trait]
impl Connector for OpenAiConnector {
    fn name(&self) -> &str {
        "openai"
    }

    async fn supports(&self, config: &Config) -> bool {
        config.get(CREDENTIAL_KEY).is_some()
            || config.model().is_some_and(|m| is_known_model(&m))
    }

    fn complete(&self, prompt: &str, config: &Config) -> Result<Completion> {
        let api_key = config
            .get(CREDENTIAL_KEY)
            .ok_or_else(|| ConnectorError::MissingCredential {
                provider: "openai".into(),
                key: CREDENTIAL_KEY.into(),
            })?;
        let base_url = config
            .get("openai_base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let model = config.model().unwrap_or_else(|| DEFAULT_MODEL.to_owned());

        let throttle = self
            .throttles
            .get_or_create(&api_key, ThrottleLimits::from_config(config));
        let wire = ChatWire::new("openai", &base_url, Some(api_key), &model, prompt, config)
            .organization(config.get("openai_organization"));

        Ok(Completion::new(HttpCompletion::new(
            self.http.clone(),
            throttle,
            request_cost(prompt, config),
            request_timeout(config),
            wire,
        )))
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// One Chat Completions request.
#[derive(Debug, Clone)]
pub struct ChatWire {
    provider: &'static str,
    url: String,
    api_key: Option<String>,
    organization: Option<String>,
    body: Value,
}

impl ChatWire {
    pub fn new(
        provider: &'static str,
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        prompt: &str,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            organization: None,
            body: request_body(provider, model, prompt, config),
        }
    }

    pub fn organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization;
        self
    }

    /// The JSON body sent for a non-streaming request.
    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// Build the Chat Completions body for a single user prompt.
pub fn request_body(provider: &str, model: &str, prompt: &str, config: &Config) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
        "temperature": config.temperature(),
        "top_p": config.top_p(),
        "frequency_penalty": config.frequency_penalty(),
        "presence_penalty": config.presence_penalty(),
        "max_tokens": config.max_tokens(),
    });

    if let Some(stop) = config.stop().filter(|s| !s.is_empty()) {
        body["stop"] = json!(stop);
    }
    if config.best_of() > 1 {
        body["n"] = json!(config.best_of());
    }

    let top_k = config.top_k();
    if top_k > 0 {
        tracing::warn!(provider, top_k, "top_k is not supported by this provider; ignoring");
    }

    body
}

impl Wire for ChatWire {
    type Decoder = ChatDecoder;

    fn provider(&self) -> &str {
        self.provider
    }

    fn request(&self, http: &reqwest::Client, stream: bool) -> Result<reqwest::RequestBuilder> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                    ConnectorError::RequestFailed {
                        reason: format!("invalid authorization header: {e}"),
                    }
                })?,
            );
        }
        if let Some(org) = &self.organization {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org).map_err(|e| ConnectorError::RequestFailed {
                    reason: format!("invalid organization header: {e}"),
                })?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut body = self.body.clone();
        if stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({"include_usage": true});
        }

        tracing::debug!(url = %self.url, model = %body["model"], provider = self.provider, stream, "sending completion request");
        Ok(http.post(&self.url).headers(headers).json(&body))
    }

    fn parse_response(&self, body: &Value) -> Result<(String, Option<u64>)> {
        parse_response(body)
    }

    fn decoder(&self) -> ChatDecoder {
        ChatDecoder::default()
    }
}

/// Extract the first choice's text and the total token usage.
pub fn parse_response(body: &Value) -> Result<(String, Option<u64>)> {
    if let Some(message) = body["error"]["message"].as_str() {
        return Err(ConnectorError::RequestFailed {
            reason: message.to_owned(),
        });
    }

    let message = &body["choices"][0]["message"];
    if message.is_null() {
        return Err(ConnectorError::ResponseParse {
            reason: "missing `choices[0].message` in response".into(),
        });
    }
    let text = message["content"].as_str().unwrap_or_default().to_owned();
    Ok((text, usage_total(&body["usage"])))
}

fn usage_total(usage: &Value) -> Option<u64> {
    if let Some(total) = usage["total_tokens"].as_u64() {
        return Some(total);
    }
    let prompt = usage["prompt_tokens"].as_u64();
    let completion = usage["completion_tokens"].as_u64();
    match (prompt, completion) {
        (None, None) => None,
        (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
    }
}

// ---------------------------------------------------------------------------
// Stream decoder
// ---------------------------------------------------------------------------

/// Decodes `data:` lines of a Chat Completions stream.
#[derive(Debug, Default)]
pub struct ChatDecoder {
    done: bool,
    usage: Option<u64>,
}

impl StreamDecoder for ChatDecoder {
    fn feed_line(&mut self, line: &str) -> Result<Option<String>> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }
        let Some(data) = data_payload(line) else {
            return Ok(None);
        };

        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let v: Value = serde_json::from_str(data).map_err(|e| ConnectorError::Stream {
            reason: format!("invalid JSON in stream data: {e}"),
        })?;

        if let Some(message) = v["error"]["message"].as_str() {
            return Err(ConnectorError::Stream {
                reason: message.to_owned(),
            });
        }

        if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
            self.usage = usage_total(usage);
        }

        Ok(v["choices"][0]["delta"]["content"]
            .as_str()
            .map(str::to_owned))
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn usage(&self) -> Option<u64> {
        self.usage
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
