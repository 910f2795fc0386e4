//! Anthropic Messages provider.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use super::sse::{StreamDecoder, data_payload};
use super::{HttpCompletion, Wire, http_client, request_cost, request_timeout};
use crate::completion::Completion;
use crate::config::Config;
use crate::connector::Connector;
use crate::error::{ConnectorError, Result};
use crate::throttle::{ThrottleLimits, ThrottleRegistry};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const CREDENTIAL_KEY: &str = "anthropic_api_key";

/// Connector for the Anthropic Messages API.
#[derive(Debug)]
pub struct AnthropicConnector {
    http: reqwest::Client,
    throttles: Arc<ThrottleRegistry>,
}

impl AnthropicConnector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            throttles: Arc::new(ThrottleRegistry::new()),
        })
    }
}

#[async_trait]
impl Connector for AnthropicConnector {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn supports(&self, config: &Config) -> bool {
        config.get(CREDENTIAL_KEY).is_some()
            && config.model().is_some_and(|m| m.starts_with("claude"))
    }

    fn complete(&self, prompt: &str, config: &Config) -> Result<Completion> {
        let api_key = config
            .get(CREDENTIAL_KEY)
            .ok_or_else(|| ConnectorError::MissingCredential {
                provider: "anthropic".into(),
                key: CREDENTIAL_KEY.into(),
            })?;
        let model = config.model().ok_or_else(|| ConnectorError::NotFound {
            model: "<unset>".into(),
        })?;
        let base_url = config
            .get("anthropic_base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());

        let throttle = self
            .throttles
            .get_or_create(&api_key, ThrottleLimits::from_config(config));
        let wire = MessagesWire {
            url: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            api_key,
            body: request_body(&model, prompt, config),
        };

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

#[derive(Debug, Clone)]
struct MessagesWire {
    url: String,
    api_key: String,
    body: Value,
}

/// Build the Messages API body for a single user prompt.
pub fn request_body(model: &str, prompt: &str, config: &Config) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": config.max_tokens(),
        "messages": [{"role": "user", "content": prompt}],
        "temperature": config.temperature().min(1.0),
        "top_p": config.top_p(),
    });

    let top_k = config.top_k();
    if top_k > 0 {
        body["top_k"] = json!(top_k);
    }
    if let Some(stop) = config.stop().filter(|s| !s.is_empty()) {
        body["stop_sequences"] = json!(stop);
    }

    body
}

impl Wire for MessagesWire {
    type Decoder = MessagesDecoder;

    fn provider(&self) -> &str {
        "anthropic"
    }

    fn request(&self, http: &reqwest::Client, stream: bool) -> Result<reqwest::RequestBuilder> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| ConnectorError::RequestFailed {
                reason: format!("invalid API key header: {e}"),
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut body = self.body.clone();
        if stream {
            body["stream"] = json!(true);
        }

        tracing::debug!(url = %self.url, model = %body["model"], provider = "anthropic", stream, "sending completion request");
        Ok(http.post(&self.url).headers(headers).json(&body))
    }

    fn parse_response(&self, body: &Value) -> Result<(String, Option<u64>)> {
        parse_response(body)
    }

    fn decoder(&self) -> MessagesDecoder {
        MessagesDecoder::default()
    }
}

/// Concatenate the text blocks of a Messages response and total its usage.
pub fn parse_response(body: &Value) -> Result<(String, Option<u64>)> {
    if body["type"] == "error" {
        let reason = body["error"]["message"]
            .as_str()
            .unwrap_or("unknown error")
            .to_owned();
        return Err(ConnectorError::RequestFailed { reason });
    }

    let content = body["content"]
        .as_array()
        .ok_or_else(|| ConnectorError::ResponseParse {
            reason: "missing `content` array in response".into(),
        })?;

    let text: String = content
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();

    let usage = &body["usage"];
    let total = match (
        usage["input_tokens"].as_u64(),
        usage["output_tokens"].as_u64(),
    ) {
        (None, None) => None,
        (i, o) => Some(i.unwrap_or(0) + o.unwrap_or(0)),
    };
    Ok((text, total))
}

// ---------------------------------------------------------------------------
// Stream decoder
// ---------------------------------------------------------------------------

/// Decodes `event:`/`data:` pairs of a Messages stream.
#[derive(Debug, Default)]
pub struct MessagesDecoder {
    current_event: Option<String>,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    done: bool,
}

impl StreamDecoder for MessagesDecoder {
    fn feed_line(&mut self, line: &str) -> Result<Option<String>> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        if let Some(event) = line.strip_prefix("event:") {
            self.current_event = Some(event.trim().to_owned());
            return Ok(None);
        }

        let Some(data) = data_payload(line) else {
            tracing::trace!(line, "ignoring unrecognised SSE line");
            return Ok(None);
        };
        let v: Value = serde_json::from_str(data).map_err(|e| ConnectorError::Stream {
            reason: format!("invalid JSON in stream data: {e}"),
        })?;

        let event = self
            .current_event
            .take()
            .or_else(|| v["type"].as_str().map(str::to_owned))
            .unwrap_or_default();

        match event.as_str() {
            "message_start" => {
                let usage = &v["message"]["usage"];
                self.input_tokens = usage["input_tokens"].as_u64();
                if let Some(out) = usage["output_tokens"].as_u64() {
                    self.output_tokens = Some(out);
                }
                Ok(None)
            }
            "content_block_delta" if v["delta"]["type"] == "text_delta" => {
                Ok(v["delta"]["text"].as_str().map(str::to_owned))
            }
            "message_delta" => {
                if let Some(out) = v["usage"]["output_tokens"].as_u64() {
                    self.output_tokens = Some(out);
                }
                Ok(None)
            }
            "message_stop" => {
                self.done = true;
                Ok(None)
            }
            "error" => Err(ConnectorError::Stream {
                reason: v["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error")
                    .to_owned(),
            }),
            _ => Ok(None),
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn usage(&self) -> Option<u64> {
        match (self.input_tokens, self.output_tokens) {
            (None, None) => None,
            (i, o) => Some(i.unwrap_or(0) + o.unwrap_or(0)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
