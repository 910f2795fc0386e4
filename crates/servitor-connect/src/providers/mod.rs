//! HTTP provider connectors.
//!
//! - [`openai`] -- OpenAI Chat Completions.
//! - [`anthropic`] -- Anthropic Messages.
//! - [`local`] -- Any OpenAI-compatible local server with a `/models` catalog.
//!
//! Each provider describes its wire format through [`Wire`]; the shared
//! [`HttpCompletion`] does admission, the request itself, status mapping and
//! usage settlement.

pub mod anthropic;
pub mod local;
pub mod openai;
pub mod sse;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::completion::{CompletionSource, FragmentStream};
use crate::config::Config;
use crate::connector::ConnectorRegistry;
use crate::error::{ConnectorError, Result};
use crate::throttle::Throttle;
use crate::tokens::estimate_prompt_cost;

pub use anthropic::AnthropicConnector;
pub use local::LocalConnector;
pub use openai::OpenAiConnector;
pub use sse::StreamDecoder;

/// A registry with every HTTP provider, most specific first: `anthropic`,
/// `local`, then `openai`.
pub fn default_registry() -> Result<ConnectorRegistry> {
    let mut registry = ConnectorRegistry::new();
    registry.register(AnthropicConnector::new()?);
    registry.register(LocalConnector::new()?);
    registry.register(OpenAiConnector::new()?);
    Ok(registry)
}

/// Per-request deadline from `request_timeout`; unbounded values saturate.
pub(crate) fn request_timeout(config: &Config) -> Duration {
    Duration::try_from_secs_f64(config.request_timeout())
        .unwrap_or(Duration::from_secs(u64::from(u32::MAX)))
}

/// Upfront token estimate for one request: the prompt plus the full output
/// allowance.
pub(crate) fn request_cost(prompt: &str, config: &Config) -> u64 {
    estimate_prompt_cost(prompt).saturating_add(config.max_tokens())
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| ConnectorError::RequestFailed {
            reason: format!("failed to build HTTP client: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Wire format seam
// ---------------------------------------------------------------------------

/// A provider's request and response format.
pub trait Wire: Send + Sync + 'static {
    type Decoder: StreamDecoder;

    /// Provider name used in errors and logs.
    fn provider(&self) -> &str;

    /// Build the HTTP request, streaming or not.
    fn request(&self, http: &reqwest::Client, stream: bool) -> Result<reqwest::RequestBuilder>;

    /// Extract `(text, total_tokens)` from a non-streaming response body.
    fn parse_response(&self, body: &Value) -> Result<(String, Option<u64>)>;

    /// A fresh decoder for one streaming response.
    fn decoder(&self) -> Self::Decoder;
}

/// Map a non-success status to a normalized error.
pub(crate) async fn check_status(provider: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(status_error(provider, status, &text))
}

pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> ConnectorError {
    let reason = format!("API returned {status}: {body}");
    match status.as_u16() {
        429 => ConnectorError::Throttled {
            provider: provider.to_owned(),
            reason,
        },
        502 | 503 | 504 | 529 => ConnectorError::Busy {
            provider: provider.to_owned(),
            reason,
        },
        _ => ConnectorError::RequestFailed { reason },
    }
}

// ---------------------------------------------------------------------------
// HttpCompletion
// ---------------------------------------------------------------------------

/// A completion request against an HTTP provider, issued on consumption.
pub struct HttpCompletion<W: Wire> {
    http: reqwest::Client,
    throttle: Arc<Throttle>,
    cost: u64,
    timeout: Duration,
    wire: W,
}

impl<W: Wire> HttpCompletion<W> {
    pub fn new(
        http: reqwest::Client,
        throttle: Arc<Throttle>,
        cost: u64,
        timeout: Duration,
        wire: W,
    ) -> Self {
        Self {
            http,
            throttle,
            cost,
            timeout,
            wire,
        }
    }
}

#[async_trait]
impl<W: Wire> CompletionSource for HttpCompletion<W> {
    async fn text(self: Box<Self>) -> Result<String> {
        let lease = self.throttle.acquire(self.cost).await?;
        let provider = self.wire.provider();

        let resp = self
            .wire
            .request(&self.http, false)?
            .timeout(self.timeout)
            .send()
            .await?;
        let resp = check_status(provider, resp).await?;
        let raw = resp.text().await.map_err(|e| ConnectorError::RequestFailed {
            reason: format!("failed to read response body: {e}"),
        })?;
        let body: Value = serde_json::from_str(&raw).map_err(|e| ConnectorError::ResponseParse {
            reason: format!("invalid JSON response: {e}"),
        })?;

        let (text, usage) = self.wire.parse_response(&body)?;
        lease.settle(usage.unwrap_or(self.cost));
        tracing::debug!(provider, chars = text.len(), "completion received");
        Ok(text)
    }

    fn stream(self: Box<Self>) -> FragmentStream {
        let this = *self;
        let decoder = this.wire.decoder();
        let open = async move {
            let lease = this.throttle.acquire(this.cost).await?;
            let resp = this
                .wire
                .request(&this.http, true)?
                .timeout(this.timeout)
                .send()
                .await?;
            let resp = check_status(this.wire.provider(), resp).await?;
            Ok((resp, lease))
        };
        sse::fragment_stream(open, decoder)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let throttled = status_error("openai", StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(throttled, ConnectorError::Throttled { .. }));

        for code in [502u16, 503, 504, 529] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = status_error("anthropic", status, "");
            assert!(matches!(err, ConnectorError::Busy { .. }), "{code}");
            assert!(err.is_transient());
        }

        let fatal = status_error("openai", StatusCode::UNAUTHORIZED, "bad key");
        assert!(!fatal.is_transient());
        assert!(fatal.to_string().contains("401"));
        assert!(fatal.to_string().contains("bad key"));
    }
}
