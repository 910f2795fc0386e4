//! Layered call configuration.
//!
//! A [`ConfigLayer`] is a sparse set of options; a [`Config`] is an ordered
//! stack of layers (built-in defaults, then process-wide overrides, then
//! call-site overrides) whose getters fall through from the top layer to the
//! bottom.  Numeric options are clamped into their domain when a layer is
//! assembled, never when they are read.
//!
//! Keys outside the common set are kept verbatim as provider-specific
//! options (credentials, base URLs, organization ids).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ConfigError;

/// Result alias for configuration assembly.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_ADAPTER: &str = "type";
pub const DEFAULT_TEMPERATURE: f64 = 0.0;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_TOP_K: u64 = 0;
pub const DEFAULT_PENALTY: f64 = 0.0;
pub const DEFAULT_MAX_TOKENS: u64 = 1000;
pub const DEFAULT_BEST_OF: u64 = 1;
pub const DEFAULT_RETRY: u32 = 3;
pub const DEFAULT_CONCURRENT: u32 = 1;
pub const DEFAULT_REQUEST_RATE: f64 = 60.0;
pub const DEFAULT_TOKEN_RATE: f64 = 250_000.0;
pub const DEFAULT_PERIOD: f64 = 60.0;
pub const DEFAULT_REQUEST_TIMEOUT: f64 = 120.0;

/// Smallest accepted throttle period, in seconds.
pub const MIN_PERIOD: f64 = 0.001;

/// Options with a typed meaning in every layer.
pub const COMMON_KEYS: &[&str] = &[
    "model",
    "adapter",
    "temperature",
    "top_p",
    "top_k",
    "frequency_penalty",
    "presence_penalty",
    "max_tokens",
    "best_of",
    "stop",
    "retry",
    "concurrent",
    "request_rate",
    "token_rate",
    "period",
    "request_timeout",
];

/// Provider credential keys.  Each is also read from its bare upper-case
/// environment name (`OPENAI_API_KEY`).
pub const CREDENTIAL_KEYS: &[&str] = &["openai_api_key", "anthropic_api_key", "local_api_key"];

/// Whether a provider key holds a secret that must never be displayed.
pub fn is_secret(key: &str) -> bool {
    key.ends_with("_key") || key.ends_with("_token") || key.ends_with("_secret")
}

// ---------------------------------------------------------------------------
// ConfigLayer
// ---------------------------------------------------------------------------

/// A sparse set of configuration options.
///
/// Integer setters are infallible; floating-point setters reject NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigLayer {
    model: Option<String>,
    adapter: Option<String>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    top_k: Option<u64>,
    frequency_penalty: Option<f64>,
    presence_penalty: Option<f64>,
    max_tokens: Option<u64>,
    best_of: Option<u64>,
    stop: Option<Vec<String>>,
    retry: Option<u32>,
    concurrent: Option<u32>,
    request_rate: Option<f64>,
    token_rate: Option<f64>,
    period: Option<f64>,
    request_timeout: Option<f64>,
    provider: BTreeMap<String, String>,
}

impl ConfigLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in defaults, with every common option except `model` and
    /// `stop` populated.
    pub fn defaults() -> Self {
        Self {
            model: None,
            adapter: Some(DEFAULT_ADAPTER.to_owned()),
            temperature: Some(DEFAULT_TEMPERATURE),
            top_p: Some(DEFAULT_TOP_P),
            top_k: Some(DEFAULT_TOP_K),
            frequency_penalty: Some(DEFAULT_PENALTY),
            presence_penalty: Some(DEFAULT_PENALTY),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            best_of: Some(DEFAULT_BEST_OF),
            stop: None,
            retry: Some(DEFAULT_RETRY),
            concurrent: Some(DEFAULT_CONCURRENT),
            request_rate: Some(DEFAULT_REQUEST_RATE),
            token_rate: Some(DEFAULT_TOKEN_RATE),
            period: Some(DEFAULT_PERIOD),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            provider: BTreeMap::new(),
        }
    }

    // -- Typed setters -------------------------------------------------------

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    pub fn temperature(mut self, value: f64) -> ConfigResult<Self> {
        self.temperature = Some(clamp_float("temperature", value, 0.0, 2.0)?);
        Ok(self)
    }

    pub fn top_p(mut self, value: f64) -> ConfigResult<Self> {
        self.top_p = Some(clamp_float("top_p", value, 0.0, 1.0)?);
        Ok(self)
    }

    pub fn top_k(mut self, value: u64) -> Self {
        self.top_k = Some(value);
        self
    }

    pub fn frequency_penalty(mut self, value: f64) -> ConfigResult<Self> {
        self.frequency_penalty = Some(clamp_float("frequency_penalty", value, 0.0, 1.0)?);
        Ok(self)
    }

    pub fn presence_penalty(mut self, value: f64) -> ConfigResult<Self> {
        self.presence_penalty = Some(clamp_float("presence_penalty", value, 0.0, 1.0)?);
        Ok(self)
    }

    pub fn max_tokens(mut self, value: u64) -> Self {
        self.max_tokens = Some(value);
        self
    }

    pub fn best_of(mut self, value: u64) -> Self {
        self.best_of = Some(value.max(1));
        self
    }

    pub fn stop(mut self, sequences: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.stop = Some(sequences.into_iter().map(Into::into).collect());
        self
    }

    pub fn retry(mut self, value: u32) -> Self {
        self.retry = Some(value);
        self
    }

    pub fn concurrent(mut self, value: u32) -> Self {
        self.concurrent = Some(value.max(1));
        self
    }

    /// Requests per period; `0` disables the request bucket.
    pub fn request_rate(mut self, value: f64) -> ConfigResult<Self> {
        self.request_rate = Some(clamp_float("request_rate", value, 0.0, f64::INFINITY)?);
        Ok(self)
    }

    /// Tokens per period; `0` disables the token bucket.
    pub fn token_rate(mut self, value: f64) -> ConfigResult<Self> {
        self.token_rate = Some(clamp_float("token_rate", value, 0.0, f64::INFINITY)?);
        Ok(self)
    }

    /// Refill period in seconds.
    pub fn period(mut self, value: f64) -> ConfigResult<Self> {
        self.period = Some(clamp_float("period", value, MIN_PERIOD, f64::INFINITY)?);
        Ok(self)
    }

    /// Per-request deadline in seconds.
    pub fn request_timeout(mut self, value: f64) -> ConfigResult<Self> {
        self.request_timeout = Some(clamp_float("request_timeout", value, MIN_PERIOD, f64::INFINITY)?);
        Ok(self)
    }

    /// Set a provider-specific option such as `openai_api_key`.
    pub fn provider_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.provider.insert(key.into(), value.into());
        self
    }

    // -- Untyped assembly ----------------------------------------------------

    /// Parse and set one option from text (environment variables, CLI flags,
    /// configuration files).  Unknown keys become provider options.
    pub fn set(&mut self, key: &str, raw: &str) -> ConfigResult<()> {
        let raw = raw.trim();
        let layer = self.clone();
        *self = match key {
            "model" => layer.model(raw),
            "adapter" => layer.adapter(raw),
            "temperature" => layer.temperature(parse_float(key, raw)?)?,
            "top_p" => layer.top_p(parse_float(key, raw)?)?,
            "top_k" => layer.top_k(parse_count(key, raw)?),
            "frequency_penalty" => layer.frequency_penalty(parse_float(key, raw)?)?,
            "presence_penalty" => layer.presence_penalty(parse_float(key, raw)?)?,
            "max_tokens" => layer.max_tokens(parse_count(key, raw)?),
            "best_of" => layer.best_of(parse_count(key, raw)?),
            "stop" => layer.stop(parse_stop(key, raw)?),
            "retry" => layer.retry(saturate_u32(parse_count(key, raw)?)),
            "concurrent" => layer.concurrent(saturate_u32(parse_count(key, raw)?)),
            "request_rate" => layer.request_rate(parse_float(key, raw)?)?,
            "token_rate" => layer.token_rate(parse_float(key, raw)?)?,
            "period" => layer.period(parse_float(key, raw)?)?,
            "request_timeout" => layer.request_timeout(parse_float(key, raw)?)?,
            other => layer.provider_option(other, raw),
        };
        Ok(())
    }

    /// Parse a TOML document of `key = value` pairs into a layer.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let table: toml::Table = text.parse().map_err(|e: toml::de::Error| ConfigError::File {
            path: "<toml>".into(),
            reason: e.message().to_owned(),
        })?;

        let mut layer = Self::new();
        for (key, value) in &table {
            let raw = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Array(_) => serde_json::to_string(value).map_err(|e| {
                    ConfigError::InvalidValue {
                        key: key.clone(),
                        value: value.to_string(),
                        reason: e.to_string(),
                    }
                })?,
                other => other.to_string(),
            };
            layer.set(key, &raw)?;
        }
        Ok(layer)
    }

    /// Returns `true` if no option is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// All options set in this layer, rendered as text.
    pub fn entries(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                out.insert(key.to_owned(), v);
            }
        };
        put("model", self.model.clone());
        put("adapter", self.adapter.clone());
        put("temperature", self.temperature.map(|v| v.to_string()));
        put("top_p", self.top_p.map(|v| v.to_string()));
        put("top_k", self.top_k.map(|v| v.to_string()));
        put("frequency_penalty", self.frequency_penalty.map(|v| v.to_string()));
        put("presence_penalty", self.presence_penalty.map(|v| v.to_string()));
        put("max_tokens", self.max_tokens.map(|v| v.to_string()));
        put("best_of", self.best_of.map(|v| v.to_string()));
        put("stop", self.stop.as_ref().map(|v| Value::from(v.clone()).to_string()));
        put("retry", self.retry.map(|v| v.to_string()));
        put("concurrent", self.concurrent.map(|v| v.to_string()));
        put("request_rate", self.request_rate.map(|v| v.to_string()));
        put("token_rate", self.token_rate.map(|v| v.to_string()));
        put("period", self.period.map(|v| v.to_string()));
        put("request_timeout", self.request_timeout.map(|v| v.to_string()));
        for (key, value) in &self.provider {
            out.insert(key.clone(), value.clone());
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// An ordered stack of [`ConfigLayer`]s; later layers shadow earlier ones.
///
/// Cloning is cheap: layers are shared.
#[derive(Debug, Clone)]
pub struct Config {
    layers: Vec<Arc<ConfigLayer>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(ConfigLayer::defaults())
    }
}

impl Config {
    /// A stack with `base` as its bottom layer.
    pub fn new(base: ConfigLayer) -> Self {
        Self {
            layers: vec![Arc::new(base)],
        }
    }

    /// Return a new stack with `layer` on top.  Empty layers are skipped.
    pub fn with_layer(&self, layer: ConfigLayer) -> Self {
        let mut layers = self.layers.clone();
        if !layer.is_empty() {
            layers.push(Arc::new(layer));
        }
        Self { layers }
    }

    /// Number of layers in the stack.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    fn pick<T>(&self, f: impl Fn(&ConfigLayer) -> Option<T>) -> Option<T> {
        self.layers.iter().rev().find_map(|layer| f(layer))
    }

    pub fn model(&self) -> Option<String> {
        self.pick(|l| l.model.clone())
    }

    pub fn adapter(&self) -> String {
        self.pick(|l| l.adapter.clone())
            .unwrap_or_else(|| DEFAULT_ADAPTER.to_owned())
    }

    pub fn temperature(&self) -> f64 {
        self.pick(|l| l.temperature).unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn top_p(&self) -> f64 {
        self.pick(|l| l.top_p).unwrap_or(DEFAULT_TOP_P)
    }

    pub fn top_k(&self) -> u64 {
        self.pick(|l| l.top_k).unwrap_or(DEFAULT_TOP_K)
    }

    pub fn frequency_penalty(&self) -> f64 {
        self.pick(|l| l.frequency_penalty).unwrap_or(DEFAULT_PENALTY)
    }

    pub fn presence_penalty(&self) -> f64 {
        self.pick(|l| l.presence_penalty).unwrap_or(DEFAULT_PENALTY)
    }

    pub fn max_tokens(&self) -> u64 {
        self.pick(|l| l.max_tokens).unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn best_of(&self) -> u64 {
        self.pick(|l| l.best_of).unwrap_or(DEFAULT_BEST_OF)
    }

    pub fn stop(&self) -> Option<Vec<String>> {
        self.pick(|l| l.stop.clone())
    }

    pub fn retry(&self) -> u32 {
        self.pick(|l| l.retry).unwrap_or(DEFAULT_RETRY)
    }

    pub fn concurrent(&self) -> u32 {
        self.pick(|l| l.concurrent).unwrap_or(DEFAULT_CONCURRENT)
    }

    pub fn request_rate(&self) -> f64 {
        self.pick(|l| l.request_rate).unwrap_or(DEFAULT_REQUEST_RATE)
    }

    pub fn token_rate(&self) -> f64 {
        self.pick(|l| l.token_rate).unwrap_or(DEFAULT_TOKEN_RATE)
    }

    pub fn period(&self) -> f64 {
        self.pick(|l| l.period).unwrap_or(DEFAULT_PERIOD)
    }

    pub fn request_timeout(&self) -> f64 {
        self.pick(|l| l.request_timeout).unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// A provider-specific option, such as a credential or base URL.
    pub fn get(&self, key: &str) -> Option<String> {
        self.pick(|l| l.provider.get(key).cloned())
            .filter(|v| !v.is_empty())
    }

    /// Returns `true` if any known provider credential is set.
    pub fn has_credential(&self) -> bool {
        CREDENTIAL_KEYS.iter().any(|key| self.get(key).is_some())
    }

    /// The merged view of every option, with secrets masked.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for layer in &self.layers {
            merged.extend(layer.entries());
        }
        for (key, value) in merged.iter_mut() {
            if is_secret(key) {
                *value = mask(value);
            }
        }
        merged
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn clamp_float(key: &str, value: f64, lo: f64, hi: f64) -> ConfigResult<f64> {
    if value.is_nan() {
        return Err(invalid(key, value, "not a number"));
    }
    Ok(value.clamp(lo, hi))
}

fn parse_float(key: &str, raw: &str) -> ConfigResult<f64> {
    raw.parse::<f64>()
        .map_err(|_| invalid(key, raw, "expected a number"))
}

/// Parse a non-negative count; negative input clamps to zero and fractional
/// input truncates toward zero.
fn parse_count(key: &str, raw: &str) -> ConfigResult<u64> {
    if let Ok(v) = raw.parse::<u64>() {
        return Ok(v);
    }
    let value = parse_float(key, raw)?;
    if value.is_nan() {
        return Err(invalid(key, raw, "not a number"));
    }
    Ok(value.max(0.0).min(u64::MAX as f64) as u64)
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// `stop` is either a JSON array of strings or a single sequence.
fn parse_stop(key: &str, raw: &str) -> ConfigResult<Vec<String>> {
    if raw.starts_with('[') {
        return serde_json::from_str(raw).map_err(|e| invalid(key, raw, e.to_string()));
    }
    Ok(vec![raw.to_owned()])
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    if secret.chars().count() <= 8 {
        "****".to_owned()
    } else {
        format!("****{visible}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
