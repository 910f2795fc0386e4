//! Self-hosted OpenAI-compatible servers.
//!
//! The connector is inert until `local_base_url` is configured.  Each base
//! URL's model catalog is fetched from `GET {local_base_url}/models` the
//! first time it is needed and then kept for the life of the connector.
//! Pointing `local_base_url` at another server fetches that server's
//! catalog.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::OnceCell;

use super::openai::ChatWire;
use super::{HttpCompletion, check_status, http_client, request_cost, request_timeout};
use crate::completion::Completion;
use crate::config::Config;
use crate::connector::Connector;
use crate::error::{ConnectorError, Result};
use crate::throttle::{ThrottleLimits, ThrottleRegistry};

pub const BASE_URL_KEY: &str = "local_base_url";
pub const CREDENTIAL_KEY: &str = "local_api_key";

const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Connector for a local inference server.
#[derive(Debug)]
pub struct LocalConnector {
    http: reqwest::Client,
    throttles: Arc<ThrottleRegistry>,
    catalogs: DashMap<String, Arc<OnceCell<Vec<String>>>>,
    fixed: Option<Vec<String>>,
}

impl LocalConnector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            throttles: Arc::new(ThrottleRegistry::new()),
            catalogs: DashMap::new(),
            fixed: None,
        })
    }

    /// A connector with one fixed catalog for every base URL; nothing is
    /// fetched.
    pub fn with_catalog(models: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        Ok(Self {
            fixed: Some(models.into_iter().map(Into::into).collect()),
            ..Self::new()?
        })
    }

    /// The model names served at `base_url`, fetched once per URL.  A
    /// failed fetch leaves that URL with an empty catalog.
    pub async fn catalog(&self, base_url: &str) -> Vec<String> {
        if let Some(models) = &self.fixed {
            return models.clone();
        }
        let cell = Arc::clone(
            self.catalogs
                .entry(catalog_key(base_url))
                .or_default()
                .value(),
        );
        let models = cell
            .get_or_init(|| async {
                match self.fetch_catalog(base_url).await {
                    Ok(models) => {
                        tracing::info!(base_url, count = models.len(), "local model catalog loaded");
                        models
                    }
                    Err(e) => {
                        tracing::warn!(base_url, error = %e, "failed to load local model catalog");
                        Vec::new()
                    }
                }
            })
            .await;
        models.clone()
    }

    /// The first model of an already loaded catalog.
    fn cached_default(&self, base_url: &str) -> Option<String> {
        if let Some(models) = &self.fixed {
            return models.first().cloned();
        }
        let cell = self.catalogs.get(&catalog_key(base_url))?;
        cell.get().and_then(|models| models.first().cloned())
    }

    async fn fetch_catalog(&self, base_url: &str) -> Result<Vec<String>> {
        let url = format!("{}/models", base_url.trim_end_matches('/'));
        let resp = self.http.get(&url).timeout(CATALOG_TIMEOUT).send().await?;
        let resp = check_status("local", resp).await?;
        let body: Value = resp.json().await.map_err(|e| ConnectorError::ResponseParse {
            reason: format!("invalid model catalog: {e}"),
        })?;
        Ok(parse_catalog(&body))
    }

    async fn resolve_model(&self, config: &Config) -> Option<String> {
        let base_url = config.get(BASE_URL_KEY)?;
        let catalog = self.catalog(&base_url).await;
        match config.model() {
            Some(model) => catalog.contains(&model).then_some(model),
            None => catalog.first().cloned(),
        }
    }
}

fn catalog_key(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_owned()
}

/// Model ids listed in a `/models` response.
pub fn parse_catalog(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m["id"].as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Connector for LocalConnector {
    fn name(&self) -> &str {
        "local"
    }

    async fn supports(&self, config: &Config) -> bool {
        self.resolve_model(config).await.is_some()
    }

    fn complete(&self, prompt: &str, config: &Config) -> Result<Completion> {
        let base_url = config.get(BASE_URL_KEY).ok_or_else(|| ConnectorError::MissingCredential {
            provider: "local".into(),
            key: BASE_URL_KEY.into(),
        })?;
        let model = match config.model() {
            Some(model) => model,
            None => self
                .cached_default(&base_url)
                .ok_or_else(|| ConnectorError::NotFound {
                    model: "<unset>".into(),
                })?,
        };
        let api_key = config.get(CREDENTIAL_KEY);

        let throttle = self.throttles.get_or_create(
            api_key.as_deref().unwrap_or(&base_url),
            ThrottleLimits::from_config(config),
        );
        let wire = ChatWire::new("local", &base_url, api_key, &model, prompt, config);

        Ok(Completion::new(HttpCompletion::new(
            self.http.clone(),
            throttle,
            request_cost(prompt, config),
            request_timeout(config),
            wire,
        )))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::ConfigLayer;

    fn local(layer: ConfigLayer) -> Config {
        Config::default().with_layer(layer.provider_option(BASE_URL_KEY, "http://127.0.0.1:1/v1"))
    }

    #[test]
    fn catalog_ids() {
        let body = json!({"object": "list", "data": [{"id": "llama-3-8b"}, {"id": "mistral-7b"}, {"object": "model"}]});
        assert_eq!(parse_catalog(&body), vec!["llama-3-8b", "mistral-7b"]);
        assert!(parse_catalog(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn inert_without_base_url() {
        let connector = LocalConnector::with_catalog(["llama-3-8b"]).unwrap();
        let cfg = Config::default().with_layer(ConfigLayer::new().model("llama-3-8b"));
        assert!(!connector.supports(&cfg).await);
    }

    #[tokio::test]
    async fn supports_catalog_models() {
        let connector = LocalConnector::with_catalog(["llama-3-8b", "mistral-7b"]).unwrap();
        assert!(connector.supports(&local(ConfigLayer::new().model("mistral-7b"))).await);
        assert!(!connector.supports(&local(ConfigLayer::new().model("gpt-4o"))).await);
        // No model: the first served model is used.
        assert!(connector.supports(&local(ConfigLayer::new())).await);
    }

    #[tokio::test]
    async fn empty_catalog_supports_nothing() {
        let connector = LocalConnector::with_catalog(Vec::<String>::new()).unwrap();
        assert!(!connector.supports(&local(ConfigLayer::new())).await);
    }

    #[tokio::test]
    async fn catalogs_are_kept_per_base_url() {
        let connector = LocalConnector::new().unwrap();
        for (url, model) in [("http://gpu-a/v1", "llama-3-8b"), ("http://gpu-b/v1", "mistral-7b")] {
            connector.catalogs.insert(
                catalog_key(url),
                Arc::new(OnceCell::new_with(Some(vec![model.to_owned()]))),
            );
        }
        let at = |url: &str, model: &str| {
            Config::default().with_layer(
                ConfigLayer::new()
                    .model(model)
                    .provider_option(BASE_URL_KEY, url),
            )
        };

        assert!(connector.supports(&at("http://gpu-a/v1", "llama-3-8b")).await);
        assert!(!connector.supports(&at("http://gpu-a/v1", "mistral-7b")).await);
        assert!(connector.supports(&at("http://gpu-b/v1/", "mistral-7b")).await);
        assert_eq!(
            connector.cached_default("http://gpu-b/v1").as_deref(),
            Some("mistral-7b")
        );
    }

    #[test]
    fn complete_is_lazy() {
        let connector = LocalConnector::with_catalog(["llama-3-8b"]).unwrap();
        let completion = connector.complete("hi", &local(ConfigLayer::new()));
        assert!(completion.is_ok());
    }
}
