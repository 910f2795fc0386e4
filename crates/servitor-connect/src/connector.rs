//! The connector seam and its registry.
//!
//! A [`Connector`] decides whether it can serve a [`Config`] and turns a
//! prompt into a lazy [`Completion`].  The [`ConnectorRegistry`] asks each
//! registered connector in registration order; the first that supports the
//! configuration wins.
//!
//! # Example
//!
//! ```rust
//! # use servitor_connect::{Config, ConfigLayer, ConnectorRegistry, StubConnector};
//! # tokio_test_block_on(async {
//! let mut registry = ConnectorRegistry::new();
//! registry.register(StubConnector::new("stub", ["Friday"]));
//!
//! let config = Config::default().with_layer(ConfigLayer::new().model("stub"));
//! let completion = registry.complete("What day is it?", &config).await.unwrap();
//! assert_eq!(completion.text().await.unwrap(), "Friday");
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::completion::Completion;
use crate::config::Config;
use crate::error::{ConnectorError, Result};

/// A provider integration.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Registry name, such as `openai`.
    fn name(&self) -> &str;

    /// Whether this connector can serve `config`.  May perform one-time
    /// lazy initialization, which must tolerate concurrent callers.
    async fn supports(&self, config: &Config) -> bool;

    /// Prepare a completion of `prompt`.  No request is issued until the
    /// returned [`Completion`] is consumed.
    fn complete(&self, prompt: &str, config: &Config) -> Result<Completion>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered set of connectors.  Cloning shares the connectors.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connector after those already registered.
    pub fn register(&mut self, connector: impl Connector + 'static) {
        self.register_shared(Arc::new(connector));
    }

    /// Add an already shared connector.
    pub fn register_shared(&mut self, connector: Arc<dyn Connector>) {
        tracing::info!(connector = connector.name(), "registered connector");
        self.connectors.push(connector);
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.connectors.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// The first connector supporting `config`.
    pub async fn find(&self, config: &Config) -> Result<Arc<dyn Connector>> {
        for connector in &self.connectors {
            if connector.supports(config).await {
                tracing::debug!(connector = connector.name(), "resolved connector");
                return Ok(Arc::clone(connector));
            }
        }
        Err(ConnectorError::NotFound {
            model: config.model().unwrap_or_else(|| "<unset>".to_owned()),
        })
    }

    /// Resolve a connector and prepare a completion through it.
    pub async fn complete(&self, prompt: &str, config: &Config) -> Result<Completion> {
        self.find(config).await?.complete(prompt, config)
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Stub connector
// ---------------------------------------------------------------------------

/// An in-process connector that replays scripted responses.
///
/// It supports configurations whose model equals its name, or any
/// configuration when constructed with [`StubConnector::catch_all`].  Every
/// prompt it receives is recorded.
#[derive(Debug)]
pub struct StubConnector {
    name: String,
    catch_all: bool,
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl StubConnector {
    pub fn new(name: impl Into<String>, responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            catch_all: false,
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Support every configuration.
    pub fn catch_all(mut self) -> Self {
        self.catch_all = true;
        self
    }

    /// Queue a failure after the scripted responses.
    pub fn then_fail(self, error: ConnectorError) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Connector for StubConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn supports(&self, config: &Config) -> bool {
        self.catch_all || config.model().as_deref() == Some(self.name.as_str())
    }

    fn complete(&self, prompt: &str, _config: &Config) -> Result<Completion> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_owned());
        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(ConnectorError::RequestFailed {
                    reason: format!("stub `{}` has no scripted response left", self.name),
                })
            });
        Ok(match next {
            Ok(text) => Completion::ready(text),
            Err(err) => Completion::failed(err),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
