//! The kernel: configuration, connectors and adapters assembled once.
//!
//! A [`Kernel`] is built explicitly, either from the environment with
//! [`Kernel::from_env`] or piece by piece with [`KernelBuilder`].  It holds no
//! global state; binding an operation produces a self-contained
//! [`SemanticFn`].

use std::path::Path;
use std::sync::Arc;

use servitor_adapter::AdapterRegistry;
use servitor_connect::{
    Completion, Config, ConfigError, ConfigLayer, ConnectorRegistry, default_registry,
};
use servitor_schema::Operation;

use crate::env;
use crate::error::Result;
use crate::function::SemanticFn;

/// Assembled configuration, connectors and adapters.
#[derive(Debug, Clone)]
pub struct Kernel {
    config: Config,
    connectors: ConnectorRegistry,
    adapters: AdapterRegistry,
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::default()
    }

    /// Build a kernel from `.env`, the `SERVITOR_*` environment and the
    /// default providers.
    ///
    /// Fails with [`ConfigError::MissingCredential`] when neither a model
    /// nor any provider credential is configured.
    pub fn from_env() -> Result<Self> {
        env::load_dotenv();
        Self::builder().env()?.require_credential().build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// A raw completion of `prompt` under the kernel configuration plus
    /// `overrides`.  No adapter is involved.
    pub async fn complete(&self, prompt: &str, overrides: ConfigLayer) -> Result<Completion> {
        let config = self.config.with_layer(overrides);
        tracing::debug!(model = ?config.model(), "raw completion");
        Ok(self.connectors.complete(prompt, &config).await?)
    }

    /// Bind `operation` with the kernel configuration and its adapter.
    pub fn bind(&self, operation: Operation) -> Result<SemanticFn> {
        self.bind_with(operation, ConfigLayer::new(), None)
    }

    /// Bind `operation` with call-site overrides and, optionally, an adapter
    /// other than the configured one.
    pub fn bind_with(
        &self,
        operation: Operation,
        overrides: ConfigLayer,
        adapter: Option<&str>,
    ) -> Result<SemanticFn> {
        let config = self.config.with_layer(overrides);
        let name = adapter.map_or_else(|| config.adapter(), str::to_owned);
        let adapter = self.adapters.get(&name)?;
        tracing::debug!(operation = operation.name(), adapter = %name, "bound operation");
        Ok(SemanticFn::new(
            Arc::new(operation),
            adapter,
            config,
            self.connectors.clone(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Step-by-step [`Kernel`] construction.
///
/// Layers stack in the order they are added, on top of the built-in
/// defaults.
#[derive(Debug, Default)]
pub struct KernelBuilder {
    layers: Vec<ConfigLayer>,
    connectors: Option<ConnectorRegistry>,
    adapters: Option<AdapterRegistry>,
    require_credential: bool,
}

impl KernelBuilder {
    /// Stack a configuration layer.
    pub fn layer(mut self, layer: ConfigLayer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Stack a layer read from a TOML file.
    pub fn config_file(self, path: &Path) -> Result<Self> {
        let layer = env::layer_from_file(path)?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(self.layer(layer))
    }

    /// Stack a layer read from the process environment.
    pub fn env(self) -> Result<Self> {
        Ok(self.layer(env::layer_from_env()?))
    }

    /// Use these connectors instead of the default providers.
    pub fn connectors(mut self, connectors: ConnectorRegistry) -> Self {
        self.connectors = Some(connectors);
        self
    }

    /// Use these adapters instead of the built-in set.
    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Fail at build time unless a model or a credential is configured.
    pub fn require_credential(mut self) -> Self {
        self.require_credential = true;
        self
    }

    pub fn build(self) -> Result<Kernel> {
        let config = self
            .layers
            .into_iter()
            .fold(Config::default(), |config, layer| config.with_layer(layer));

        if self.require_credential && config.model().is_none() && !config.has_credential() {
            return Err(ConfigError::MissingCredential {
                reason: "set SERVITOR_MODEL or a provider key such as OPENAI_API_KEY".into(),
            }
            .into());
        }

        let connectors = match self.connectors {
            Some(connectors) => connectors,
            None => default_registry()?,
        };
        let adapters = match self.adapters {
            Some(adapters) => adapters,
            None => AdapterRegistry::with_defaults()?,
        };

        tracing::debug!(
            layers = config.depth(),
            connectors = ?connectors.names(),
            adapter = %config.adapter(),
            "kernel ready"
        );
        Ok(Kernel {
            config,
            connectors,
            adapters,
        })
    }
}
