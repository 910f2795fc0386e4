//! Adapter lookup by name.
//!
//! # Example
//!
//! ```rust
//! # use servitor_adapter::AdapterRegistry;
//! let registry = AdapterRegistry::with_defaults().unwrap();
//! assert_eq!(registry.get("type").unwrap().name(), "type");
//! assert_eq!(registry.get("cot").unwrap().name(), "chain");
//! assert!(registry.get("poetry").is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::{Adapter, PlainAdapter, TaskAdapter, TypeAdapter};
use crate::chain::ChainAdapter;
use crate::error::{AdapterError, Result};

/// Name to adapter mapping, fixed once built.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `task`, `plain`, `type` and `chain` (also
    /// reachable as `cot`).
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(TaskAdapter);
        registry.register(PlainAdapter);
        registry.register(TypeAdapter::new()?);
        let chain: Arc<dyn Adapter> = Arc::new(ChainAdapter::new()?);
        registry.register_as("chain", Arc::clone(&chain));
        registry.register_as("cot", chain);
        Ok(registry)
    }

    /// Register an adapter under its own name, replacing any previous one.
    pub fn register(&mut self, adapter: impl Adapter + 'static) {
        let name = adapter.name().to_owned();
        self.register_as(name, Arc::new(adapter));
    }

    /// Register an adapter under an explicit name.
    pub fn register_as(&mut self, name: impl Into<String>, adapter: Arc<dyn Adapter>) {
        let name = name.into();
        tracing::debug!(name = %name, adapter = adapter.name(), "adapter registered");
        self.adapters.insert(name, adapter);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Adapter>> {
        self.adapters
            .get(name)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound {
                name: name.to_owned(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}
