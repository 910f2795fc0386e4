//! Bound semantic functions.
//!
//! A [`SemanticFn`] pairs an operation with an adapter, a configuration and
//! the connectors to dispatch through.  Each call binds its arguments,
//! resolves a connector, and drives a
//! [`Negotiation`](servitor_adapter::Negotiation) until it yields a value or
//! exhausts its retry budget.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use servitor_adapter::{Adapter, Attempt, Negotiation, Next};
use servitor_connect::{Config, ConnectorRegistry};
use servitor_schema::{Arguments, Operation, Task};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{KernelError, Result};

/// The outcome of one call: the decoded value and the attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: Value,
    pub attempts: Vec<Attempt>,
}

impl Resolution {
    /// Deserialize the value into `T`.
    pub fn into_typed<T: DeserializeOwned>(self, operation: &str) -> Result<T> {
        serde_json::from_value(self.value).map_err(|e| KernelError::Convert {
            operation: operation.to_owned(),
            reason: e.to_string(),
        })
    }
}

/// An operation ready to be called.
#[derive(Clone)]
pub struct SemanticFn {
    operation: Arc<Operation>,
    adapter: Arc<dyn Adapter>,
    config: Config,
    connectors: ConnectorRegistry,
}

impl SemanticFn {
    pub(crate) fn new(
        operation: Arc<Operation>,
        adapter: Arc<dyn Adapter>,
        config: Config,
        connectors: ConnectorRegistry,
    ) -> Self {
        Self {
            operation,
            adapter,
            config,
            connectors,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    /// Call the operation.
    pub async fn call(&self, args: impl Into<Arguments>) -> Result<Resolution> {
        let call_id = Uuid::now_v7();
        let span = tracing::info_span!(
            "semantic_call",
            %call_id,
            operation = self.operation.name(),
            adapter = self.adapter.name(),
        );
        self.negotiate(args.into()).instrument(span).await
    }

    /// Call the operation and deserialize its value into `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, args: impl Into<Arguments>) -> Result<T> {
        self.call(args).await?.into_typed(self.operation.name())
    }

    /// Call the operation from synchronous code.
    ///
    /// The call runs on a private current-thread runtime, so it must not be
    /// made from inside an async context; use [`call`](Self::call) there.
    pub fn call_blocking(&self, args: impl Into<Arguments>) -> Result<Resolution> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(KernelError::Runtime {
                reason: "call_blocking was used inside an async runtime; use call().await".into(),
            });
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| KernelError::Runtime {
                reason: e.to_string(),
            })?;
        runtime.block_on(self.call(args))
    }

    /// [`call_blocking`](Self::call_blocking) followed by deserialization
    /// into `T`.
    pub fn call_as_blocking<T: DeserializeOwned>(&self, args: impl Into<Arguments>) -> Result<T> {
        self.call_blocking(args)?
            .into_typed(self.operation.name())
    }

    async fn negotiate(&self, args: Arguments) -> Result<Resolution> {
        let task = Task::bind(Arc::clone(&self.operation), args)?;
        let connector = self.connectors.find(&self.config).await?;
        tracing::debug!(connector = connector.name(), "resolved connector");

        let mut negotiation =
            Negotiation::new(Arc::clone(&self.adapter), task, self.config.retry());
        let mut next = negotiation.begin()?;
        loop {
            match next {
                Next::Prompt(prompt) => {
                    let completion = connector.complete(&prompt, &self.config)?;
                    let response = completion.text().await?;
                    next = negotiation.resume(response)?;
                }
                Next::Done(value) => {
                    let attempts = negotiation.into_attempts();
                    tracing::info!(attempts = attempts.len(), "call resolved");
                    return Ok(Resolution { value, attempts });
                }
            }
        }
    }
}

impl fmt::Debug for SemanticFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticFn")
            .field("operation", &self.operation)
            .field("adapter", &self.adapter.name())
            .field("model", &self.config.model())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use servitor_connect::{ConfigLayer, StubConnector};
    use servitor_schema::{DeclaredType, Param};

    use super::*;
    use crate::Kernel;

    fn echo_kernel(responses: &[&str]) -> (Kernel, Arc<StubConnector>) {
        let stub = Arc::new(StubConnector::new("stub", responses.to_vec()).catch_all());
        let mut registry = ConnectorRegistry::new();
        registry.register_shared(stub.clone());
        let kernel = Kernel::builder().connectors(registry).build().unwrap();
        (kernel, stub)
    }

    fn count() -> Operation {
        Operation::new("count_words")
            .doc("Count the words in the text.")
            .param(Param::new("text", DeclaredType::string()))
            .returns(DeclaredType::integer())
    }

    #[tokio::test]
    async fn call_as_deserializes() {
        let (kernel, stub) = echo_kernel(&["4"]);
        let f = kernel.bind(count()).unwrap();
        let n: u32 = f.call_as(vec![json!("one two three four")]).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(stub.prompts().len(), 1);
    }

    #[tokio::test]
    async fn conversion_failure_is_reported() {
        let (kernel, _) = echo_kernel(&["4"]);
        let f = kernel.bind(count()).unwrap();
        let err = f
            .call_as::<String>(vec![json!("one two three four")])
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::Convert { .. }));
    }

    #[tokio::test]
    async fn binding_errors_precede_dispatch() {
        let (kernel, stub) = echo_kernel(&["4"]);
        let f = kernel.bind(count()).unwrap();
        let err = f.call(Arguments::new()).await.unwrap_err();
        assert!(matches!(err, KernelError::Schema(_)));
        assert!(stub.prompts().is_empty());
    }

    #[tokio::test]
    async fn blocking_call_inside_runtime_is_refused() {
        let (kernel, _) = echo_kernel(&["4"]);
        let f = kernel.bind(count()).unwrap();
        let err = f.call_blocking(vec![json!("a b")]).unwrap_err();
        assert!(matches!(err, KernelError::Runtime { .. }));
    }

    #[test]
    fn blocking_call() {
        let (kernel, _) = echo_kernel(&["2"]);
        let f = kernel
            .bind_with(count(), ConfigLayer::new().retry(0), None)
            .unwrap();
        let n: i64 = f.call_as_blocking(vec![json!("a b")]).unwrap();
        assert_eq!(n, 2);
    }
}
