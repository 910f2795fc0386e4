//! Integration tests for the servitor-kernel crate.
//!
//! Full calls against in-process stub connectors: binding, dispatch,
//! negotiation and typed results.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde::Deserialize;
use serde_json::json;
use servitor_adapter::ChainOfThought;
use servitor_connect::{
    Completion, CompletionSource, Config, ConfigLayer, Connector, ConnectorError,
    ConnectorRegistry, FragmentStream, Lease, StubConnector, Throttle, ThrottleLimits,
};
use servitor_kernel::{Kernel, KernelError};
use servitor_schema::{DeclaredType, Operation, Param, Record};

fn list_people() -> Operation {
    Operation::new("list_people")
        .doc("List the people mentioned in the text.")
        .param(Param::new("text", DeclaredType::string()))
        .returns(DeclaredType::list(DeclaredType::string()))
}

fn kernel_with(stub: Arc<StubConnector>) -> Kernel {
    let mut registry = ConnectorRegistry::new();
    registry.register_shared(stub);
    Kernel::builder()
        .layer(ConfigLayer::new().model("stub"))
        .connectors(registry)
        .build()
        .unwrap()
}

const STORE: &str = "John and Mary went to the store.";

// ═══════════════════════════════════════════════════════════════════════
//  list_people scenarios
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn well_formed_response_resolves_in_one_attempt() {
    let stub = Arc::new(StubConnector::new("stub", [r#"["John","Mary"]"#]));
    let kernel = kernel_with(stub.clone());

    let resolution = kernel
        .bind(list_people())
        .unwrap()
        .call(vec![json!(STORE)])
        .await
        .unwrap();

    assert_eq!(resolution.value, json!(["John", "Mary"]));
    assert_eq!(resolution.attempts.len(), 1);
    assert_eq!(stub.prompts().len(), 1);
    assert!(stub.prompts()[0].contains(STORE));
}

#[tokio::test]
async fn malformed_then_well_formed_resolves_in_two_attempts() {
    let stub = Arc::new(StubConnector::new("stub", ["John, Mary", r#"["John","Mary"]"#]));
    let kernel = kernel_with(stub.clone());

    let resolution = kernel
        .bind(list_people())
        .unwrap()
        .call(vec![json!(STORE)])
        .await
        .unwrap();

    assert_eq!(resolution.value, json!(["John", "Mary"]));
    assert_eq!(resolution.attempts.len(), 2);
    let prompts = stub.prompts();
    assert!(prompts[1].contains("John, Mary"));
    assert!(prompts[1].contains("Fix all parsing mistakes above:"));
}

#[tokio::test]
async fn exhausted_budget_carries_history() {
    let stub = Arc::new(StubConnector::new("stub", ["John, Mary"; 3]));
    let kernel = kernel_with(stub.clone());

    let err = kernel
        .bind_with(list_people(), ConfigLayer::new().retry(2), None)
        .unwrap()
        .call(vec![json!(STORE)])
        .await
        .unwrap_err();

    let parse = err.parse_error().unwrap();
    assert_eq!(parse.attempts.len(), 3);
    assert_eq!(parse.operation, "list_people");
    assert_eq!(stub.prompts().len(), 3);
}

#[tokio::test]
async fn typed_result() {
    let stub = Arc::new(StubConnector::new("stub", ["return [John, Mary]"]));
    let kernel = kernel_with(stub);
    let people: Vec<String> = kernel
        .bind(list_people())
        .unwrap()
        .call_as(vec![json!(STORE)])
        .await
        .unwrap();
    assert_eq!(people, vec!["John", "Mary"]);
}

// ═══════════════════════════════════════════════════════════════════════
//  chain adapter
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize, PartialEq)]
struct Verdict {
    thoughts: Vec<String>,
    answer: String,
}

#[tokio::test]
async fn chain_without_marker_requests_correction() {
    let op = Operation::new("judge")
        .doc("Decide whether the statement is true.")
        .param(Param::new("statement", DeclaredType::string()))
        .returns(DeclaredType::Record(
            Record::new()
                .field("thoughts", DeclaredType::list(DeclaredType::string()))
                .field("answer", DeclaredType::string()),
        ));
    let stub = Arc::new(StubConnector::new(
        "stub",
        [
            "The sky is blue on clear days.\nSo it is true.",
            "The sky is blue on clear days.\nreturn({thoughts: [\"clear days\"], answer: \"true\"})",
        ],
    ));
    let kernel = kernel_with(stub.clone());

    let resolution = kernel
        .bind_with(op, ConfigLayer::new(), Some("chain"))
        .unwrap()
        .call(vec![json!("The sky is blue.")])
        .await
        .unwrap();

    assert_eq!(resolution.attempts.len(), 2);
    assert!(
        resolution.attempts[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("return(answer)"))
    );
    let chain: ChainOfThought<Verdict> = serde_json::from_value(resolution.value).unwrap();
    assert_eq!(chain.thoughts, vec!["The sky is blue on clear days."]);
    assert_eq!(chain.answer.thoughts, vec!["clear days"]);
    assert_eq!(chain.answer.answer, "true");
}

// ═══════════════════════════════════════════════════════════════════════
//  Dispatch and configuration
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connector_is_resolved_per_call_from_merged_config() {
    let fast = Arc::new(StubConnector::new("fast", ["[\"Ann\"]"]));
    let slow = Arc::new(StubConnector::new("slow", ["[\"Bob\"]"]));
    let mut registry = ConnectorRegistry::new();
    registry.register_shared(fast.clone());
    registry.register_shared(slow.clone());
    let kernel = Kernel::builder()
        .layer(ConfigLayer::new().model("fast"))
        .connectors(registry)
        .build()
        .unwrap();

    let value = kernel
        .bind_with(list_people(), ConfigLayer::new().model("slow"), None)
        .unwrap()
        .call(vec![json!("Bob left.")])
        .await
        .unwrap()
        .value;
    assert_eq!(value, json!(["Bob"]));
    assert!(fast.prompts().is_empty());
    assert_eq!(slow.prompts().len(), 1);
}

#[tokio::test]
async fn unknown_model_is_not_found() {
    let stub = Arc::new(StubConnector::new("stub", ["[]"]));
    let kernel = kernel_with(stub);
    let err = kernel
        .bind_with(list_people(), ConfigLayer::new().model("gpt-17"), None)
        .unwrap()
        .call(vec![json!(STORE)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KernelError::Connector(ConnectorError::NotFound { .. })
    ));
}

#[tokio::test]
async fn transport_errors_are_not_retried() {
    let stub = Arc::new(
        StubConnector::new("stub", Vec::<String>::new()).then_fail(ConnectorError::Throttled {
            provider: "stub".into(),
            reason: "429".into(),
        }),
    );
    let kernel = kernel_with(stub.clone());
    let err = kernel
        .bind(list_people())
        .unwrap()
        .call(vec![json!(STORE)])
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(stub.prompts().len(), 1);
}

#[test]
fn file_layer_sits_under_explicit_layers() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "model = \"stub\"\nretry = 7\ntemperature = 0.3").unwrap();

    let mut registry = ConnectorRegistry::new();
    registry.register(StubConnector::new("stub", ["[]"]));
    let kernel = Kernel::builder()
        .config_file(file.path())
        .unwrap()
        .layer(ConfigLayer::new().retry(1))
        .connectors(registry)
        .require_credential()
        .build()
        .unwrap();

    assert_eq!(kernel.config().retry(), 1);
    assert_eq!(kernel.config().temperature(), 0.3);
    assert_eq!(kernel.config().model().as_deref(), Some("stub"));
}

#[test]
fn blocking_call_from_sync_code() {
    let stub = Arc::new(StubConnector::new("stub", [r#"["John","Mary"]"#]));
    let kernel = kernel_with(stub);
    let resolution = kernel
        .bind(list_people())
        .unwrap()
        .call_blocking(vec![json!(STORE)])
        .unwrap();
    assert_eq!(resolution.value, json!(["John", "Mary"]));
}

// ═══════════════════════════════════════════════════════════════════════
//  Cancellation
// ═══════════════════════════════════════════════════════════════════════

/// A connector whose requests take a throttle slot and never finish.
struct Hanging {
    throttle: Arc<Throttle>,
}

struct HangingRequest {
    throttle: Arc<Throttle>,
}

#[async_trait]
impl Connector for Hanging {
    fn name(&self) -> &str {
        "hang"
    }

    async fn supports(&self, config: &Config) -> bool {
        config.model().as_deref() == Some("hang")
    }

    fn complete(&self, _prompt: &str, _config: &Config) -> servitor_connect::Result<Completion> {
        Ok(Completion::new(HangingRequest {
            throttle: Arc::clone(&self.throttle),
        }))
    }
}

#[async_trait]
impl CompletionSource for HangingRequest {
    async fn text(self: Box<Self>) -> servitor_connect::Result<String> {
        let lease = self.throttle.acquire(1).await?;
        std::future::pending::<()>().await;
        drop(lease);
        Ok(String::new())
    }

    fn stream(self: Box<Self>) -> FragmentStream {
        stream::unfold(
            (self.throttle, None::<Lease>),
            |(throttle, lease)| async move {
                match lease {
                    None => {
                        let lease = throttle.acquire(1).await.ok()?;
                        let fragment = Ok::<_, ConnectorError>("partial".to_owned());
                        Some((fragment, (throttle, Some(lease))))
                    }
                    Some(lease) => {
                        std::future::pending::<()>().await;
                        drop(lease);
                        None
                    }
                }
            },
        )
        .boxed()
    }
}

fn hanging_kernel() -> (Kernel, Arc<Throttle>) {
    let throttle = Arc::new(Throttle::new(ThrottleLimits {
        request_rate: 0.0,
        token_rate: 0.0,
        period: 60.0,
        concurrent: 1,
    }));
    let mut registry = ConnectorRegistry::new();
    registry.register(Hanging {
        throttle: Arc::clone(&throttle),
    });
    let kernel = Kernel::builder()
        .layer(ConfigLayer::new().model("hang"))
        .connectors(registry)
        .build()
        .unwrap();
    (kernel, throttle)
}

#[tokio::test(start_paused = true)]
async fn abandoned_call_releases_its_slot() {
    let (kernel, throttle) = hanging_kernel();
    let f = kernel.bind(list_people()).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(30), f.call(vec![json!(STORE)])).await;
    assert!(outcome.is_err());

    let start = tokio::time::Instant::now();
    throttle.acquire(1).await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn dropped_stream_releases_its_slot() {
    let (kernel, throttle) = hanging_kernel();
    let mut fragments = kernel
        .complete("hello", ConfigLayer::new())
        .await
        .unwrap()
        .into_stream();
    assert_eq!(fragments.next().await.unwrap().unwrap(), "partial");

    // The slot is taken while the stream is alive; a waiting admission
    // gives up without holding anything.
    let blocked = tokio::time::timeout(Duration::from_secs(5), throttle.acquire(1)).await;
    assert!(blocked.is_err());

    drop(fragments);
    let start = tokio::time::Instant::now();
    throttle.acquire(1).await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
}
