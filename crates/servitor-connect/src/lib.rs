//! Connectors for LLM completion services.
//!
//! This crate turns a prompt plus a layered [`Config`] into a lazily issued
//! [`Completion`].  Dispatch walks a [`ConnectorRegistry`] in registration
//! order and picks the first connector that supports the configuration;
//! every HTTP provider admits its requests through a per-credential
//! [`Throttle`].
//!
//! ## Modules
//!
//! - [`config`] -- Option layers, clamping and the merged view.
//! - [`throttle`] -- Token-bucket admission with a concurrency cap.
//! - [`completion`] -- One-shot and streaming completion handles.
//! - [`connector`] -- The connector seam, registry and a scripted stub.
//! - [`providers`] -- OpenAI, Anthropic and local HTTP providers.
//! - [`tokens`] -- Cost estimation.
//! - [`error`] -- Error types.

pub mod completion;
pub mod config;
pub mod connector;
pub mod error;
pub mod providers;
pub mod throttle;
pub mod tokens;

pub use completion::{Completion, CompletionSource, FragmentStream, collect_text};
pub use config::{CREDENTIAL_KEYS, Config, ConfigLayer, ConfigResult, is_secret};
pub use connector::{Connector, ConnectorRegistry, StubConnector};
pub use error::{ConfigError, ConnectorError, Result};
pub use providers::default_registry;
pub use throttle::{Lease, Throttle, ThrottleLimits, ThrottleRegistry};
pub use tokens::{estimate_prompt_cost, estimate_tokens};
