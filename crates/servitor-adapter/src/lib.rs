//! Negotiation between typed operations and free-text completions.
//!
//! An [`Adapter`] turns a bound [`Task`](servitor_schema::Task) into a prompt
//! and a response back into a value.  A [`Negotiation`] drives one adapter
//! through prompt, decode and correction rounds without doing any I/O
//! itself; the caller supplies responses.
//!
//! ## Modules
//!
//! - [`adapter`] -- The adapter trait and the `task`, `plain` and `type` variants.
//! - [`chain`] -- The chain-of-thought variant.
//! - [`negotiation`] -- The resumable correction loop.
//! - [`registry`] -- Adapters by name.
//! - [`template`] -- Prompt templates.
//! - [`error`] -- Attempt history and error types.

pub mod adapter;
pub mod chain;
pub mod error;
pub mod negotiation;
pub mod registry;
pub mod template;

pub use adapter::{Adapter, PlainAdapter, TaskAdapter, TypeAdapter};
pub use chain::{ChainAdapter, ChainOfThought};
pub use error::{AdapterError, Attempt, ParseError, Result};
pub use negotiation::{Negotiation, Next};
pub use registry::AdapterRegistry;
