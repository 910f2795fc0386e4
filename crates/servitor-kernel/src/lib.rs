//! Servitor kernel.
//!
//! Ties the schema engine, the adapters and the connectors together:
//!
//! ```text
//!  Operation + Arguments ──bind──> Task ──Adapter──> prompt
//!                                                       │
//!       Resolution <──decode/fix── response <──Connector┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use servitor_kernel::Kernel;
//! use servitor_schema::{DeclaredType, Operation, Param};
//!
//! # fn main() -> servitor_kernel::Result<()> {
//! let kernel = Kernel::from_env()?;
//! let list_people = kernel.bind(
//!     Operation::new("list_people")
//!         .doc("List the people mentioned in the text.")
//!         .param(Param::new("text", DeclaredType::string()))
//!         .returns(DeclaredType::list(DeclaredType::string())),
//! )?;
//! let people: Vec<String> =
//!     list_people.call_as_blocking(vec![json!("John and Mary went to the store.")])?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`kernel`] -- Kernel assembly and binding.
//! - [`function`] -- Bound semantic functions and their results.
//! - [`env`] -- Configuration from the environment and files.
//! - [`error`] -- Kernel error types.

pub mod env;
pub mod error;
pub mod function;
pub mod kernel;

pub use error::{KernelError, Result};
pub use function::{Resolution, SemanticFn};
pub use kernel::{Kernel, KernelBuilder};
