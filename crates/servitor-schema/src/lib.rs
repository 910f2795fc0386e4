//! Type schema engine for servitor.
//!
//! Pure functions over a declared-type model, shared by prompt construction
//! and response decoding:
//!
//! ```text
//!  DeclaredType ──render──> "{name: string, age?: int}"   (into the prompt)
//!       │
//!       └──decode──< parse_dialect("{name: Ann, age: 30}") (from the model)
//! ```
//!
//! ## Modules
//!
//! - [`types`] -- The [`DeclaredType`] grammar and record builder.
//! - [`render`] -- Compact notation for types, signatures and tasks.
//! - [`notation`] -- Parsing the compact notation back into types.
//! - [`dialect`] -- The permissive JSON-superset response dialect.
//! - [`decode`] -- Coercing parsed values into declared shapes.
//! - [`operation`] -- Operations, arguments and bound tasks.
//! - [`declare`] -- Declared types for native Rust types.
//! - [`error`] -- Schema error types.
//!
//! Nothing in this crate performs I/O or holds state.

pub mod declare;
pub mod decode;
pub mod dialect;
pub mod error;
pub mod notation;
pub mod operation;
pub mod render;
pub mod types;

pub use declare::Declare;
pub use decode::{decode, decode_text, parse_bool_token};
pub use dialect::parse_dialect;
pub use error::{Result, SchemaError};
pub use notation::parse_type;
pub use operation::{Arguments, Instruction, Operation, Param, Task};
pub use render::{render_signature, render_task, render_type};
pub use types::{DeclaredType, Field, Primitive, Record};
