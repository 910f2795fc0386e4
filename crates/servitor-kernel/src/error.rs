//! Kernel error types.
//!
//! [`KernelError`] wraps the error type of every crate a call passes through,
//! so callers can tell a configuration mistake from a transport failure or an
//! exhausted negotiation.

use servitor_adapter::{AdapterError, ParseError};
use servitor_connect::{ConfigError, ConnectorError};
use servitor_schema::SchemaError;

/// Unified error type for kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Setup errors -------------------------------------------------------
    #[error(transparent)]
    Config(#[from] ConfigError),

    // -- Call errors --------------------------------------------------------
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// The decoded value does not deserialize into the requested Rust type.
    #[error("cannot convert result of `{operation}`: {reason}")]
    Convert { operation: String, reason: String },

    /// A blocking call could not get a runtime of its own.
    #[error("blocking call failed: {reason}")]
    Runtime { reason: String },
}

impl KernelError {
    /// The terminal negotiation failure, if that is what this is.
    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            Self::Adapter(AdapterError::Parse(err)) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` for provider rate limiting or overload.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connector(err) if err.is_transient())
    }
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
