//! Schema engine error types.
//!
//! Every schema operation surfaces failures through [`SchemaError`].  The
//! variants separate malformed text (dialect or notation syntax) from
//! well-formed values of the wrong shape, because only the latter is a
//! [`SchemaError::TypeMismatch`].

/// Unified error type for the schema engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    // -- Decode errors --------------------------------------------------------
    /// A parsed value does not fit the declared type.
    #[error("type mismatch at {path}: expected {expected}, {reason}")]
    TypeMismatch {
        /// Location of the offending value (`$` is the root).
        path: String,
        /// Rendered notation of the expected type.
        expected: String,
        /// What was wrong with the value.
        reason: String,
    },

    // -- Syntax errors --------------------------------------------------------
    /// The response text is not valid under the permissive dialect.
    #[error("syntax error at line {line}, column {column}: {reason}")]
    Syntax {
        line: usize,
        column: usize,
        reason: String,
    },

    /// A type notation string could not be parsed.
    #[error("invalid type notation `{notation}`: {reason}")]
    Notation { notation: String, reason: String },

    // -- Operation errors -----------------------------------------------------
    /// Call arguments do not match the operation's parameter list.
    #[error("cannot bind arguments for `{operation}`: {reason}")]
    Binding { operation: String, reason: String },
}

impl SchemaError {
    /// Returns `true` for errors the negotiation loop can correct by asking
    /// the model again (mismatched or malformed responses).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. } | Self::Syntax { .. })
    }
}

/// Convenience alias used throughout the schema crate.
pub type Result<T> = std::result::Result<T, SchemaError>;
