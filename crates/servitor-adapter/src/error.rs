//! Adapter error types.

use servitor_schema::SchemaError;

/// One prompt/response/error triple of a negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub prompt: String,
    /// The raw response text the attempt was decoded from.
    pub response: String,
    /// `None` when the response decoded successfully.
    pub error: Option<String>,
}

/// The retry budget ran out.  Carries every attempt, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not parse a response for `{operation}` after {} attempt(s)", .attempts.len())]
pub struct ParseError {
    pub operation: String,
    pub attempts: Vec<Attempt>,
}

impl ParseError {
    /// The reason the final attempt failed.
    pub fn last_error(&self) -> Option<&str> {
        self.attempts.last().and_then(|a| a.error.as_deref())
    }
}

/// Unified error type for adapters and negotiations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    // -- Resolution errors ---------------------------------------------------
    /// No adapter is registered under the requested name.
    #[error("no adapter named `{name}`")]
    NotFound { name: String },

    // -- Decode errors (recoverable inside a negotiation) --------------------
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A chain-of-thought response had no final `return(...)` line.
    #[error("no `return(answer)` statement found")]
    MissingMarker,

    // -- Construction errors -------------------------------------------------
    #[error("invalid response pattern: {0}")]
    Pattern(#[from] regex::Error),

    // -- Terminal errors -----------------------------------------------------
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The negotiation was driven out of order.
    #[error("negotiation protocol violated: {reason}")]
    Protocol { reason: String },
}

/// Convenience alias used throughout the adapter crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
