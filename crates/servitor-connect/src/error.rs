//! Connector error types.
//!
//! Transport failures surface through [`ConnectorError`]; configuration
//! assembly failures through [`ConfigError`].  Provider-specific signals are
//! normalized here so callers never match on HTTP status codes.

/// Invalid configuration, detected before any request is issued.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A value could not be parsed for its option.
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// Nothing is configured that could reach a provider.
    #[error("missing credential: {reason}")]
    MissingCredential { reason: String },

    /// A configuration file could not be read or parsed.
    #[error("config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Unified error type for dispatch and providers.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    // -- Transient errors ----------------------------------------------------
    /// The provider signalled a rate limit.
    #[error("throttled by {provider}: {reason}")]
    Throttled { provider: String, reason: String },

    /// The provider is temporarily unavailable or overloaded.
    #[error("{provider} is busy: {reason}")]
    Busy { provider: String, reason: String },

    // -- Resolution errors ---------------------------------------------------
    /// No registered connector supports the requested configuration.
    #[error("no connector supports model `{model}`")]
    NotFound { model: String },

    /// A connector matched but its credential is absent.
    #[error("missing credential `{key}` for {provider}")]
    MissingCredential { provider: String, key: String },

    // -- Request errors ------------------------------------------------------
    /// The HTTP request failed or returned a non-retryable status.
    #[error("request failed: {reason}")]
    RequestFailed { reason: String },

    /// The provider's response could not be interpreted.
    #[error("response parse error: {reason}")]
    ResponseParse { reason: String },

    /// A streaming response was interrupted or malformed.
    #[error("stream error: {reason}")]
    Stream { reason: String },

    // -- Configuration -------------------------------------------------------
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ConnectorError {
    /// Returns `true` for [`Throttled`](Self::Throttled) and
    /// [`Busy`](Self::Busy), which a caller may retry after backing off.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Busy { .. })
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        Self::RequestFailed {
            reason: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the connect crate.
pub type Result<T> = std::result::Result<T, ConnectorError>;
