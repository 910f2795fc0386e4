//! Loading configuration layers from the process environment and files.
//!
//! Every option is read from `SERVITOR_<KEY>` (`SERVITOR_MODEL`,
//! `SERVITOR_OPENAI_API_KEY`, ...).  Provider credentials are also read from
//! their conventional bare names (`OPENAI_API_KEY`); the prefixed form wins
//! when both are set.

use std::path::Path;

use servitor_connect::{CREDENTIAL_KEYS, ConfigError, ConfigLayer, ConfigResult};

/// Prefix of every servitor environment variable.
pub const ENV_PREFIX: &str = "SERVITOR_";

/// Load `.env` from the working directory or its parents, if present.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }
}

/// A layer built from the current process environment.
pub fn layer_from_env() -> ConfigResult<ConfigLayer> {
    layer_from_vars(std::env::vars())
}

/// A layer built from `(name, value)` pairs shaped like environment
/// variables.  Unrelated names are ignored.
pub fn layer_from_vars<I, K, V>(vars: I) -> ConfigResult<ConfigLayer>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut bare = Vec::new();
    let mut prefixed = Vec::new();

    for (name, value) in vars {
        let (name, value) = (name.as_ref(), value.as_ref());
        if value.trim().is_empty() {
            continue;
        }
        if let Some(key) = name.strip_prefix(ENV_PREFIX) {
            prefixed.push((key.to_ascii_lowercase(), value.to_owned()));
        } else if let Some(key) = CREDENTIAL_KEYS
            .iter()
            .find(|key| key.eq_ignore_ascii_case(name))
        {
            bare.push(((*key).to_owned(), value.to_owned()));
        }
    }

    let mut layer = ConfigLayer::new();
    for (key, value) in bare.iter().chain(&prefixed) {
        layer.set(key, value)?;
        tracing::debug!(key = %key, "configured from environment");
    }
    Ok(layer)
}

/// A layer read from a TOML file of `key = value` pairs.
pub fn layer_from_file(path: &Path) -> ConfigResult<ConfigLayer> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    ConfigLayer::from_toml_str(&text).map_err(|err| match err {
        ConfigError::File { reason, .. } => ConfigError::File {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use servitor_connect::Config;

    use super::*;

    #[test]
    fn prefixed_and_bare_names() {
        let layer = layer_from_vars([
            ("SERVITOR_MODEL", "gpt-4o"),
            ("SERVITOR_RETRY", "5"),
            ("OPENAI_API_KEY", "sk-bare"),
            ("HOME", "/root"),
            ("SERVITOR_LOCAL_BASE_URL", "http://127.0.0.1:8080/v1"),
        ])
        .unwrap();
        let config = Config::default().with_layer(layer);
        assert_eq!(config.model().as_deref(), Some("gpt-4o"));
        assert_eq!(config.retry(), 5);
        assert_eq!(config.get("openai_api_key").as_deref(), Some("sk-bare"));
        assert_eq!(
            config.get("local_base_url").as_deref(),
            Some("http://127.0.0.1:8080/v1")
        );
        assert!(config.get("home").is_none());
    }

    #[test]
    fn prefixed_credential_wins() {
        let layer = layer_from_vars([
            ("SERVITOR_ANTHROPIC_API_KEY", "sk-prefixed"),
            ("ANTHROPIC_API_KEY", "sk-bare"),
        ])
        .unwrap();
        let config = Config::default().with_layer(layer);
        assert_eq!(config.get("anthropic_api_key").as_deref(), Some("sk-prefixed"));
    }

    #[test]
    fn blank_values_are_ignored() {
        let layer = layer_from_vars([("SERVITOR_MODEL", "  ")]).unwrap();
        assert!(layer.is_empty());
    }

    #[test]
    fn invalid_values_fail() {
        let err = layer_from_vars([("SERVITOR_TOP_P", "most")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "top_p"));
    }

    #[test]
    fn file_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = \"claude-3-5-haiku\"\nmax_tokens = 200\nstop = [\"END\"]").unwrap();
        let layer = layer_from_file(file.path()).unwrap();
        let config = Config::default().with_layer(layer);
        assert_eq!(config.model().as_deref(), Some("claude-3-5-haiku"));
        assert_eq!(config.max_tokens(), 200);
        assert_eq!(config.stop(), Some(vec!["END".to_owned()]));
    }

    #[test]
    fn unreadable_file_names_its_path() {
        let err = layer_from_file(Path::new("/nonexistent/servitor.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/servitor.toml"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = ").unwrap();
        let err = layer_from_file(file.path()).unwrap_err();
        let path = file.path().display().to_string();
        assert!(matches!(err, ConfigError::File { path: ref p, .. } if *p == path));
    }
}
