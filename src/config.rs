use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CachePolicy;

pub const ENV_URL: &str = "KOO_URL";
pub const ENV_DATABASE: &str = "KOO_DATABASE";
pub const ENV_CACHE: &str = "KOO_CACHE";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "KOO_CONNECT_TIMEOUT_MS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("invalid config {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Fully resolved client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Login URL used when none is given explicitly.
    pub url: Option<String>,
    pub database: Option<String>,
    pub cache: CachePolicy,
    /// Applies to establishing connections only; calls themselves never time out.
    pub connect_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { url: None, database: None, cache: CachePolicy::default(), connect_timeout_ms: Some(10_000) }
    }
}

/// One configuration layer (file or environment). Unset values inherit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub url: Option<String>,
    pub database: Option<String>,
    pub cache: Option<CachePolicy>,
    pub connect_timeout_ms: Option<u64>,
}

impl ConfigLayer {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn from_env() -> Result<Self, ConfigError> { Self::from_vars(|k| std::env::var(k).ok()) }

    /// Build the environment layer from any variable lookup.
    pub fn from_vars<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let non_empty = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let cache = match non_empty(ENV_CACHE) {
            Some(v) => Some(CachePolicy::parse(&v).ok_or(ConfigError::InvalidValue { key: ENV_CACHE.into(), value: v })?),
            None => None,
        };
        let connect_timeout_ms = match non_empty(ENV_CONNECT_TIMEOUT_MS) {
            Some(v) => Some(v.trim().parse().map_err(|_| ConfigError::InvalidValue { key: ENV_CONNECT_TIMEOUT_MS.into(), value: v })?),
            None => None,
        };
        Ok(Self { url: non_empty(ENV_URL), database: non_empty(ENV_DATABASE), cache, connect_timeout_ms })
    }
}

impl ClientConfig {
    /// Defaults, then the file layer, then the environment layer.
    pub fn from_layers(defaults: &ClientConfig, file: Option<&ConfigLayer>, env: &ConfigLayer) -> Self {
        let mut out = defaults.clone();
        for layer in file.into_iter().chain(std::iter::once(env)) {
            if layer.url.is_some() { out.url = layer.url.clone(); }
            if layer.database.is_some() { out.database = layer.database.clone(); }
            if let Some(c) = layer.cache { out.cache = c; }
            // zero disables the connect timeout
            if let Some(ms) = layer.connect_timeout_ms { out.connect_timeout_ms = (ms > 0).then_some(ms); }
        }
        out
    }

    /// Resolve from an optional JSON file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.map(ConfigLayer::from_file).transpose()?;
        Ok(Self::from_layers(&ClientConfig::default(), file.as_ref(), &ConfigLayer::from_env()?))
    }

    pub fn connect_timeout(&self) -> Option<Duration> { self.connect_timeout_ms.map(Duration::from_millis) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn precedence_defaults_file_env() {
        let file = ConfigLayer { url: Some("socket://admin:a@erp:8070".into()), database: Some("demo".into()), cache: Some(CachePolicy::All), ..Default::default() };
        let env = ConfigLayer { database: Some("prod".into()), ..Default::default() };
        let eff = ClientConfig::from_layers(&ClientConfig::default(), Some(&file), &env);
        assert_eq!(eff.url.as_deref(), Some("socket://admin:a@erp:8070"));
        assert_eq!(eff.database.as_deref(), Some("prod"));
        assert_eq!(eff.cache, CachePolicy::All);
        assert_eq!(eff.connect_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let env = ConfigLayer { connect_timeout_ms: Some(0), ..Default::default() };
        assert_eq!(ClientConfig::from_layers(&ClientConfig::default(), None, &env).connect_timeout(), None);
    }

    #[test]
    fn env_layer_parses_and_validates() {
        let vars: HashMap<&str, &str> = [(ENV_URL, "http://localhost:8069"), (ENV_CACHE, "off"), (ENV_DATABASE, " ")].into();
        let layer = ConfigLayer::from_vars(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(layer.url.as_deref(), Some("http://localhost:8069"));
        assert_eq!(layer.cache, Some(CachePolicy::Disabled));
        assert_eq!(layer.database, None);

        let bad: HashMap<&str, &str> = [(ENV_CACHE, "sometimes")].into();
        assert!(matches!(ConfigLayer::from_vars(|k| bad.get(k).map(|v| v.to_string())), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn file_layer_reads_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("koo.json");
        std::fs::write(&path, r#"{"database": "demo", "cache": "views_and_actions"}"#).unwrap();
        let layer = ConfigLayer::from_file(&path).unwrap();
        assert_eq!(layer.database.as_deref(), Some("demo"));
        assert_eq!(layer.cache, Some(CachePolicy::ViewsAndActions));
        assert_eq!(layer.url, None);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(ConfigLayer::from_file(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(ConfigLayer::from_file(&dir.path().join("missing.json")), Err(ConfigError::Io { .. })));
    }
}
