use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable holding the Directus static token.
pub const TOKEN_ENV: &str = "DIRECTUS_BEARER_TOKEN";
pub const BASE_URI_ENV: &str = "DIRECTUS_BASE_URI";
pub const FORCE_SYNC_ENV: &str = "DIRECTUS_ENABLE_AUTO_SYNC";

const DEFAULT_BASE_URI: &str = "https://example.com";

/// Example configuration written by `directus-cache init-config`.
pub const EXAMPLE_CONFIG: &str = include_str!("../config.example.yaml");

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub directus: DirectusConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Clone, Deserialize)]
pub struct DirectusConfig {
  #[serde(default = "default_base_uri")]
  pub base_uri: String,
  /// Static token sent as `Authorization: Bearer`. Usually left out of the
  /// file and supplied through `DIRECTUS_BEARER_TOKEN`.
  #[serde(default)]
  pub bearer_token: String,
  /// Global switch allowing callers to request a forced refresh
  #[serde(default)]
  pub enable_force_sync: bool,
  /// Per-request timeout handed to the HTTP transport
  #[serde(default)]
  pub request_timeout_secs: Option<u64>,
}

fn default_base_uri() -> String {
  DEFAULT_BASE_URI.to_string()
}

impl fmt::Debug for DirectusConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DirectusConfig")
      .field("base_uri", &self.base_uri)
      .field("bearer_token", &"<redacted>")
      .field("enable_force_sync", &self.enable_force_sync)
      .field("request_timeout_secs", &self.request_timeout_secs)
      .finish()
  }
}

impl DirectusConfig {
  pub fn new(base_uri: impl Into<String>, bearer_token: impl Into<String>) -> Self {
    Self {
      base_uri: base_uri.into(),
      bearer_token: bearer_token.into(),
      enable_force_sync: false,
      request_timeout_secs: None,
    }
  }

  pub fn with_force_sync(mut self, enabled: bool) -> Self {
    self.enable_force_sync = enabled;
    self
  }

  /// Build the configuration from `DIRECTUS_*` environment variables.
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Build the configuration from an arbitrary key lookup.
  ///
  /// The token is required, the base URI defaults to `https://example.com`
  /// and the force-sync flag to `false`.
  pub fn from_lookup<F>(lookup: F) -> Result<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    let bearer_token = lookup(TOKEN_ENV)
      .filter(|t| !t.trim().is_empty())
      .ok_or_else(|| Error::Config(format!("Directus token not found. Set {}.", TOKEN_ENV)))?;

    let base_uri = lookup(BASE_URI_ENV).unwrap_or_else(default_base_uri);

    let enable_force_sync = match lookup(FORCE_SYNC_ENV) {
      Some(raw) => parse_flag(&raw)
        .ok_or_else(|| Error::Config(format!("{} must be a boolean, got '{}'", FORCE_SYNC_ENV, raw)))?,
      None => false,
    };

    Ok(Self {
      base_uri,
      bearer_token,
      enable_force_sync,
      request_timeout_secs: None,
    })
  }
}

fn parse_flag(raw: &str) -> Option<bool> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Some(true),
    "" | "0" | "false" | "no" | "off" => Some(false),
    _ => None,
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite database file (default: $XDG_DATA_HOME/directus-cache/cache.db)
  pub database_path: Option<PathBuf>,
  /// Root directory for downloaded assets (default: $XDG_DATA_HOME/directus-cache/storage)
  pub assets_root: Option<PathBuf>,
}

impl StorageConfig {
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database_path {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("cache.db")),
    }
  }

  pub fn assets_root(&self) -> Result<PathBuf> {
    match &self.assets_root {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("storage")),
    }
  }
}

fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;

  Ok(data_dir.join("directus-cache"))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./directus.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/directus-cache/config.yaml
  ///
  /// `DIRECTUS_BEARER_TOKEN` overrides the token from the file.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::Config(format!("Config file not found: {}", p.display())));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(Error::Config(
          "No configuration file found. Create one with `directus-cache init-config`.".to_string(),
        ))
      }
    };

    if let Ok(token) = std::env::var(TOKEN_ENV) {
      config.directus.bearer_token = token;
    }

    if config.directus.bearer_token.trim().is_empty() {
      return Err(Error::Config(format!(
        "Directus token not found. Set {} or directus.bearer_token.",
        TOKEN_ENV
      )));
    }

    Ok(config)
  }

  /// Default location of the user configuration file.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("directus-cache").join("config.yaml"))
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("directus.yaml");
    if local.exists() {
      return Some(local);
    }

    Self::default_path().filter(|p| p.exists())
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    Self::parse(&contents)
      .map_err(|e| Error::Config(format!("Failed to parse config file {}: {}", path.display(), e)))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |key| map.get(key).cloned()
  }

  #[test]
  fn test_from_lookup_defaults() {
    let config = DirectusConfig::from_lookup(lookup(&[(TOKEN_ENV, "secret")])).unwrap();
    assert_eq!(config.base_uri, "https://example.com");
    assert_eq!(config.bearer_token, "secret");
    assert!(!config.enable_force_sync);
  }

  #[test]
  fn test_from_lookup_reads_all_keys() {
    let config = DirectusConfig::from_lookup(lookup(&[
      (TOKEN_ENV, "secret"),
      (BASE_URI_ENV, "https://cms.test/"),
      (FORCE_SYNC_ENV, "true"),
    ]))
    .unwrap();
    assert_eq!(config.base_uri, "https://cms.test/");
    assert!(config.enable_force_sync);
  }

  #[test]
  fn test_from_lookup_requires_token() {
    let err = DirectusConfig::from_lookup(lookup(&[])).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
  }

  #[test]
  fn test_from_lookup_rejects_bad_flag() {
    let err = DirectusConfig::from_lookup(lookup(&[(TOKEN_ENV, "t"), (FORCE_SYNC_ENV, "maybe")]))
      .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
  }

  #[test]
  fn test_debug_redacts_token() {
    let config = DirectusConfig::new("https://cms.test", "super-secret");
    let debug = format!("{:?}", config);
    assert!(!debug.contains("super-secret"));
    assert!(debug.contains("<redacted>"));
  }

  #[test]
  fn test_parse_yaml() {
    let config = Config::parse(
      r#"
directus:
  base_uri: https://cms.test
  enable_force_sync: true
storage:
  database_path: /tmp/cache.db
"#,
    )
    .unwrap();
    assert_eq!(config.directus.base_uri, "https://cms.test");
    assert!(config.directus.enable_force_sync);
    assert_eq!(config.directus.bearer_token, "");
    assert_eq!(
      config.storage.database_path().unwrap(),
      PathBuf::from("/tmp/cache.db")
    );
  }

  #[test]
  fn test_example_config_parses() {
    let config = Config::parse(EXAMPLE_CONFIG).unwrap();
    assert!(!config.directus.enable_force_sync);
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/directus.yaml"))).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
  }
}
