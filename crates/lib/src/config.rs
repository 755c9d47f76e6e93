//! Engine configuration.
//!
//! Loaded from TOML or JSON; every field has a default so partial files work.
//!
//! ```toml
//! http_timeout_ms = 10000
//! default_cache_time_ms = 0
//! max_expression_depth = 64
//! script_memory_limit = 33554432
//! warn_on_name_collision = true
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::expr::DEFAULT_MAX_DEPTH;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid TOML config: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("invalid JSON config: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Request timeout for REST queries without their own `timeoutMs`.
  pub http_timeout_ms: u64,

  /// Cache lifetime for queries without their own `cacheTimeMs`. Zero disables caching.
  pub default_cache_time_ms: u64,

  /// Bound on expression nesting and lambda call depth.
  pub max_expression_depth: usize,

  /// Lua heap limit in bytes. `None` leaves the VM unbounded.
  pub script_memory_limit: Option<usize>,

  /// Log a warning when two namespace entries share a name.
  pub warn_on_name_collision: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      http_timeout_ms: 30_000,
      default_cache_time_ms: 0,
      max_expression_depth: DEFAULT_MAX_DEPTH,
      script_memory_limit: None,
      warn_on_name_collision: true,
    }
  }
}

impl EngineConfig {
  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(content)?)
  }

  pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(content)?)
  }

  /// Loads a config file, picking the format by extension (`.json`, otherwise TOML).
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), "loading engine config");
    match path.extension().and_then(|e| e.to_str()) {
      Some("json") => Self::from_json_str(&content),
      _ => Self::from_toml_str(&content),
    }
  }

  pub fn http_timeout(&self) -> Duration {
    Duration::from_millis(self.http_timeout_ms)
  }
}
