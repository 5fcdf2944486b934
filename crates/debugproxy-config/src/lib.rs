//! Configuration for the DBGp path-mapping proxy.
//!
//! There are two layers:
//! - [`Config`]: the immutable per-context runtime configuration handed to the
//!   proxy engine and the path mappers.
//! - [`FileConfig`]: an optional TOML file whose values sit between the
//!   built-in defaults and the command line.
//!
//! Logging setup lives in [`logging`].

mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig};

/// Environment variable consulted for the config file path when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "DEBUGPROXY_CONFIG";

pub const DEFAULT_XDEBUG: &str = "Development:9003";
pub const DEFAULT_IDE: &str = "127.0.0.1:9010";
pub const DEFAULT_FRAMEWORK: &str = "flow";

/// Runtime configuration for one listener context.
///
/// Built once at startup, then cloned per listener with [`Config::with_context`].
/// Shared as `Arc<Config>` afterwards and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Logical environment name of the listener (e.g. `Development/Docker`).
    pub context: String,
    /// Registry key of the path mapper (`flow`, `dummy`).
    pub framework: String,
    /// Local project root. Empty when the IDE and the debugger share a filesystem.
    pub local_root: String,
    pub verbose: bool,
    pub very_verbose: bool,
    pub debug: bool,
    /// Optional deadline for a single socket read or write.
    pub io_timeout: Option<Duration>,
}

impl Config {
    pub fn new(framework: impl Into<String>, local_root: impl AsRef<str>) -> Self {
        Self {
            framework: framework.into(),
            local_root: normalize_local_root(local_root.as_ref()),
            ..Self::default()
        }
    }

    /// Copy of this config bound to `context`.
    pub fn with_context(&self, context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            ..self.clone()
        }
    }

    /// The configured local root, if any.
    pub fn local_root(&self) -> Option<&str> {
        if self.local_root.is_empty() {
            None
        } else {
            Some(&self.local_root)
        }
    }
}

/// Strip trailing slashes, keeping a bare `/` intact.
pub fn normalize_local_root(root: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() && root.starts_with('/') {
        return "/".to_owned();
    }
    trimmed.to_owned()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config {path}: {message}")]
    Toml { path: String, message: String },
}

/// On-disk configuration (TOML).
///
/// Every field is optional; unset fields fall back to the command line defaults.
///
/// ```toml
/// xdebug = ["Development:9003", "Production:9004"]
/// ide = "127.0.0.1:9010"
/// localroot = "/home/me/project"
/// framework = "flow"
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub xdebug: Option<Vec<String>>,
    #[serde(default)]
    pub ide: Option<String>,
    #[serde(default)]
    pub localroot: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub vv: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub io_timeout_secs: Option<u64>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FileConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|err| ConfigError::Toml {
            path: path.display().to_string(),
            message: err.message().to_owned(),
        })
    }

    /// Resolve the config path from the CLI value or [`CONFIG_ENV_VAR`] and load it.
    ///
    /// Returns the default (empty) config when neither names a file.
    pub fn discover(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = cli_path.or_else(|| {
            std::env::var_os(CONFIG_ENV_VAR)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        });
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }
}
