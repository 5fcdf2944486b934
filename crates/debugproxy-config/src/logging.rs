use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

static TRACING_INIT: Once = Once::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        DEFAULT_LEVEL.to_owned()
    }

    /// The configured filter with `warning` accepted for `warn`.
    fn directives(&self) -> &str {
        match self.level.trim() {
            "" => DEFAULT_LEVEL,
            level if level.eq_ignore_ascii_case("warning") => "warn",
            level => level,
        }
    }

    /// The configured directives followed by those of `rust_log`.
    ///
    /// Later directives win, so `RUST_LOG` can refine the configured level per
    /// target. A filter that does not parse yields the default level.
    fn filter_with(&self, rust_log: Option<&str>) -> EnvFilter {
        let mut directives = self.directives().to_owned();
        if let Some(extra) = rust_log.map(str::trim).filter(|extra| !extra.is_empty()) {
            directives.push(',');
            directives.push_str(extra);
        }
        EnvFilter::try_new(&directives).unwrap_or_else(|err| {
            eprintln!("debugproxy: ignoring log filter {directives:?}: {err}");
            EnvFilter::new(DEFAULT_LEVEL)
        })
    }

    /// The effective filter: the configured level, extended by `RUST_LOG` when set.
    pub fn env_filter(&self) -> EnvFilter {
        self.filter_with(std::env::var("RUST_LOG").ok().as_deref())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

/// Installs the global `tracing` subscriber (stderr).
///
/// Only the first call has an effect.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(config.env_filter())
            .with_writer(std::io::stderr);

        let installed = if config.json {
            builder.json().with_ansi(false).try_init()
        } else {
            builder.try_init()
        };

        if let Err(err) = installed {
            eprintln!("debugproxy: failed to install tracing subscriber: {err}");
        }
    });
}
