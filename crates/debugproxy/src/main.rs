use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use debugproxy::{parse_listen_specs, ListenerSet};
use debugproxy_config::{
    init_tracing, Config, FileConfig, LoggingConfig, CONFIG_ENV_VAR, DEFAULT_FRAMEWORK,
    DEFAULT_IDE, DEFAULT_XDEBUG,
};
use tokio_util::sync::CancellationToken;

/// DBGp proxy that maps file paths between a remote PHP debugger and your IDE.
#[derive(Debug, Parser)]
#[command(name = "flow-debugproxy", version, about)]
struct Cli {
    /// Debugger listen addresses, comma separated `context:port` pairs
    /// [default: Development:9003].
    #[arg(short = 'l', long)]
    xdebug: Option<String>,

    /// IDE address (`host:port`) [default: 127.0.0.1:9010].
    #[arg(short = 'I', long)]
    ide: Option<String>,

    /// Local project root; a trailing `/` is ignored.
    #[arg(short = 'r', long)]
    localroot: Option<String>,

    /// Path mapper to use [default: flow].
    #[arg(long)]
    framework: Option<String>,

    /// Log connection lifecycle.
    #[arg(long)]
    verbose: bool,

    /// Log every protocol message before and after mapping.
    #[arg(long)]
    vv: bool,

    /// Log path mapping decisions.
    #[arg(long)]
    debug: bool,

    /// Give up on a socket read or write after this many seconds.
    #[arg(long, value_name = "SECS")]
    io_timeout: Option<u64>,

    /// Path to a TOML config file.
    #[arg(long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let file = FileConfig::discover(cli.config.clone());
    init_tracing(&logging_config(&cli, file.as_ref().ok()));

    let result = match file {
        Ok(file) => run(cli, file).await,
        Err(err) => Err(anyhow::Error::new(debugproxy::ConfigurationError::from(err))),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::warn!(target: "debugproxy.config", "{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn logging_config(cli: &Cli, file: Option<&FileConfig>) -> LoggingConfig {
    let mut logging = file.map(|file| file.logging.clone()).unwrap_or_default();
    if cli.debug || file.is_some_and(|file| file.debug) {
        logging.level = "debug".to_owned();
    }
    logging.json |= cli.log_json;
    logging
}

async fn run(cli: Cli, file: FileConfig) -> anyhow::Result<()> {
    let xdebug = cli
        .xdebug
        .or_else(|| file.xdebug.map(|specs| specs.join(",")))
        .unwrap_or_else(|| DEFAULT_XDEBUG.to_owned());
    let ide = cli
        .ide
        .or(file.ide)
        .unwrap_or_else(|| DEFAULT_IDE.to_owned());
    let framework = cli
        .framework
        .or(file.framework)
        .unwrap_or_else(|| DEFAULT_FRAMEWORK.to_owned());
    let local_root = cli.localroot.or(file.localroot).unwrap_or_default();

    let config = Config {
        verbose: cli.verbose || file.verbose,
        very_verbose: cli.vv || file.vv,
        debug: cli.debug || file.debug,
        io_timeout: cli
            .io_timeout
            .or(file.io_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        ..Config::new(framework, local_root)
    };

    let specs = parse_listen_specs(&xdebug)?;
    let registry = debugproxy_mapper_builtins::builtin_registry();
    let listeners = ListenerSet::bind(&config, &specs, &ide, &registry)
        .await
        .context("failed to start")?;
    tracing::info!(
        target: "debugproxy.config",
        framework = %config.framework,
        local_root = %config.local_root,
        "ready"
    );

    let shutdown = CancellationToken::new();
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl-C")?;
            tracing::info!(target: "debugproxy.config", "shutting down");
            shutdown.cancel();
        }
        () = listeners.run(shutdown.clone()) => {}
    }
    Ok(())
}

