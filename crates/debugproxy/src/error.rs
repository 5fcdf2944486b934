use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use debugproxy_config::ConfigError;
use debugproxy_dbgp::DbgpError;
use debugproxy_mapper::MapperError;
use thiserror::Error;

/// Fatal startup problems; nothing is served when one of these occurs.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid listen address {spec:?}: expected `context:port`")]
    InvalidListenSpec { spec: String },
    #[error("no debugger listen address configured")]
    NoListenSpec,
    #[error("failed to listen on {addr} for context {context:?}: {source}")]
    Bind {
        context: String,
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to resolve IDE address {addr:?}: {source}")]
    ResolveIde {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("IDE address {addr:?} resolved to nothing")]
    NoIdeAddress { addr: String },
    #[error(transparent)]
    Mapper(#[from] MapperError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure of a single proxied connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("can't connect to IDE at {addr}: {source}")]
    Dial {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Why one direction of a connection stopped.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("connection closed")]
    Closed,
    #[error("peer direction stopped")]
    Cancelled,
    #[error("no progress within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(DbgpError),
    #[error(transparent)]
    Mapper(#[from] MapperError),
    #[error("path mapper task failed: {0}")]
    MapperTask(tokio::task::JoinError),
}

impl PipeError {
    /// End of stream and shutdown caused by the other direction are the normal
    /// way for a connection to end.
    pub fn is_expected(&self) -> bool {
        matches!(self, PipeError::Closed | PipeError::Cancelled)
    }
}

impl From<DbgpError> for PipeError {
    fn from(err: DbgpError) -> Self {
        match err {
            DbgpError::Io(err) => PipeError::Io(err),
            other => PipeError::Frame(other),
        }
    }
}
