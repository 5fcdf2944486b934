//! Path mapper plugins.
//!
//! A path mapper rewrites file references inside DBGp traffic so that the IDE
//! and the debugger engine can disagree about where the project lives on
//! disk. Mappers are constructed through a [`MapperRegistry`] keyed by
//! framework name and share a [`PathMapping`] cache with every connection of
//! their listener context.

mod mapping;
mod passthrough;
mod registry;

use std::sync::Arc;

use debugproxy_config::Config;
use debugproxy_dbgp::DbgpError;
use thiserror::Error;

pub use mapping::PathMapping;
pub use passthrough::{PassthroughMapper, PASSTHROUGH_FRAMEWORK};
pub use registry::{MapperFactory, MapperRegistry};

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("unsupported framework {framework:?} (available: {available})")]
    UnsupportedFramework { framework: String, available: String },
    #[error(transparent)]
    Frame(#[from] DbgpError),
    #[error("path mapping failed: {0}")]
    Mapping(String),
}

pub type Result<T> = std::result::Result<T, MapperError>;

/// Extension point for framework specific path rewriting.
///
/// One instance serves every connection of a listener context, so the
/// mapping methods take `&self` and any mutable state goes through the shared
/// [`PathMapping`].
pub trait PathMapper: Send + Sync {
    /// Wire in shared dependencies. Called once, before the mapper is shared.
    ///
    /// `span` carries the listener context; mappers log inside it.
    fn initialize(&mut self, config: Arc<Config>, span: tracing::Span, mapping: Arc<PathMapping>);

    /// Rewrite paths in an IDE command (`breakpoint_set ... -f file://...`).
    ///
    /// The IDE direction is not length framed; `message` is whatever a single
    /// read returned.
    fn apply_mapping_to_text_protocol(&self, message: Vec<u8>) -> Result<Vec<u8>>;

    /// Rewrite paths in a debugger XML message.
    ///
    /// `message` is a complete DBGp frame and the returned bytes must be one
    /// too: a mapper that changes the payload re-encodes the length prefix.
    fn apply_mapping_to_xml(&self, message: Vec<u8>) -> Result<Vec<u8>>;
}
