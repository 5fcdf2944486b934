//! DBGp proxy that rewrites file paths between a remote PHP debugger and a
//! local IDE.
//!
//! [`ListenerSet`] binds one port per application context and hands every
//! accepted debugger connection to a [`Proxy`], which relays it to the IDE
//! through the context's path mapper.

mod error;
pub mod listener;
pub mod proxy;

pub use error::{ConfigurationError, PipeError, ProxyError};
pub use listener::{parse_listen_specs, resolve_ide, ListenSpec, ListenerSet};
pub use proxy::{Direction, Proxy, ProxyStats};
