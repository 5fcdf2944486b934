use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use debugproxy_config::Config;
use debugproxy_mapper::{MapperRegistry, PathMapper, PathMapping};
use tokio::net::{lookup_host, TcpListener};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::ConfigurationError;
use crate::proxy::Proxy;

const TARGET: &str = "debugproxy.listener";

/// A debugger facing listen address: `context:port`.
///
/// The context names the Flow application context (`Development`,
/// `Production/Docker`, ...) whose traffic arrives on that port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSpec {
    pub context: String,
    pub port: u16,
}

impl FromStr for ListenSpec {
    type Err = ConfigurationError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigurationError::InvalidListenSpec {
            spec: spec.to_owned(),
        };
        let (context, port) = spec.trim().rsplit_once(':').ok_or_else(invalid)?;
        if context.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        Ok(Self {
            context: context.to_owned(),
            port,
        })
    }
}

impl fmt::Display for ListenSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.context, self.port)
    }
}

/// Parse a comma separated list of `context:port` specs.
pub fn parse_listen_specs(specs: &str) -> Result<Vec<ListenSpec>, ConfigurationError> {
    let parsed = specs
        .split(',')
        .map(str::trim)
        .filter(|spec| !spec.is_empty())
        .map(ListenSpec::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    if parsed.is_empty() {
        return Err(ConfigurationError::NoListenSpec);
    }
    Ok(parsed)
}

/// Resolve `host:port` to the first address it names.
pub async fn resolve_ide(addr: &str) -> Result<SocketAddr, ConfigurationError> {
    let mut addrs = lookup_host(addr)
        .await
        .map_err(|source| ConfigurationError::ResolveIde {
            addr: addr.to_owned(),
            source,
        })?;
    addrs.next().ok_or_else(|| ConfigurationError::NoIdeAddress {
        addr: addr.to_owned(),
    })
}

/// One bound debugger port with its own config and mapper.
struct ListenerContext {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<Config>,
    mapper: Arc<dyn PathMapper>,
    mapping: Arc<PathMapping>,
}

/// Every configured debugger listener, relaying to one IDE.
pub struct ListenerSet {
    ide_addr: SocketAddr,
    contexts: Vec<ListenerContext>,
    post_processors: Vec<Arc<dyn PathMapper>>,
}

impl ListenerSet {
    /// Resolve the IDE, create one mapper per context and bind every port.
    ///
    /// Mappers are created before anything is bound, so an unknown framework
    /// fails startup without opening a single port.
    pub async fn bind(
        config: &Config,
        specs: &[ListenSpec],
        ide: &str,
        registry: &MapperRegistry,
    ) -> Result<Self, ConfigurationError> {
        if specs.is_empty() {
            return Err(ConfigurationError::NoListenSpec);
        }
        let ide_addr = resolve_ide(ide).await?;

        let mut prepared = Vec::with_capacity(specs.len());
        for spec in specs {
            let config = Arc::new(config.with_context(&spec.context));
            let mapping = Arc::new(PathMapping::new());
            let span = tracing::info_span!(target: TARGET, "context", context = %spec.context);
            let mapper =
                registry.create(&config.framework, config.clone(), span, mapping.clone())?;
            prepared.push((spec, config, mapper, mapping));
        }

        let mut contexts = Vec::with_capacity(prepared.len());
        for (spec, config, mapper, mapping) in prepared {
            let addr = format!("0.0.0.0:{}", spec.port);
            let listener =
                TcpListener::bind(&addr)
                    .await
                    .map_err(|source| ConfigurationError::Bind {
                        context: spec.context.clone(),
                        addr: addr.clone(),
                        source,
                    })?;
            let local_addr = listener
                .local_addr()
                .map_err(|source| ConfigurationError::Bind {
                    context: spec.context.clone(),
                    addr,
                    source,
                })?;
            tracing::info!(
                target: TARGET,
                context = %spec.context,
                framework = %config.framework,
                "debugger from {local_addr}"
            );
            contexts.push(ListenerContext {
                listener,
                local_addr,
                config,
                mapper,
                mapping,
            });
        }

        tracing::info!(target: TARGET, "IDE from {ide_addr}");
        Ok(Self {
            ide_addr,
            contexts,
            post_processors: Vec::new(),
        })
    }

    pub fn ide_addr(&self) -> SocketAddr {
        self.ide_addr
    }

    /// `(context, bound address)` for every listener, in configuration order.
    pub fn local_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.contexts
            .iter()
            .map(|ctx| (ctx.config.context.clone(), ctx.local_addr))
            .collect()
    }

    /// Shared path cache of `context`.
    pub fn mapping(&self, context: &str) -> Option<Arc<PathMapping>> {
        self.contexts
            .iter()
            .find(|ctx| ctx.config.context == context)
            .map(|ctx| ctx.mapping.clone())
    }

    /// Add a mapper that runs after the primary one on every connection.
    pub fn register_post_processor(&mut self, processor: Arc<dyn PathMapper>) {
        self.post_processors.push(processor);
    }

    /// Accept connections on every listener until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let post_processors: Arc<[Arc<dyn PathMapper>]> = self.post_processors.into();
        let mut loops = JoinSet::new();
        for context in self.contexts {
            loops.spawn(accept_loop(
                context,
                self.ide_addr,
                post_processors.clone(),
                shutdown.clone(),
            ));
        }
        while loops.join_next().await.is_some() {}
    }
}

async fn accept_loop(
    context: ListenerContext,
    ide_addr: SocketAddr,
    post_processors: Arc<[Arc<dyn PathMapper>]>,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = context.listener.accept() => accepted,
        };
        let stream = match accepted {
            Ok((stream, _)) => stream,
            Err(err) => {
                tracing::warn!(target: TARGET, context = %context.config.context, error = %err, "accept failed");
                continue;
            }
        };

        let mut proxy = Proxy::new(stream, ide_addr, context.config.clone(), context.mapper.clone());
        for processor in post_processors.iter() {
            proxy.register_post_processor(processor.clone());
        }
        tokio::spawn(async move {
            let _ = proxy.start().await;
        });
    }
}
