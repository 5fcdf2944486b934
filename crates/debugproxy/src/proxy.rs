//! Relay between one debugger connection and the IDE.
//!
//! Every accepted debugger connection gets a [`Proxy`]. It dials the IDE and
//! runs two pipe tasks:
//!
//! - debugger -> IDE: the stream is DBGp framed; each complete frame goes
//!   through [`PathMapper::apply_mapping_to_xml`] of every mapper in the chain.
//! - IDE -> debugger: commands are forwarded one read at a time through
//!   [`PathMapper::apply_mapping_to_text_protocol`].
//!
//! Both pipes share a [`CancellationToken`]. Whichever stops first cancels it,
//! so the other one stops too and no socket outlives its peer.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use debugproxy_config::Config;
use debugproxy_dbgp::{render_message, FrameReader, READ_BUFFER_SIZE};
use debugproxy_mapper::{MapperError, PathMapper};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::error::{PipeError, ProxyError};

const TARGET: &str = "debugproxy.proxy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    DebuggerToIde,
    IdeToDebugger,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::DebuggerToIde => f.write_str("debugger->ide"),
            Direction::IdeToDebugger => f.write_str("ide->debugger"),
        }
    }
}

/// Bytes written to each side over the lifetime of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStats {
    /// Debugger -> IDE.
    pub sent_bytes: u64,
    /// IDE -> debugger.
    pub received_bytes: u64,
}

pub struct Proxy {
    debugger: TcpStream,
    ide_addr: SocketAddr,
    config: Arc<Config>,
    mapper: Arc<dyn PathMapper>,
    post_processors: Vec<Arc<dyn PathMapper>>,
}

impl Proxy {
    pub fn new(
        debugger: TcpStream,
        ide_addr: SocketAddr,
        config: Arc<Config>,
        mapper: Arc<dyn PathMapper>,
    ) -> Self {
        Self {
            debugger,
            ide_addr,
            config,
            mapper,
            post_processors: Vec::new(),
        }
    }

    /// Append a mapper that runs after the primary one, in registration order.
    pub fn register_post_processor(&mut self, processor: Arc<dyn PathMapper>) {
        self.post_processors.push(processor);
    }

    /// Relay until either side goes away.
    ///
    /// Pipe failures end the connection and are logged here; only a failure
    /// to reach the IDE is returned.
    pub async fn start(self) -> Result<ProxyStats, ProxyError> {
        let peer = self
            .debugger
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_owned());
        let span = tracing::info_span!(
            target: TARGET,
            "connection",
            context = %self.config.context,
            peer = %peer,
        );
        let lifecycle = self.config.verbose || self.config.very_verbose;

        let ide = match TcpStream::connect(self.ide_addr).await {
            Ok(ide) => ide,
            Err(source) => {
                if lifecycle {
                    tracing::warn!(target: TARGET, parent: &span, ide = %self.ide_addr, error = %source, "can't connect to IDE");
                } else {
                    tracing::debug!(target: TARGET, parent: &span, ide = %self.ide_addr, error = %source, "can't connect to IDE");
                }
                return Err(ProxyError::Dial {
                    addr: self.ide_addr,
                    source,
                });
            }
        };
        let _ = self.debugger.set_nodelay(true);
        let _ = ide.set_nodelay(true);
        if lifecycle {
            tracing::info!(target: TARGET, parent: &span, ide = %self.ide_addr, "opened");
        }

        let mut chain = Vec::with_capacity(1 + self.post_processors.len());
        chain.push(self.mapper);
        chain.extend(self.post_processors);
        let chain: Arc<[Arc<dyn PathMapper>]> = chain.into();

        let sent = Arc::new(AtomicU64::new(0));
        let received = Arc::new(AtomicU64::new(0));
        let token = CancellationToken::new();
        let (done_tx, mut done_rx) = mpsc::channel(2);

        let (debugger_read, debugger_write) = self.debugger.into_split();
        let (ide_read, ide_write) = ide.into_split();

        let downstream = Pipe {
            direction: Direction::DebuggerToIde,
            dest: ide_write,
            chain: chain.clone(),
            counter: sent.clone(),
            token: token.clone(),
            io_timeout: self.config.io_timeout,
            very_verbose: self.config.very_verbose,
            span: span.clone(),
        };
        let upstream = Pipe {
            direction: Direction::IdeToDebugger,
            dest: debugger_write,
            chain,
            counter: received.clone(),
            token: token.clone(),
            io_timeout: self.config.io_timeout,
            very_verbose: self.config.very_verbose,
            span: span.clone(),
        };

        tokio::spawn(report(
            Direction::DebuggerToIde,
            token.clone(),
            done_tx.clone(),
            relay_frames(debugger_read, downstream),
        ));
        tokio::spawn(report(
            Direction::IdeToDebugger,
            token.clone(),
            done_tx,
            relay_commands(ide_read, upstream),
        ));

        for _ in 0..2 {
            let Some((direction, outcome)) = done_rx.recv().await else {
                break;
            };
            let Err(err) = outcome else { continue };
            if outcome_level(&err) == Level::WARN {
                tracing::warn!(target: TARGET, parent: &span, %direction, error = %err, "connection failed");
            } else {
                tracing::debug!(target: TARGET, parent: &span, %direction, error = %err, "pipe stopped");
            }
        }

        let stats = ProxyStats {
            sent_bytes: sent.load(Ordering::Relaxed),
            received_bytes: received.load(Ordering::Relaxed),
        };
        if lifecycle {
            tracing::info!(
                target: TARGET,
                parent: &span,
                "closed ({} bytes sent, {} bytes received)",
                stats.sent_bytes,
                stats.received_bytes
            );
        }
        Ok(stats)
    }
}

type Outcome = (Direction, Result<(), PipeError>);

/// Either direction may fail on its own, so every unexpected stop is a warning.
fn outcome_level(err: &PipeError) -> Level {
    if err.is_expected() {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

/// Run one pipe to completion, stop its peer and report back to the owner.
async fn report(
    direction: Direction,
    token: CancellationToken,
    done: mpsc::Sender<Outcome>,
    pipe: impl Future<Output = Result<(), PipeError>>,
) {
    let outcome = pipe.await;
    token.cancel();
    let _ = done.send((direction, outcome)).await;
}

/// Debugger side: forward whole DBGp frames.
async fn relay_frames<R, W>(source: R, mut pipe: Pipe<W>) -> Result<(), PipeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FrameReader::new(source);
    loop {
        let frame = guard(&pipe.token, pipe.io_timeout, frames.next_frame()).await?;
        let Some(frame) = frame else {
            return Err(PipeError::Closed);
        };
        pipe.forward(frame).await?;
    }
}

/// IDE side: commands are not length framed, forward each read as is.
async fn relay_commands<R, W>(mut source: R, mut pipe: Pipe<W>) -> Result<(), PipeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = guard(&pipe.token, pipe.io_timeout, source.read(&mut buf)).await?;
        if n == 0 {
            return Err(PipeError::Closed);
        }
        pipe.forward(buf[..n].to_vec()).await?;
    }
}

struct Pipe<W> {
    direction: Direction,
    dest: W,
    chain: Arc<[Arc<dyn PathMapper>]>,
    counter: Arc<AtomicU64>,
    token: CancellationToken,
    io_timeout: Option<Duration>,
    very_verbose: bool,
    span: tracing::Span,
}

impl<W: AsyncWrite + Unpin> Pipe<W> {
    async fn forward(&mut self, message: Vec<u8>) -> Result<(), PipeError> {
        if self.very_verbose {
            tracing::info!(target: TARGET, parent: &self.span, direction = %self.direction, "raw: {}", render_message(&message));
        }

        let chain = self.chain.clone();
        let direction = self.direction;
        let message = tokio::task::spawn_blocking(move || apply_chain(&chain, direction, message))
            .await
            .map_err(PipeError::MapperTask)??;

        if self.very_verbose {
            tracing::info!(target: TARGET, parent: &self.span, direction = %self.direction, "processed: {}", render_message(&message));
        }

        guard(&self.token, self.io_timeout, self.dest.write_all(&message)).await?;
        self.counter.fetch_add(message.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Mappers read the local project tree, so the chain runs off the async workers.
fn apply_chain(
    chain: &[Arc<dyn PathMapper>],
    direction: Direction,
    mut message: Vec<u8>,
) -> Result<Vec<u8>, MapperError> {
    for mapper in chain {
        message = match direction {
            Direction::DebuggerToIde => mapper.apply_mapping_to_xml(message)?,
            Direction::IdeToDebugger => mapper.apply_mapping_to_text_protocol(message)?,
        };
    }
    Ok(message)
}

/// Await socket I/O, giving up on cancellation or once `limit` elapses.
async fn guard<T, E>(
    token: &CancellationToken,
    limit: Option<Duration>,
    io: impl Future<Output = Result<T, E>>,
) -> Result<T, PipeError>
where
    PipeError: From<E>,
{
    let bounded = async {
        match limit {
            Some(limit) => match tokio::time::timeout(limit, io).await {
                Ok(res) => res.map_err(PipeError::from),
                Err(_) => Err(PipeError::Timeout(limit)),
            },
            None => io.await.map_err(PipeError::from),
        }
    };
    tokio::select! {
        _ = token.cancelled() => Err(PipeError::Cancelled),
        res = bounded => res,
    }
}
