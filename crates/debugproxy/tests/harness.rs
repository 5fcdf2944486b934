use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use debugproxy::{Proxy, ProxyError, ProxyStats};
use debugproxy_config::Config;
use debugproxy_mapper::{MapperError, PassthroughMapper, PathMapper, PathMapping, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Both outer ends of one proxied connection.
pub struct Session {
    /// What the debugger engine holds.
    pub debugger: TcpStream,
    /// What the IDE accepted.
    pub ide: TcpStream,
    pub proxy: JoinHandle<std::result::Result<ProxyStats, ProxyError>>,
}

impl Session {
    pub async fn finish(self) -> std::result::Result<ProxyStats, ProxyError> {
        drop(self.debugger);
        drop(self.ide);
        join(self.proxy).await
    }
}

pub async fn join(
    proxy: JoinHandle<std::result::Result<ProxyStats, ProxyError>>,
) -> std::result::Result<ProxyStats, ProxyError> {
    tokio::time::timeout(TIMEOUT, proxy)
        .await
        .expect("proxy finishes")
        .expect("proxy task does not panic")
}

pub async fn start_session(
    config: Config,
    mapper: Arc<dyn PathMapper>,
    post_processors: Vec<Arc<dyn PathMapper>>,
) -> Session {
    let ide_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let front = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let debugger = TcpStream::connect(front.local_addr().unwrap()).await.unwrap();
    let (accepted, _) = front.accept().await.unwrap();

    let mut proxy = Proxy::new(
        accepted,
        ide_listener.local_addr().unwrap(),
        Arc::new(config),
        mapper,
    );
    for processor in post_processors {
        proxy.register_post_processor(processor);
    }
    let proxy = tokio::spawn(proxy.start());

    let (ide, _) = tokio::time::timeout(TIMEOUT, ide_listener.accept())
        .await
        .expect("proxy dials the IDE")
        .unwrap();
    Session {
        debugger,
        ide,
        proxy,
    }
}

pub fn passthrough() -> Arc<dyn PathMapper> {
    Arc::new(PassthroughMapper::new())
}

pub async fn read_exactly(stream: &mut (impl AsyncRead + Unpin), len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("data arrives in time")
        .unwrap();
    buf
}

/// Waits until the peer closes; any bytes still in flight are skipped.
pub async fn assert_closed(stream: &mut (impl AsyncRead + Unpin)) {
    let mut buf = [0u8; 1024];
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await
    .expect("connection is closed");
}

/// Records every message it sees and forwards it unchanged.
#[derive(Default)]
pub struct Recorder {
    pub xml: Mutex<Vec<Vec<u8>>>,
    pub text: Mutex<Vec<Vec<u8>>>,
}

impl PathMapper for Recorder {
    fn initialize(&mut self, _config: Arc<Config>, _span: tracing::Span, _mapping: Arc<PathMapping>) {}

    fn apply_mapping_to_text_protocol(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        self.text.lock().unwrap().push(message.clone());
        Ok(message)
    }

    fn apply_mapping_to_xml(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        self.xml.lock().unwrap().push(message.clone());
        Ok(message)
    }
}

/// Appends its tag byte to every IDE command.
pub struct Tag(pub u8);

impl PathMapper for Tag {
    fn initialize(&mut self, _config: Arc<Config>, _span: tracing::Span, _mapping: Arc<PathMapping>) {}

    fn apply_mapping_to_text_protocol(&self, mut message: Vec<u8>) -> Result<Vec<u8>> {
        message.push(self.0);
        Ok(message)
    }

    fn apply_mapping_to_xml(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        Ok(message)
    }
}

/// Rejects every debugger message.
pub struct Failing;

impl PathMapper for Failing {
    fn initialize(&mut self, _config: Arc<Config>, _span: tracing::Span, _mapping: Arc<PathMapping>) {}

    fn apply_mapping_to_text_protocol(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        Ok(message)
    }

    fn apply_mapping_to_xml(&self, _message: Vec<u8>) -> Result<Vec<u8>> {
        Err(MapperError::Mapping("refusing to map".into()))
    }
}

/// Holds every debugger message until the test opens the gate.
pub struct Gate {
    pub entered: Notify,
    pub released: AtomicBool,
    open: Mutex<mpsc::Receiver<()>>,
}

impl Gate {
    pub fn closed() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let gate = Arc::new(Self {
            entered: Notify::new(),
            released: AtomicBool::new(false),
            open: Mutex::new(rx),
        });
        (gate, tx)
    }
}

impl PathMapper for Gate {
    fn initialize(&mut self, _config: Arc<Config>, _span: tracing::Span, _mapping: Arc<PathMapping>) {}

    fn apply_mapping_to_text_protocol(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        Ok(message)
    }

    fn apply_mapping_to_xml(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        self.entered.notify_one();
        let opened = self.open.lock().unwrap().recv_timeout(TIMEOUT).is_ok();
        self.released.store(opened, Ordering::SeqCst);
        Ok(message)
    }
}
