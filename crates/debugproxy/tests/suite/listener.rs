use std::fs;

use debugproxy::{ConfigurationError, ListenSpec, ListenerSet};
use debugproxy_config::Config;
use debugproxy_dbgp::{decode_frame, encode_frame};
use debugproxy_mapper::MapperError;
use debugproxy_mapper_builtins::builtin_registry;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::harness::{assert_closed, read_exactly, TIMEOUT};

fn spec(context: &str) -> ListenSpec {
    ListenSpec {
        context: context.to_owned(),
        port: 0,
    }
}

async fn ide() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn accept(listener: &TcpListener) -> TcpStream {
    tokio::time::timeout(TIMEOUT, listener.accept())
        .await
        .expect("proxy dials the IDE")
        .unwrap()
        .0
}

#[tokio::test]
async fn unsupported_framework_is_fatal() {
    let (_ide, ide_addr) = ide().await;
    let config = Config::new("symfony", "");

    let err = ListenerSet::bind(&config, &[spec("Development")], &ide_addr, &builtin_registry())
        .await
        .err()
        .expect("symfony has no mapper");

    match err {
        ConfigurationError::Mapper(MapperError::UnsupportedFramework { framework, .. }) => {
            assert_eq!(framework, "symfony")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unresolvable_ide_is_fatal() {
    let config = Config::new("dummy", "");

    let err = ListenerSet::bind(&config, &[spec("Development")], "no port here", &builtin_registry())
        .await
        .err()
        .expect("address without port");

    assert!(matches!(err, ConfigurationError::ResolveIde { .. }), "{err}");
}

#[tokio::test]
async fn port_in_use_is_fatal() {
    let (_ide, ide_addr) = ide().await;
    let taken = TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();
    let config = Config::new("dummy", "");
    let spec = ListenSpec {
        context: "Development".into(),
        port,
    };

    let err = ListenerSet::bind(&config, &[spec], &ide_addr, &builtin_registry())
        .await
        .err()
        .expect("port is taken");

    match err {
        ConfigurationError::Bind { context, .. } => assert_eq!(context, "Development"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn contexts_accept_independently() {
    let (ide_listener, ide_addr) = ide().await;
    let config = Config::new("dummy", "");
    let listeners = ListenerSet::bind(
        &config,
        &[spec("Development"), spec("Production")],
        &ide_addr,
        &builtin_registry(),
    )
    .await
    .unwrap();
    assert_eq!(listeners.ide_addr(), ide_listener.local_addr().unwrap());
    let addrs = listeners.local_addrs();
    assert_eq!(addrs[0].0, "Development");
    assert_eq!(addrs[1].0, "Production");

    let shutdown = CancellationToken::new();
    let running = tokio::spawn(listeners.run(shutdown.clone()));

    // The first session stays open while the second one is served.
    let mut development = TcpStream::connect(("127.0.0.1", addrs[0].1.port())).await.unwrap();
    let mut development_ide = accept(&ide_listener).await;
    let mut production = TcpStream::connect(("127.0.0.1", addrs[1].1.port())).await.unwrap();
    let mut production_ide = accept(&ide_listener).await;

    let frame = encode_frame(b"<init appid=\"2\"/>");
    production.write_all(&frame).await.unwrap();
    assert_eq!(read_exactly(&mut production_ide, frame.len()).await, frame);

    let frame = encode_frame(b"<init appid=\"1\"/>");
    development.write_all(&frame).await.unwrap();
    assert_eq!(read_exactly(&mut development_ide, frame.len()).await, frame);

    drop(production);
    assert_closed(&mut production_ide).await;

    shutdown.cancel();
    tokio::time::timeout(TIMEOUT, running).await.unwrap().unwrap();
}

#[tokio::test]
async fn flow_mapper_rewrites_debugger_paths() {
    let root = tempfile::tempdir().unwrap();
    let local = root.path().to_str().unwrap().to_owned();
    let class = "Packages/Application/Acme.Shop/Classes/Domain/Cart.php";
    let local_class = root.path().join(class);
    fs::create_dir_all(local_class.parent().unwrap()).unwrap();
    fs::write(&local_class, "<?php\n").unwrap();

    let (ide_listener, ide_addr) = ide().await;
    let config = Config::new("flow", format!("{local}/"));
    let listeners = ListenerSet::bind(&config, &[spec("Development")], &ide_addr, &builtin_registry())
        .await
        .unwrap();
    let port = listeners.local_addrs()[0].1.port();
    let mapping = listeners.mapping("Development").unwrap();
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(listeners.run(shutdown.clone()));

    let mut debugger = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut ide = accept(&ide_listener).await;

    let remote = "/var/www/Packages/Application/Acme.Shop/Classes/Acme/Shop/Domain/Cart.php";
    let payload = format!(r#"<response command="stack_get"><stack level="0" filename="file://{remote}" lineno="3"/></response>"#);
    debugger.write_all(&encode_frame(payload.as_bytes())).await.unwrap();

    let expected = payload.replace(remote, &format!("{local}/{class}"));
    let framed = encode_frame(expected.as_bytes());
    let received = read_exactly(&mut ide, framed.len()).await;
    assert_eq!(decode_frame(&received).unwrap(), expected.as_bytes());
    assert_eq!(mapping.remote_root().as_deref(), Some("/var/www"));

    shutdown.cancel();
    tokio::time::timeout(TIMEOUT, running).await.unwrap().unwrap();
}
