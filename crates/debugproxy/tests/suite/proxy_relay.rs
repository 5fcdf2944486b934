use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use debugproxy::ProxyError;
use debugproxy_config::Config;
use debugproxy_dbgp::encode_frame;
use debugproxy_mapper::PathMapper;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::harness::{
    assert_closed, join, passthrough, read_exactly, start_session, Failing, Gate, Recorder, Tag,
    TIMEOUT,
};

const INIT: &[u8] = br#"<?xml version="1.0" encoding="iso-8859-1"?>
<init xmlns="urn:debugger_protocol_v1" fileuri="file:///var/www/Web/index.php" language="PHP" protocol_version="1.0" appid="42" idekey="PHPSTORM"></init>"#;

fn config() -> Config {
    Config::new("dummy", "").with_context("Development")
}

#[tokio::test]
async fn relays_both_directions_and_counts_bytes() {
    let mut session = start_session(config(), passthrough(), Vec::new()).await;

    let frame = encode_frame(INIT);
    session.debugger.write_all(&frame).await.unwrap();
    assert_eq!(read_exactly(&mut session.ide, frame.len()).await, frame);

    let command = b"feature_set -i 1 -n max_depth -v 1\0";
    session.ide.write_all(command).await.unwrap();
    assert_eq!(read_exactly(&mut session.debugger, command.len()).await, command);

    let reply = encode_frame(br#"<response command="feature_set" transaction_id="1" success="1"/>"#);
    session.debugger.write_all(&reply).await.unwrap();
    assert_eq!(read_exactly(&mut session.ide, reply.len()).await, reply);

    let stats = session.finish().await.unwrap();
    assert_eq!(stats.sent_bytes, (frame.len() + reply.len()) as u64);
    assert_eq!(stats.received_bytes, command.len() as u64);
}

#[tokio::test]
async fn reassembles_frames_split_across_reads() {
    let recorder = Arc::new(Recorder::default());
    let mut session = start_session(config(), recorder.clone(), Vec::new()).await;

    let frame = encode_frame(INIT);
    for chunk in [&frame[..1], &frame[1..5], &frame[5..40], &frame[40..]] {
        session.debugger.write_all(chunk).await.unwrap();
        session.debugger.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(read_exactly(&mut session.ide, frame.len()).await, frame);

    let stats = session.finish().await.unwrap();
    assert_eq!(*recorder.xml.lock().unwrap(), vec![frame.clone()]);
    assert_eq!(stats.sent_bytes, frame.len() as u64);
}

#[tokio::test]
async fn maps_each_frame_of_a_single_read() {
    let recorder = Arc::new(Recorder::default());
    let mut session = start_session(config(), recorder.clone(), Vec::new()).await;

    let first = encode_frame(br#"<response command="run" status="break"/>"#);
    let second = encode_frame(br#"<response command="stack_get"/>"#);
    let both = [first.clone(), second.clone()].concat();
    session.debugger.write_all(&both).await.unwrap();
    assert_eq!(read_exactly(&mut session.ide, both.len()).await, both);

    session.finish().await.unwrap();
    assert_eq!(*recorder.xml.lock().unwrap(), vec![first, second]);
}

#[tokio::test]
async fn large_frames_span_many_reads() {
    let mut session = start_session(config(), passthrough(), Vec::new()).await;

    let payload = vec![b'x'; 300_000];
    let frame = encode_frame(&payload);
    let mut debugger = session.debugger;
    let writer = tokio::spawn(async move {
        debugger.write_all(&frame).await.unwrap();
        debugger
    });
    let received = read_exactly(&mut session.ide, encode_frame(&payload).len()).await;
    assert_eq!(received, encode_frame(&payload));

    session.debugger = writer.await.unwrap();
    session.finish().await.unwrap();
}

#[tokio::test]
async fn slow_mapper_does_not_stall_the_other_direction() {
    let (gate, open) = Gate::closed();
    let mut session = start_session(config(), gate.clone(), Vec::new()).await;

    let frame = encode_frame(INIT);
    session.debugger.write_all(&frame).await.unwrap();
    tokio::time::timeout(TIMEOUT, gate.entered.notified())
        .await
        .expect("mapper sees the frame");

    let command = b"status -i 1\0";
    session.ide.write_all(command).await.unwrap();
    assert_eq!(read_exactly(&mut session.debugger, command.len()).await, command);

    open.send(()).unwrap();
    assert_eq!(read_exactly(&mut session.ide, frame.len()).await, frame);
    assert!(gate.released.load(Ordering::SeqCst));

    session.finish().await.unwrap();
}

#[tokio::test]
async fn post_processors_run_after_the_mapper_in_order() {
    let post_processors: Vec<Arc<dyn PathMapper>> = vec![Arc::new(Tag(b'2')), Arc::new(Tag(b'3'))];
    let mut session = start_session(config(), Arc::new(Tag(b'1')), post_processors).await;

    session.ide.write_all(b"run -i 7\0").await.unwrap();
    assert_eq!(read_exactly(&mut session.debugger, 12).await, b"run -i 7\0123");

    let stats = session.finish().await.unwrap();
    assert_eq!(stats.received_bytes, 12);
}

#[tokio::test]
async fn mapper_error_closes_both_sides() {
    let mut session = start_session(config(), Arc::new(Failing), Vec::new()).await;

    session.debugger.write_all(&encode_frame(INIT)).await.unwrap();

    assert_closed(&mut session.ide).await;
    assert_closed(&mut session.debugger).await;
    let stats = join(session.proxy).await.unwrap();
    assert_eq!(stats.sent_bytes, 0);
}

#[tokio::test]
async fn malformed_length_prefix_terminates_the_connection() {
    let mut session = start_session(config(), passthrough(), Vec::new()).await;

    session.debugger.write_all(b"12x\0<init/>\0").await.unwrap();

    assert_closed(&mut session.ide).await;
    assert_closed(&mut session.debugger).await;
    let stats = join(session.proxy).await.unwrap();
    assert_eq!(stats.sent_bytes, 0);
}

#[tokio::test]
async fn ide_disconnect_closes_the_debugger() {
    let mut session = start_session(config(), passthrough(), Vec::new()).await;

    drop(session.ide);

    assert_closed(&mut session.debugger).await;
    join(session.proxy).await.unwrap();
}

#[tokio::test]
async fn idle_connections_time_out_when_configured() {
    let mut config = config();
    config.io_timeout = Some(Duration::from_millis(100));
    let mut session = start_session(config, passthrough(), Vec::new()).await;

    assert_closed(&mut session.ide).await;
    assert_closed(&mut session.debugger).await;
    join(session.proxy).await.unwrap();
}

#[tokio::test]
async fn unreachable_ide_fails_only_this_connection() {
    let ide_addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut debugger = TcpStream::connect(front.local_addr().unwrap()).await.unwrap();
    let (accepted, _) = front.accept().await.unwrap();

    let proxy = debugproxy::Proxy::new(accepted, ide_addr, Arc::new(config()), passthrough());
    let err = tokio::time::timeout(TIMEOUT, proxy.start())
        .await
        .unwrap()
        .unwrap_err();

    match err {
        ProxyError::Dial { addr, .. } => assert_eq!(addr, ide_addr),
    }
    assert_closed(&mut debugger).await;
}
