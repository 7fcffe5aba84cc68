//! Raw socket transport against an in-process TCP peer.

use bench_sweep::transport::{SocketTransport, Transport};
use bench_sweep::BenchError;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Bind a loopback listener and return it with its port.
async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Peer that answers each received line with `respond(line)`, writing nothing for `None`.
async fn spawn_peer<F>(listener: TcpListener, respond: F) -> tokio::task::JoinHandle<Vec<String>>
where
    F: Fn(&str) -> Option<Vec<u8>> + Send + 'static,
{
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut received = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(reply) = respond(&line) {
                write_half.write_all(&reply).await.unwrap();
            }
            received.push(line);
        }
        received
    })
}

#[tokio::test]
async fn identify_returns_trimmed_line() {
    let (listener, port) = listener().await;
    let peer = spawn_peer(listener, |line| {
        (line == "*IDN?").then(|| b"ACME,1234\n".to_vec())
    })
    .await;

    let mut transport = SocketTransport::new("127.0.0.1", port);
    transport.connect().await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(transport.identify().await.unwrap(), "ACME,1234");

    transport.dispose();
    assert!(!transport.is_connected());
    assert_eq!(peer.await.unwrap(), vec!["*IDN?"]);
}

#[tokio::test]
async fn writes_are_newline_terminated_once() {
    let (listener, port) = listener().await;
    let peer = spawn_peer(listener, |_| None).await;

    let mut transport = SocketTransport::new("127.0.0.1", port);
    transport.connect().await.unwrap();
    transport.write(":SOURce1:FREQuency 1000").await.unwrap();
    transport.write(":OUTPut1:STATe ON\n").await.unwrap();
    transport.dispose();

    assert_eq!(
        peer.await.unwrap(),
        vec![":SOURce1:FREQuency 1000", ":OUTPut1:STATe ON"]
    );
}

#[tokio::test]
async fn peer_closing_mid_response_drops_the_connection() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut line = String::new();
        let mut reader = BufReader::new(&mut stream);
        reader.read_line(&mut line).await.unwrap();
        stream.write_all(b"ACME,12").await.unwrap();
    });

    let mut transport = SocketTransport::new("127.0.0.1", port);
    transport.connect().await.unwrap();
    let err = transport.query("*IDN?").await.unwrap_err();
    assert!(matches!(err, BenchError::Io(_)), "got {:?}", err);
    assert!(!transport.is_connected());

    let err = transport.write("*CLS").await.unwrap_err();
    assert!(matches!(err, BenchError::NotConnected(_)));
}

#[tokio::test]
async fn silent_peer_times_out() {
    let (listener, port) = listener().await;
    let _peer = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(stream);
    });

    let mut transport =
        SocketTransport::new("127.0.0.1", port).with_timeout(Duration::from_millis(50));
    transport.connect().await.unwrap();
    match transport.query("*IDN?").await {
        Err(BenchError::Timeout { after, .. }) => assert_eq!(after, Duration::from_millis(50)),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(transport.is_connected());
}

#[tokio::test]
async fn block_query_returns_payload() {
    let (listener, port) = listener().await;
    let _peer = spawn_peer(listener, |line| {
        line.starts_with(":DISPlay:DATA?").then(|| b"#15hello\n".to_vec())
    })
    .await;

    let mut transport = SocketTransport::new("127.0.0.1", port);
    transport.connect().await.unwrap();
    let payload = transport.query_block(":DISPlay:DATA? PNG").await.unwrap();
    assert_eq!(payload, b"hello");
}

#[tokio::test]
async fn blank_commands_are_rejected_before_io() {
    let (listener, port) = listener().await;
    let peer = spawn_peer(listener, |_| None).await;

    let mut transport = SocketTransport::new("127.0.0.1", port);
    transport.connect().await.unwrap();
    assert!(matches!(transport.write("  ").await, Err(BenchError::Argument(_))));
    assert!(matches!(transport.query("").await, Err(BenchError::Argument(_))));
    transport.dispose();

    assert!(peer.await.unwrap().is_empty());
}

#[tokio::test]
async fn refused_connection_is_a_connection_error() {
    let (listener, port) = listener().await;
    drop(listener);

    let mut transport = SocketTransport::new("127.0.0.1", port)
        .with_connect_timeout(Duration::from_millis(500));
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, BenchError::Connection(_)), "got {:?}", err);
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn dispose_is_idempotent() {
    let (listener, port) = listener().await;
    let _peer = spawn_peer(listener, |_| None).await;

    let mut transport = SocketTransport::new("127.0.0.1", port);
    transport.connect().await.unwrap();
    transport.dispose();
    transport.dispose();
    assert!(!transport.is_connected());
    assert!(matches!(
        transport.identify().await,
        Err(BenchError::NotConnected(_))
    ));
}
