//! Transport tests — framing over real sockets, registry lifecycle,
//! send exclusivity, liveness and shutdown ordering.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use litedb_protocol::{DEFAULT_MAX_FRAME_LENGTH, frame_codec};
use litedb_transport::{
    ClientConnection, MessageHandler, TransportConfig, TransportError, TransportServer,
    peer_is_open,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_util::codec::{Decoder, Framed, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

/// Echoes every frame. Frames starting with `slow:` are delayed, frames
/// starting with `wait:` block until cancelled, `silent` gets no reply.
/// `tick:` frames are briefly delayed and counted in `finished`.
#[derive(Default)]
struct EchoHandler {
    handled: AtomicUsize,
    finished: AtomicUsize,
}

impl MessageHandler for EchoHandler {
    async fn handle_message(
        &self,
        _client_id: &str,
        frame: Bytes,
        cancel: CancellationToken,
    ) -> Option<Bytes> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        if frame.starts_with(b"slow:") {
            sleep(Duration::from_millis(200)).await;
        }
        if frame.starts_with(b"tick:") {
            sleep(Duration::from_millis(5)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            return Some(frame);
        }
        if frame.starts_with(b"wait:") {
            cancel.cancelled().await;
            return Some(Bytes::from_static(b"cancelled"));
        }
        if &frame[..] == b"silent" {
            return None;
        }
        Some(frame)
    }
}

fn test_config() -> TransportConfig {
    TransportConfig {
        port: 0,
        ..TransportConfig::default()
    }
}

async fn start_echo(config: TransportConfig) -> (TransportServer, Arc<EchoHandler>) {
    let handler = Arc::new(EchoHandler::default());
    let server = TransportServer::start_shared(config, handler.clone()).await.unwrap();
    (server, handler)
}

async fn connect(server: &TransportServer) -> Framed<TcpStream, LengthDelimitedCodec> {
    let stream = TcpStream::connect(server.local_addr()).await.unwrap();
    Framed::new(stream, frame_codec(DEFAULT_MAX_FRAME_LENGTH))
}

async fn next_frame(framed: &mut Framed<TcpStream, LengthDelimitedCodec>) -> BytesMut {
    timeout(Duration::from_secs(5), framed.next())
        .await
        .expect("Timeout waiting for frame")
        .expect("Stream ended")
        .expect("Read error")
}

fn raw_frame(body: &[u8]) -> Vec<u8> {
    let mut out = (body.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(body);
    out
}

async fn wait_for_clients(server: &TransportServer, expected: usize) {
    timeout(Duration::from_secs(5), async {
        while server.client_count() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("client count never reached {expected}"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Framing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn message_in_single_write_is_echoed() {
    let (server, _) = start_echo(test_config()).await;
    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();

    stream.write_all(&raw_frame(b"hello")).await.unwrap();

    let mut framed = Framed::new(stream, frame_codec(DEFAULT_MAX_FRAME_LENGTH));
    assert_eq!(&next_frame(&mut framed).await[..], b"hello");
    assert_ne!(server.port(), 0);
    assert_eq!(server.port(), server.local_addr().port());
    server.stop().await;
}

#[tokio::test]
async fn fragmented_message_is_reassembled() {
    let (server, handler) = start_echo(test_config()).await;
    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();

    let frame = raw_frame(b"fragmented message");
    for chunk in frame.chunks(3) {
        stream.write_all(chunk).await.unwrap();
        stream.flush().await.unwrap();
        sleep(Duration::from_millis(5)).await;
    }

    let mut framed = Framed::new(stream, frame_codec(DEFAULT_MAX_FRAME_LENGTH));
    assert_eq!(&next_frame(&mut framed).await[..], b"fragmented message");
    assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    server.stop().await;
}

#[tokio::test]
async fn coalesced_messages_are_split() {
    let (server, handler) = start_echo(test_config()).await;
    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();

    let mut both = raw_frame(b"first");
    both.extend_from_slice(&raw_frame(b"second"));
    stream.write_all(&both).await.unwrap();

    let mut framed = Framed::new(stream, frame_codec(DEFAULT_MAX_FRAME_LENGTH));
    let mut received = vec![
        next_frame(&mut framed).await.to_vec(),
        next_frame(&mut framed).await.to_vec(),
    ];
    // Dispatches run concurrently, so responses may arrive in either order.
    received.sort();
    assert_eq!(received, vec![b"first".to_vec(), b"second".to_vec()]);
    assert_eq!(handler.handled.load(Ordering::SeqCst), 2);
    server.stop().await;
}

#[tokio::test]
async fn oversized_frame_drops_connection() {
    let config = TransportConfig {
        max_frame_length: 16,
        ..test_config()
    };
    let (server, handler) = start_echo(config).await;
    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    wait_for_clients(&server, 1).await;

    stream.write_all(&raw_frame(&[b'x'; 64])).await.unwrap();

    wait_for_clients(&server, 0).await;
    assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
    server.stop().await;
}

#[tokio::test]
async fn handler_returning_none_sends_nothing() {
    let (server, _) = start_echo(test_config()).await;
    let mut framed = connect(&server).await;

    futures_util::SinkExt::send(&mut framed, Bytes::from_static(b"silent")).await.unwrap();
    futures_util::SinkExt::send(&mut framed, Bytes::from_static(b"after")).await.unwrap();

    assert_eq!(&next_frame(&mut framed).await[..], b"after");
    server.stop().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn connections_are_registered_and_removed_on_disconnect() {
    let (server, _) = start_echo(test_config()).await;

    let first = connect(&server).await;
    let second = connect(&server).await;
    wait_for_clients(&server, 2).await;

    let ids = server.client_ids();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    let client = server.client(&ids[0]).unwrap();
    assert!(client.is_open());
    assert!(client.remote_addr().ip().is_loopback());

    drop(first);
    wait_for_clients(&server, 1).await;
    drop(second);
    wait_for_clients(&server, 0).await;
    server.stop().await;
}

#[tokio::test]
async fn disconnect_does_not_affect_other_connections() {
    let (server, _) = start_echo(test_config()).await;
    let doomed = connect(&server).await;
    let mut survivor = connect(&server).await;
    wait_for_clients(&server, 2).await;

    drop(doomed);
    wait_for_clients(&server, 1).await;

    futures_util::SinkExt::send(&mut survivor, Bytes::from_static(b"still here")).await.unwrap();
    assert_eq!(&next_frame(&mut survivor).await[..], b"still here");
    server.stop().await;
}

#[tokio::test]
async fn max_connections_rejects_extra_clients() {
    let config = TransportConfig {
        max_connections: Some(1),
        ..test_config()
    };
    let (server, _) = start_echo(config).await;
    let _kept = connect(&server).await;
    wait_for_clients(&server, 1).await;

    let mut rejected = TcpStream::connect(server.local_addr()).await.unwrap();
    let mut buf = [0u8; 1];
    let read = timeout(Duration::from_secs(5), rejected.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)), "rejected socket should be closed");
    assert_eq!(server.client_count(), 1);
    server.stop().await;
}

#[tokio::test]
async fn send_to_unknown_client_fails() {
    let (server, _) = start_echo(test_config()).await;
    let err = server.send("nobody", Bytes::from_static(b"x")).await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectionNotFound(id) if id == "nobody"));
    server.stop().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Sending
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_sends_are_never_interleaved() {
    let (server, _) = start_echo(test_config()).await;
    let server = Arc::new(server);
    let mut framed = connect(&server).await;
    wait_for_clients(&server, 1).await;
    let client_id = server.client_ids().remove(0);

    let mut tasks = Vec::new();
    for i in 0..16u8 {
        let server = server.clone();
        let client_id = client_id.clone();
        tasks.push(tokio::spawn(async move {
            let body = Bytes::from(vec![b'a' + i; 64 * 1024]);
            server.send(&client_id, body).await.unwrap();
        }));
    }

    let mut seen = Vec::new();
    for _ in 0..16 {
        let frame = next_frame(&mut framed).await;
        assert_eq!(frame.len(), 64 * 1024);
        let first = frame[0];
        assert!(frame.iter().all(|b| *b == first), "frame bytes were interleaved");
        seen.push(first);
    }
    for task in tasks {
        task.await.unwrap();
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 16);
    server.stop().await;
}

async fn connection_pair() -> (ClientConnection, OwnedReadHalf, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let peer = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
    let (accepted, addr) = listener.accept().await.unwrap();
    let (read_half, write_half) = accepted.into_split();
    let writer = FramedWrite::new(write_half, frame_codec(DEFAULT_MAX_FRAME_LENGTH));
    (ClientConnection::new("test".into(), addr, writer), read_half, peer)
}

#[tokio::test]
async fn cancelled_send_releases_the_write_lock() {
    let (connection, _read, peer) = connection_pair().await;

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = connection
        .send_until(Bytes::from_static(b"never"), &cancelled)
        .await;
    // The write may win the race with an already-fired token; either way the
    // lock must be free afterwards.
    assert!(matches!(err, Ok(()) | Err(TransportError::Cancelled)));

    timeout(Duration::from_secs(5), connection.send(Bytes::from_static(b"after")))
        .await
        .expect("send deadlocked on the write lock")
        .unwrap();

    let mut framed = Framed::new(peer, frame_codec(DEFAULT_MAX_FRAME_LENGTH));
    let mut last = next_frame(&mut framed).await;
    if &last[..] == b"never" {
        last = next_frame(&mut framed).await;
    }
    assert_eq!(&last[..], b"after");
}

#[tokio::test]
async fn close_is_idempotent_and_rejects_later_sends() {
    let (connection, _read, _peer) = connection_pair().await;
    connection.close().await;
    connection.close().await;
    assert!(!connection.is_open());
    let err = connection.send(Bytes::from_static(b"x")).await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectionClosed(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Liveness
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn liveness_probe_detects_orderly_close() {
    let (connection, read, peer) = connection_pair().await;
    assert!(connection.is_connected(read.as_ref()));

    drop(peer);
    timeout(Duration::from_secs(5), async {
        while peer_is_open(read.as_ref()) {
            read.readable().await.unwrap();
        }
    })
    .await
    .expect("peer close was never observed");
    assert!(!connection.is_connected(read.as_ref()));
}

#[tokio::test]
async fn liveness_probe_keeps_pending_data_alive() {
    let (connection, read, mut peer) = connection_pair().await;
    peer.write_all(b"pending").await.unwrap();
    read.readable().await.unwrap();
    assert!(connection.is_connected(read.as_ref()));
}

// ─────────────────────────────────────────────────────────────────────────────
// Shutdown
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_lets_in_flight_commands_finish() {
    let (server, _) = start_echo(test_config()).await;
    let mut framed = connect(&server).await;
    wait_for_clients(&server, 1).await;

    futures_util::SinkExt::send(&mut framed, Bytes::from_static(b"slow:work")).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    server.stop().await;

    assert_eq!(&next_frame(&mut framed).await[..], b"slow:work");
    assert_eq!(server.client_count(), 0);
    assert!(!server.is_running());
}

#[tokio::test]
async fn stop_cancels_commands_after_grace_period() {
    let config = TransportConfig {
        shutdown_grace: Duration::from_millis(50),
        ..test_config()
    };
    let (server, _) = start_echo(config).await;
    let mut framed = connect(&server).await;
    wait_for_clients(&server, 1).await;

    futures_util::SinkExt::send(&mut framed, Bytes::from_static(b"wait:forever")).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    timeout(Duration::from_secs(5), server.stop()).await.expect("stop hung");

    assert_eq!(&next_frame(&mut framed).await[..], b"cancelled");
}

#[tokio::test]
async fn stop_waits_for_every_dispatched_frame() {
    let (server, handler) = start_echo(test_config()).await;
    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    wait_for_clients(&server, 1).await;

    let mut burst = Vec::new();
    for i in 0..200 {
        burst.extend_from_slice(&raw_frame(format!("tick:{i}").as_bytes()));
    }
    stream.write_all(&burst).await.unwrap();
    server.stop().await;

    // Every dispatch that started before `stop` returned has finished, and
    // none start afterwards.
    let started = handler.handled.load(Ordering::SeqCst);
    assert_eq!(handler.finished.load(Ordering::SeqCst), started);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(handler.handled.load(Ordering::SeqCst), started);
    assert_eq!(handler.finished.load(Ordering::SeqCst), started);
}

#[tokio::test]
async fn stop_twice_is_a_no_op() {
    let (server, _) = start_echo(test_config()).await;
    let mut framed = connect(&server).await;
    wait_for_clients(&server, 1).await;

    server.stop().await;
    server.stop().await;

    assert_eq!(server.client_count(), 0);
    let end = timeout(Duration::from_secs(5), framed.next()).await.unwrap();
    assert!(matches!(end, None | Some(Err(_))), "connection should be closed");
    assert!(!server.is_running());
}

#[test]
fn frame_helper_matches_codec() {
    let mut codec = frame_codec(DEFAULT_MAX_FRAME_LENGTH);
    let mut buf = BytesMut::from(&raw_frame(b"abc")[..]);
    assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"abc");
}
