//! Session-layer integration tests over loopback sockets.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use p2p::{Channel, Connections, Heading, Message, NetworkError, P2p, Settings};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;

const MAGIC: u32 = 0xdab5_bffa;
const MAX_PAYLOAD: usize = 10 * 1024 * 1024;
const WAIT: Duration = Duration::from_secs(5);

async fn loopback_channel() -> (Arc<Channel>, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    let client = TcpStream::connect(address).await.expect("connect");
    let (server, _) = listener.accept().await.expect("accept");
    (Channel::new(server, MAGIC, MAX_PAYLOAD), client)
}

fn frame(magic: u32, command: &str, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Heading::for_payload(magic, command, payload).encode().to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

fn test_settings(dir: &Path) -> Settings {
    Settings {
        inbound_port: 0,
        outbound_connections: 0,
        seeds: Vec::new(),
        hosts_file: dir.join("hosts.cache"),
        ..Settings::default()
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind")
        .local_addr()
        .expect("address")
        .port()
}

#[tokio::test]
async fn ping_frame_reaches_the_subscriber_exactly_once() {
    let (channel, mut client) = loopback_channel().await;
    let mut messages = channel.subscribe().expect("subscribe");
    channel.start().expect("start");

    client
        .write_all(&frame(MAGIC, "ping", &Message::Ping(7).encode_payload()))
        .await
        .expect("write");

    let message = timeout(WAIT, messages.recv())
        .await
        .expect("timely")
        .expect("delivered");
    assert_eq!(message, Message::Ping(7));

    // Nothing else arrives for a single frame.
    assert!(timeout(Duration::from_millis(200), messages.recv())
        .await
        .is_err());
    channel.stop(NetworkError::ServiceStopped);
}

#[tokio::test]
async fn unknown_commands_are_skipped_without_fault() {
    let (channel, mut client) = loopback_channel().await;
    let mut messages = channel.subscribe().expect("subscribe");
    channel.start().expect("start");

    let mut bytes = frame(MAGIC, "sendheaders", b"");
    bytes.extend_from_slice(&frame(MAGIC, "pong", &Message::Pong(3).encode_payload()));
    client.write_all(&bytes).await.expect("write");

    let message = timeout(WAIT, messages.recv())
        .await
        .expect("timely")
        .expect("delivered");
    assert_eq!(message, Message::Pong(3));
    assert!(!channel.stopped());
    channel.stop(NetworkError::ServiceStopped);
}

#[tokio::test]
async fn oversized_payload_stops_the_channel_before_reading_it() {
    let (channel, mut client) = loopback_channel().await;
    let mut stops = channel.subscribe_stop().expect("subscribe");
    channel.start().expect("start");

    // Declare one byte past the cap; send no payload at all.
    let heading = Heading {
        magic: MAGIC,
        command: "block".to_string(),
        payload_size: (MAX_PAYLOAD + 1) as u32,
        checksum: 0,
    };
    client.write_all(&heading.encode()).await.expect("write");

    let code = timeout(WAIT, stops.recv())
        .await
        .expect("timely")
        .expect("code");
    assert!(matches!(code, NetworkError::BadStream));
    assert!(channel.stopped());
}

#[tokio::test]
async fn payload_at_the_cap_is_accepted_one_past_is_not() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    let mut client = TcpStream::connect(address).await.expect("connect");
    let (server, _) = listener.accept().await.expect("accept");

    let cap = 64usize;
    let channel = Channel::new(server, MAGIC, cap);
    let mut messages = channel.subscribe().expect("subscribe");
    let mut stops = channel.subscribe_stop().expect("subscribe");
    channel.start().expect("start");

    // Exactly at the cap: an unknown command is skipped, the channel
    // keeps reading.
    let mut bytes = frame(MAGIC, "filler", &vec![0u8; cap]);
    bytes.extend_from_slice(&frame(MAGIC, "ping", &Message::Ping(11).encode_payload()));
    client.write_all(&bytes).await.expect("write");
    let message = timeout(WAIT, messages.recv())
        .await
        .expect("timely")
        .expect("delivered");
    assert_eq!(message, Message::Ping(11));

    // One byte past the cap faults the stream.
    client
        .write_all(&frame(MAGIC, "filler", &vec![0u8; cap + 1]))
        .await
        .expect("write");
    let code = timeout(WAIT, stops.recv())
        .await
        .expect("timely")
        .expect("code");
    assert!(matches!(code, NetworkError::BadStream));
}

#[tokio::test]
async fn wrong_magic_stops_the_channel() {
    let (channel, mut client) = loopback_channel().await;
    let mut stops = channel.subscribe_stop().expect("subscribe");
    channel.start().expect("start");

    client
        .write_all(&frame(MAGIC ^ 1, "ping", &Message::Ping(1).encode_payload()))
        .await
        .expect("write");

    let code = timeout(WAIT, stops.recv())
        .await
        .expect("timely")
        .expect("code");
    assert!(matches!(code, NetworkError::BadStream));
}

#[tokio::test]
async fn corrupt_checksum_stops_the_channel() {
    let (channel, mut client) = loopback_channel().await;
    let mut stops = channel.subscribe_stop().expect("subscribe");
    channel.start().expect("start");

    let mut bytes = frame(MAGIC, "ping", &Message::Ping(9).encode_payload());
    bytes[20] ^= 0xff;
    client.write_all(&bytes).await.expect("write");

    let code = timeout(WAIT, stops.recv())
        .await
        .expect("timely")
        .expect("code");
    assert!(matches!(code, NetworkError::BadStream));
}

#[tokio::test]
async fn stopped_channel_refuses_sends_and_closes_subscriptions() {
    let (channel, _client) = loopback_channel().await;
    let mut messages = channel.subscribe().expect("subscribe");
    channel.start().expect("start");

    channel.stop(NetworkError::ServiceStopped);
    // Stop is idempotent.
    channel.stop(NetworkError::BadStream);

    assert!(matches!(
        channel.send(&Message::Ping(1)).await,
        Err(NetworkError::ChannelStopped)
    ));
    assert!(matches!(messages.recv().await, Err(RecvError::Closed)));
    assert!(channel.subscribe().is_err());
    assert!(channel.subscribe_stop().is_err());
}

#[tokio::test]
async fn start_is_rejected_while_running() {
    let (channel, _client) = loopback_channel().await;
    channel.start().expect("start");
    assert!(matches!(
        channel.start(),
        Err(NetworkError::OperationFailed)
    ));
    channel.stop(NetworkError::ServiceStopped);
}

#[tokio::test]
async fn connections_hold_one_channel_per_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");

    // Two outbound sockets towards the same endpoint share an
    // authority.
    let first = TcpStream::connect(address).await.expect("connect");
    listener.accept().await.expect("accept");
    let second = TcpStream::connect(address).await.expect("connect");
    listener.accept().await.expect("accept");

    let one = Channel::new(first, MAGIC, MAX_PAYLOAD);
    let two = Channel::new(second, MAGIC, MAX_PAYLOAD);

    let connections = Connections::new();
    connections.store(Arc::clone(&one)).expect("store");
    assert!(matches!(
        connections.store(Arc::clone(&two)),
        Err(NetworkError::AddressInUse)
    ));
    // The incumbent is untouched by the refused duplicate.
    assert!(!one.stopped());
    assert_eq!(connections.count(), 1);
    assert!(connections.exists(&address));

    // A stale handle cannot evict the stored channel.
    assert!(matches!(
        connections.remove(&two),
        Err(NetworkError::NotFound)
    ));
    connections.remove(&one).expect("remove");
    assert_eq!(connections.count(), 0);
}

#[tokio::test]
async fn connections_stop_cascades_to_every_channel() {
    let (one, _a) = loopback_channel().await;
    let (two, _b) = loopback_channel().await;
    let connections = Connections::new();
    connections.store(Arc::clone(&one)).expect("store");
    connections.store(Arc::clone(&two)).expect("store");

    connections.stop(NetworkError::ServiceStopped);
    assert!(one.stopped());
    assert!(two.stopped());
    assert_eq!(connections.count(), 0);
}

#[tokio::test]
async fn manager_lifecycle_is_idempotent_on_stop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let node = P2p::new(test_settings(dir.path()));

    node.start().await.expect("start");
    assert!(matches!(
        node.start().await,
        Err(NetworkError::OperationFailed)
    ));
    node.run().await.expect("run");

    node.stop().await.expect("stop");
    node.stop().await.expect("second stop");
    assert!(node.stopped());
    // The first stop persisted the host store.
    assert!(dir.path().join("hosts.cache").exists());
    assert!(matches!(node.run().await, Err(NetworkError::ServiceStopped)));
    assert!(node.subscribe_connections().is_err());
}

#[tokio::test]
async fn manual_connect_is_a_no_op_when_stopped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let node = P2p::new(test_settings(dir.path()));
    node.start().await.expect("start");
    node.stop().await.expect("stop");
    node.connect("127.0.0.1", 1);
    assert_eq!(node.connected_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manual_connect_publishes_channels_on_both_sides() {
    let dir_a = tempfile::tempdir().expect("tempdir");
    let dir_b = tempfile::tempdir().expect("tempdir");
    let port = free_port();

    let mut settings_a = test_settings(dir_a.path());
    settings_a.inbound_port = port;
    let node_a = P2p::new(settings_a);
    node_a.start().await.expect("start a");
    node_a.run().await.expect("run a");
    let mut connections_a = node_a.subscribe_connections().expect("subscribe a");

    let node_b = P2p::new(test_settings(dir_b.path()));
    node_b.start().await.expect("start b");
    let mut connections_b = node_b.subscribe_connections().expect("subscribe b");

    node_b.connect("127.0.0.1", port);

    let outbound = timeout(Duration::from_secs(10), connections_b.recv())
        .await
        .expect("timely")
        .expect("channel");
    assert_eq!(outbound.authority().port(), port);
    assert_eq!(node_b.connected_count(), 1);

    let inbound = timeout(Duration::from_secs(10), connections_a.recv())
        .await
        .expect("timely")
        .expect("channel");
    assert!(!inbound.stopped());
    assert_eq!(node_a.connected_count(), 1);

    // A second manual dial to the same endpoint is refused by the
    // connection set and leaves the incumbent untouched.
    node_b.connect("127.0.0.1", port);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(node_b.connected_count(), 1);
    assert!(!outbound.stopped());

    node_b.stop().await.expect("stop b");
    node_a.stop().await.expect("stop a");
    assert!(outbound.stopped());
}
