//! Socket-level scenarios: a real broker on an ephemeral port, driven by
//! raw MQTT 3.1.1 frames.

use std::net::SocketAddr;
use std::time::Duration;

use gnat_broker::config::BrokerConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

const CONNECT: &[u8] = &[
    0x10, 0x0C, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x00, 0x00, 0x3C, 0x00, 0x00,
];
const CONNACK: &[u8] = &[0x20, 0x02, 0x00, 0x00];
const DISCONNECT: &[u8] = &[0xE0, 0x00];
const PINGREQ: &[u8] = &[0xC0, 0x00];
const PINGRESP: &[u8] = &[0xD0, 0x00];

async fn start_broker(overrides: &str) -> SocketAddr {
    let config: BrokerConfig =
        toml::from_str(&format!("[http]\nenabled = false\n{overrides}")).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(gnat_broker::serve(config, listener));
    return addr;
}

struct RawClient {
    stream: TcpStream,
}

impl RawClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        return Self { stream };
    }

    /// Connects and completes the CONNECT/CONNACK handshake.
    async fn handshake(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(CONNECT).await;
        client.expect(CONNACK).await;
        return client;
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Reads exactly the expected frame; exact reads keep back-to-back
    /// broker replies from blurring together.
    async fn expect(&mut self, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        timeout(Duration::from_secs(2), self.stream.read_exact(&mut buf))
            .await
            .expect("Timed out waiting for the broker")
            .expect("Broker closed the connection early");
        assert_eq!(buf, expected);
    }

    /// Asserts the broker stays silent for a beat.
    async fn expect_nothing(&mut self) {
        let mut buf = [0u8; 64];
        match timeout(Duration::from_millis(300), self.stream.read(&mut buf)).await {
            Err(_) => {}
            Ok(Ok(0)) => panic!("Broker closed the connection"),
            Ok(Ok(n)) => panic!("Unexpected bytes from the broker: {:02X?}", &buf[..n]),
            Ok(Err(err)) => panic!("Transport error: {err}"),
        }
    }

    /// Waits for the broker to drop the connection, draining anything it
    /// still writes on the way out.
    async fn expect_closed(&mut self, within: Duration) {
        let mut buf = [0u8; 256];
        let result = timeout(within, async {
            loop {
                match self.stream.read(&mut buf).await {
                    Ok(0) => return,
                    Ok(_) => continue,
                    Err(_) => return,
                }
            }
        })
        .await;
        result.expect("Broker did not close the connection in time");
    }
}

fn subscribe_frame(pid: u16, filter: &str, qos: u8) -> Vec<u8> {
    let mut frame = vec![0x82, (2 + 2 + filter.len() + 1) as u8];
    frame.extend_from_slice(&pid.to_be_bytes());
    frame.extend_from_slice(&(filter.len() as u16).to_be_bytes());
    frame.extend_from_slice(filter.as_bytes());
    frame.push(qos);
    return frame;
}

fn publish_frame(flags: u8, topic: &str, pid: Option<u16>, payload: &[u8]) -> Vec<u8> {
    let rest = 2 + topic.len() + if pid.is_some() { 2 } else { 0 } + payload.len();
    let mut frame = vec![0x30 | flags, rest as u8];
    frame.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    frame.extend_from_slice(topic.as_bytes());
    if let Some(pid) = pid {
        frame.extend_from_slice(&pid.to_be_bytes());
    }
    frame.extend_from_slice(payload);
    return frame;
}

fn suback_frame(pid: u16, granted: u8) -> Vec<u8> {
    return vec![0x90, 0x03, (pid >> 8) as u8, pid as u8, granted];
}

// A bare CONNECT is answered with an accepting CONNACK.
#[tokio::test]
async fn connect_is_acknowledged() {
    let addr = start_broker("").await;
    let _client = RawClient::handshake(addr).await;
}

// A QoS 0 PUBLISH is forwarded verbatim to a matching subscriber.
#[tokio::test]
async fn qos0_publish_reaches_subscribers() {
    let addr = start_broker("").await;

    let mut subscriber = RawClient::handshake(addr).await;
    subscriber.send(&subscribe_frame(1, "test", 0)).await;
    subscriber.expect(&suback_frame(1, 0)).await;

    let mut publisher = RawClient::handshake(addr).await;
    publisher.send(&publish_frame(0, "test", None, b"hi!")).await;

    subscriber.expect(&publish_frame(0, "test", None, b"hi!")).await;
}

// SUBSCRIBE replays the retained store with RETAIN set.
#[tokio::test]
async fn subscribe_replays_retained_messages() {
    let addr = start_broker("").await;

    let mut publisher = RawClient::handshake(addr).await;
    publisher.send(&publish_frame(0x01, "temp", None, b"21")).await;
    sleep(Duration::from_millis(100)).await;

    let mut subscriber = RawClient::handshake(addr).await;
    subscriber.send(&subscribe_frame(1, "temp", 0)).await;
    subscriber.expect(&suback_frame(1, 0)).await;
    subscriber.expect(&publish_frame(0x01, "temp", None, b"21")).await;
}

// An empty retained payload deletes the topic.
#[tokio::test]
async fn empty_retained_publish_clears_the_topic() {
    let addr = start_broker("").await;

    let mut publisher = RawClient::handshake(addr).await;
    publisher.send(&publish_frame(0x01, "temp", None, b"21")).await;
    publisher.send(&publish_frame(0x01, "temp", None, b"")).await;
    sleep(Duration::from_millis(100)).await;

    let mut subscriber = RawClient::handshake(addr).await;
    subscriber.send(&subscribe_frame(1, "temp", 0)).await;
    subscriber.expect(&suback_frame(1, 0)).await;
    subscriber.expect_nothing().await;
}

// QoS 1 PUBLISH round-trip, including the idempotent DUP retry.
#[tokio::test]
async fn qos1_publish_is_acknowledged() {
    let addr = start_broker("").await;
    let mut publisher = RawClient::handshake(addr).await;

    publisher.send(&publish_frame(0x02, "test", Some(7), b"hi!")).await;
    publisher.expect(&[0x40, 0x02, 0x00, 0x07]).await;

    // the client never saw the PUBACK and retries with DUP set; the broker
    // acknowledges again
    publisher.send(&publish_frame(0x0A, "test", Some(7), b"hi!")).await;
    publisher.expect(&[0x40, 0x02, 0x00, 0x07]).await;
}

// The full QoS 2 exchange: delivery deferred to the
// PUBREL, and a DUP retransmission that must not double-deliver.
#[tokio::test]
async fn qos2_delivers_exactly_once() {
    let addr = start_broker("").await;

    let mut subscriber = RawClient::handshake(addr).await;
    subscriber.send(&subscribe_frame(1, "test", 0)).await;
    subscriber.expect(&suback_frame(1, 0)).await;

    let mut publisher = RawClient::handshake(addr).await;
    publisher.send(&publish_frame(0x04, "test", Some(9), b"hi!")).await;
    publisher.expect(&[0x50, 0x02, 0x00, 0x09]).await;

    // nothing reaches subscribers before the PUBREL
    subscriber.expect_nothing().await;

    // a duplicate of the same PUBLISH only re-triggers the PUBREC
    publisher.send(&publish_frame(0x0C, "test", Some(9), b"hi!")).await;
    publisher.expect(&[0x50, 0x02, 0x00, 0x09]).await;

    publisher.send(&[0x62, 0x02, 0x00, 0x09]).await;
    publisher.expect(&[0x70, 0x02, 0x00, 0x09]).await;

    subscriber.expect(&publish_frame(0, "test", None, b"hi!")).await;
    subscriber.expect_nothing().await;
}

// The will fires on an ungraceful close...
#[tokio::test]
async fn will_fires_on_ungraceful_close() {
    let addr = start_broker("").await;

    let mut watcher = RawClient::handshake(addr).await;
    watcher.send(&subscribe_frame(1, "bye", 0)).await;
    watcher.expect(&suback_frame(1, 0)).await;

    let mut doomed = RawClient::connect(addr).await;
    doomed
        .send(&[
            0x10, 0x17, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x04, 0x00, 0x3C, 0x00, 0x00,
            0x00, 0x03, b'b', b'y', b'e', 0x00, 0x04, b'g', b'o', b'n', b'e',
        ])
        .await;
    doomed.expect(CONNACK).await;
    drop(doomed);

    watcher.expect(&publish_frame(0, "bye", None, b"gone")).await;
}

// ...and a clean DISCONNECT suppresses it.
#[tokio::test]
async fn disconnect_suppresses_the_will() {
    let addr = start_broker("").await;

    let mut watcher = RawClient::handshake(addr).await;
    watcher.send(&subscribe_frame(1, "bye", 0)).await;
    watcher.expect(&suback_frame(1, 0)).await;

    let mut doomed = RawClient::connect(addr).await;
    doomed
        .send(&[
            0x10, 0x17, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x04, 0x00, 0x3C, 0x00, 0x00,
            0x00, 0x03, b'b', b'y', b'e', 0x00, 0x04, b'g', b'o', b'n', b'e',
        ])
        .await;
    doomed.expect(CONNACK).await;
    doomed.send(DISCONNECT).await;
    drop(doomed);

    watcher.expect_nothing().await;
}

// 1.5x the keep-alive interval of silence closes the session.
#[tokio::test]
async fn keep_alive_timeout_closes_the_session() {
    let addr = start_broker("").await;

    let mut client = RawClient::connect(addr).await;
    // keep alive of one second
    client
        .send(&[
            0x10, 0x0C, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x00, 0x00, 0x01, 0x00, 0x00,
        ])
        .await;
    client.expect(CONNACK).await;

    client.expect_closed(Duration::from_secs(3)).await;
}

// PINGREQ refreshes the keep-alive window.
#[tokio::test]
async fn pingreq_counts_as_activity() {
    let addr = start_broker("").await;

    let mut client = RawClient::connect(addr).await;
    client
        .send(&[
            0x10, 0x0C, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x00, 0x00, 0x01, 0x00, 0x00,
        ])
        .await;
    client.expect(CONNACK).await;

    for _ in 0..3 {
        sleep(Duration::from_millis(800)).await;
        client.send(PINGREQ).await;
        client.expect(PINGRESP).await;
    }
}

// A subscriber that never acks sees the configured
// number of DUP retransmissions, then its session is closed.
#[tokio::test]
async fn retransmission_budget_is_bounded() {
    let addr = start_broker("[broker]\nqos_timeout_ms = 100").await;

    let mut subscriber = RawClient::handshake(addr).await;
    subscriber.send(&subscribe_frame(1, "t", 1)).await;
    subscriber.expect(&suback_frame(1, 1)).await;

    let mut publisher = RawClient::handshake(addr).await;
    publisher.send(&publish_frame(0x02, "t", Some(7), b"x")).await;
    publisher.expect(&[0x40, 0x02, 0x00, 0x07]).await;

    // the original delivery (broker pid 1), then three DUP retries
    subscriber.expect(&publish_frame(0x02, "t", Some(1), b"x")).await;
    for _ in 0..3 {
        subscriber.expect(&publish_frame(0x0A, "t", Some(1), b"x")).await;
    }
    subscriber.expect_closed(Duration::from_secs(2)).await;
}

// A subscriber that acknowledges sees no retransmission.
#[tokio::test]
async fn acknowledged_qos1_delivery_is_not_retried() {
    let addr = start_broker("[broker]\nqos_timeout_ms = 100").await;

    let mut subscriber = RawClient::handshake(addr).await;
    subscriber.send(&subscribe_frame(1, "t", 1)).await;
    subscriber.expect(&suback_frame(1, 1)).await;

    let mut publisher = RawClient::handshake(addr).await;
    publisher.send(&publish_frame(0x02, "t", Some(7), b"x")).await;
    publisher.expect(&[0x40, 0x02, 0x00, 0x07]).await;

    subscriber.expect(&publish_frame(0x02, "t", Some(1), b"x")).await;
    subscriber.send(&[0x40, 0x02, 0x00, 0x01]).await;
    subscriber.expect_nothing().await;
}

// Supplemented operation: UNSUBSCRIBE is acknowledged and stops delivery.
#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let addr = start_broker("").await;

    let mut subscriber = RawClient::handshake(addr).await;
    subscriber.send(&subscribe_frame(1, "t", 0)).await;
    subscriber.expect(&suback_frame(1, 0)).await;

    // UNSUBSCRIBE pid=2, filter "t"
    subscriber
        .send(&[0xA2, 0x05, 0x00, 0x02, 0x00, 0x01, b't'])
        .await;
    subscriber.expect(&[0xB0, 0x02, 0x00, 0x02]).await;

    let mut publisher = RawClient::handshake(addr).await;
    publisher.send(&publish_frame(0, "t", None, b"m")).await;

    subscriber.expect_nothing().await;
}

// Wildcard routing end to end: one message, two overlapping grants.
#[tokio::test]
async fn wildcard_filters_route_publishes() {
    let addr = start_broker("").await;

    let mut subscriber = RawClient::handshake(addr).await;
    subscriber.send(&subscribe_frame(1, "a/+", 0)).await;
    subscriber.expect(&suback_frame(1, 0)).await;
    subscriber.send(&subscribe_frame(2, "a/#", 0)).await;
    subscriber.expect(&suback_frame(2, 0)).await;

    let mut publisher = RawClient::handshake(addr).await;
    publisher.send(&publish_frame(0, "a/b", None, b"m")).await;

    // one copy per matching filter
    subscriber.expect(&publish_frame(0, "a/b", None, b"m")).await;
    subscriber.expect(&publish_frame(0, "a/b", None, b"m")).await;
    subscriber.expect_nothing().await;
}

// A first packet that is not CONNECT is dropped without a reply.
#[tokio::test]
async fn first_packet_must_be_connect() {
    let addr = start_broker("").await;

    let mut client = RawClient::connect(addr).await;
    client.send(&subscribe_frame(1, "t", 0)).await;
    client.expect_closed(Duration::from_secs(2)).await;
}

// An unsupported protocol level is refused with return code 0x01.
#[tokio::test]
async fn wrong_protocol_level_is_refused() {
    let addr = start_broker("").await;

    let mut client = RawClient::connect(addr).await;
    client
        .send(&[
            0x10, 0x0C, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, 0x00, 0x00, 0x3C, 0x00, 0x00,
        ])
        .await;
    client.expect(&[0x20, 0x02, 0x00, 0x01]).await;
    client.expect_closed(Duration::from_secs(2)).await;
}

// A malformed frame on an established session closes it silently.
#[tokio::test]
async fn malformed_remaining_length_closes_the_session() {
    let addr = start_broker("").await;

    let mut client = RawClient::handshake(addr).await;
    client.send(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]).await;
    client.expect_closed(Duration::from_secs(2)).await;
}
