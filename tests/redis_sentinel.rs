// tests/redis_sentinel.rs
//
// Runs against a live Sentinel deployment:
//
//   MESHBUS_SENTINEL=127.0.0.1:26379 MESHBUS_MASTER=mymaster \
//       cargo test --test redis_sentinel -- --ignored
//
// The master must allow `CLIENT KILL`.

#![cfg(feature = "transport_redis")]

mod common;

use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

use common::{init_logging, RecordingBroker};

use meshbus::{
    // ---
    Packet,
    PacketType,
    SentinelTransporter,
    SentinelTransporterBuilder,
    Transporter,
};

fn sentinel_addr() -> (String, u16) {
    // ---
    let addr = std::env::var("MESHBUS_SENTINEL").unwrap_or_else(|_| "127.0.0.1:26379".into());
    let (host, port) = addr.rsplit_once(':').expect("MESHBUS_SENTINEL must be host:port");
    (host.to_string(), port.parse().expect("sentinel port"))
}

fn master_name() -> String {
    std::env::var("MESHBUS_MASTER").unwrap_or_else(|_| "mymaster".into())
}

/// Namespace unique to this test process, so parallel runs never share
/// channels.
fn run_namespace(test: &str) -> String {
    format!("it-{test}-{}", std::process::id())
}

fn redis_transporter(node_id: &str, namespace: &str, broker: Arc<RecordingBroker>) -> SentinelTransporter {
    // ---
    let (host, port) = sentinel_addr();

    SentinelTransporterBuilder::new()
        .sentinel(host, port)
        .master_name(master_name())
        .namespace(namespace)
        .node_id(node_id)
        .broker(broker)
        .build()
        .expect("valid sentinel config")
}

/// Publish `packet` every 100ms until a message arrives on `rx`.
///
/// Subscriptions are not confirmed, so the first publishes may race them.
async fn publish_until_received(
    publisher: &SentinelTransporter,
    packet: &Packet,
    rx: &mut mpsc::UnboundedReceiver<(String, Bytes)>,
    within: Duration,
) -> (String, Bytes) {
    // ---
    timeout(within, async {
        loop {
            publisher.publish(packet).await.expect("publish failed");
            if let Ok(Some(msg)) = timeout(Duration::from_millis(100), rx.recv()).await {
                return msg;
            }
        }
    })
    .await
    .expect("no delivery within deadline")
}

/// Kill every pub/sub client on the current master. Returns how many.
async fn kill_pubsub_clients() -> i64 {
    // ---
    let (host, port) = sentinel_addr();
    let mut sentinel = redis::sentinel::Sentinel::build(vec![format!("redis://{host}:{port}")])
        .expect("sentinel address");
    let client = sentinel
        .async_master_for(&master_name(), None)
        .await
        .expect("master lookup");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("master connection");

    let killed: i64 = redis::cmd("CLIENT")
        .arg("KILL")
        .arg("TYPE")
        .arg("pubsub")
        .query_async(&mut conn)
        .await
        .expect("CLIENT KILL");
    killed
}

#[tokio::test]
#[ignore = "needs a live sentinel (MESHBUS_SENTINEL)"]
async fn request_round_trip_through_master() {
    // ---
    init_logging();
    let namespace = run_namespace("round-trip");

    let (broker_a, mut rx_a) = RecordingBroker::new();
    let (broker_b, _rx_b) = RecordingBroker::new();
    let node_a = redis_transporter("node-a", &namespace, broker_a.clone());
    let node_b = redis_transporter("node-b", &namespace, broker_b);

    node_a.connect().await.expect("node-a connect");
    node_b.connect().await.expect("node-b connect");
    assert!(node_a.is_connected() && node_b.is_connected());
    assert_eq!(*broker_a.connected.lock().unwrap(), vec![false]);

    node_a.subscribe("REQ", Some("node-a")).await.unwrap();

    let packet = Packet::to_node(PacketType::Req, "node-a", json!({"a": 2, "b": 3}));
    let (command, payload) =
        publish_until_received(&node_b, &packet, &mut rx_a, Duration::from_secs(5)).await;

    assert_eq!(command, "REQ");
    let decoded: Packet = serde_json::from_slice(&payload).unwrap();
    assert_eq!(decoded, packet);

    node_a.disconnect().await;
    node_b.disconnect().await;
    assert!(!node_a.is_connected());
}

#[tokio::test]
#[ignore = "needs a live sentinel (MESHBUS_SENTINEL)"]
async fn subscriptions_survive_killed_pubsub_connection() {
    // ---
    init_logging();
    let namespace = run_namespace("resubscribe");

    let (broker_a, mut rx_a) = RecordingBroker::new();
    let (broker_b, _rx_b) = RecordingBroker::new();
    let node_a = redis_transporter("node-a", &namespace, broker_a);
    let node_b = redis_transporter("node-b", &namespace, broker_b);

    node_a.connect().await.unwrap();
    node_b.connect().await.unwrap();
    node_a.subscribe("EVENT", None).await.unwrap();

    let packet = Packet::broadcast(PacketType::Event, json!({"phase": "before"}));
    publish_until_received(&node_b, &packet, &mut rx_a, Duration::from_secs(5)).await;

    assert!(kill_pubsub_clients().await >= 1);
    sleep(Duration::from_millis(200)).await;

    // drain anything delivered before the kill
    while rx_a.try_recv().is_ok() {}

    let packet = Packet::broadcast(PacketType::Event, json!({"phase": "after"}));
    let (command, payload) =
        publish_until_received(&node_b, &packet, &mut rx_a, Duration::from_secs(10)).await;

    assert_eq!(command, "EVENT");
    let decoded: Packet = serde_json::from_slice(&payload).unwrap();
    assert_eq!(decoded.payload["phase"], "after");
    assert!(node_a.is_connected());

    node_a.disconnect().await;
    node_b.disconnect().await;
}
