// tests/common/mod.rs

#![allow(dead_code)]

use bytes::Bytes;
use std::sync::{Arc, Mutex, Once};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use meshbus::{
    // ---
    create_memory_connector_with_hub,
    Broker,
    MemoryHub,
    Result,
    SentinelTransporter,
    SentinelTransporterBuilder,
    StoreConnectorPtr,
    TransportError,
    TransportStats,
};

/// Broker double that records every callback.
pub struct RecordingBroker {
    pub fatals: Mutex<Vec<(String, bool)>>,
    pub connected: Mutex<Vec<bool>>,
    incoming: mpsc::UnboundedSender<(String, Bytes)>,
}

impl RecordingBroker {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Bytes)>) {
        // ---
        let (tx, rx) = mpsc::unbounded_channel();
        let broker = Arc::new(Self {
            fatals: Mutex::new(Vec::new()),
            connected: Mutex::new(Vec::new()),
            incoming: tx,
        });
        (broker, rx)
    }

    pub fn fatal_count(&self) -> usize {
        self.fatals.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Broker for RecordingBroker {
    // ---
    fn fatal(&self, message: &str, _cause: Option<&TransportError>, kill_process: bool) {
        self.fatals
            .lock()
            .unwrap()
            .push((message.to_string(), kill_process));
    }

    async fn on_connected(&self, was_reconnect: bool) -> Result<()> {
        self.connected.lock().unwrap().push(was_reconnect);
        Ok(())
    }

    fn incoming_message(&self, command: &str, payload: Bytes) {
        let _ = self.incoming.send((command.to_string(), payload));
    }
}

/// A transporter for `node_id` on `hub`, not yet connected.
pub fn memory_transporter(
    node_id: &str,
    hub: Arc<MemoryHub>,
    broker: Arc<RecordingBroker>,
    stats: Arc<TransportStats>,
) -> SentinelTransporter {
    // ---
    transporter_with_connector(node_id, create_memory_connector_with_hub(hub), broker, stats)
}

/// A transporter for `node_id` on any connector, not yet connected.
pub fn transporter_with_connector(
    node_id: &str,
    connector: StoreConnectorPtr,
    broker: Arc<RecordingBroker>,
    stats: Arc<TransportStats>,
) -> SentinelTransporter {
    // ---
    SentinelTransporterBuilder::new()
        .sentinel("127.0.0.1", 26379)
        .master_name("mymaster")
        .node_id(node_id)
        .broker(broker)
        .stats(stats)
        .connector(connector)
        .build()
        .expect("valid transporter config")
}

/// Wait for the next inbound message.
pub async fn next_message(rx: &mut mpsc::UnboundedReceiver<(String, Bytes)>) -> (String, Bytes) {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("broker channel closed unexpectedly")
}

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
