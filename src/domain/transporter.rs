// src/domain/transporter.rs

//! Transporter abstraction.
//!
//! A transporter moves packets between nodes over some backing technology.
//! The node runtime drives every transporter through the same contract:
//! connect, subscribe the node's channels, publish packets, disconnect.
//! Inbound messages flow the other way through [`Broker::incoming_message`].
//!
//! Higher-level semantics such as request/response correlation, retries of
//! lost requests, and heartbeats are handled elsewhere.

use std::sync::Arc;

use bytes::Bytes;

use crate::topic::TopicNamer;
use crate::{Broker, Packet, Result, Serializer, TransportStats};

/// Shared base state for transporter implementations.
///
/// Holds the collaborators every transporter needs so that default
/// `Transporter` methods can delegate here.
///
/// ```ignore
/// struct SentinelTransporter {
///     base: TransporterBase,
///     // ... connection handles
/// }
///
/// impl Transporter for SentinelTransporter {
///     fn base(&self) -> &TransporterBase { &self.base }
/// }
/// ```
pub struct TransporterBase {
    /// Identifier used in log lines.
    pub transporter_id: String,
    /// Channel naming for this transporter's prefix.
    pub topics: TopicNamer,
    /// Owning node runtime.
    pub broker: Arc<dyn Broker>,
    /// Packet encoder.
    pub serializer: Arc<dyn Serializer>,
    /// Process-wide counters.
    pub stats: Arc<TransportStats>,
}

impl TransporterBase {
    // ---

    pub fn new(
        transporter_id: impl Into<String>,
        topics: TopicNamer,
        broker: Arc<dyn Broker>,
        serializer: Arc<dyn Serializer>,
        stats: Arc<TransportStats>,
    ) -> Self {
        Self {
            transporter_id: transporter_id.into(),
            topics,
            broker,
            serializer,
            stats,
        }
    }

    /// Channel for `command`, addressed to `node_id` when given.
    pub fn topic_name(&self, command: &str, node_id: Option<&str>) -> Result<String> {
        self.topics.topic_name(command, node_id)
    }

    /// Encode a packet with the configured serializer.
    pub fn serialize(&self, packet: &Packet) -> Result<Bytes> {
        self.serializer.serialize(packet)
    }
}

/// Transporter contract shared by every backing technology.
///
/// `subscribe` and `publish` are fire-and-forget: `Ok` means the request was
/// issued on the connection, not that the store or any peer acknowledged
/// it. Callers must not assume a subscription is active the instant
/// `subscribe` returns, only that requests are issued in call order.
///
/// This trait uses `async_trait`; treat methods as normal `async fn`s.
#[async_trait::async_trait]
pub trait Transporter: Send + Sync {
    // ---

    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransporterBase;

    /// Returns the transporter id used in logs.
    fn transporter_id(&self) -> &str {
        &self.base().transporter_id
    }

    /// Channel for `command`, addressed to `node_id` when given.
    fn topic_name(&self, command: &str, node_id: Option<&str>) -> Result<String> {
        self.base().topic_name(command, node_id)
    }

    /// Whether a live connection pair is held.
    fn is_connected(&self) -> bool;

    /// Open the connections and resolve once the broker has been told.
    async fn connect(&self) -> Result<()>;

    /// Close and forget the connections. Idempotent.
    async fn disconnect(&self);

    /// Request a subscription to `command` (for `node_id` when given).
    async fn subscribe(&self, command: &str, node_id: Option<&str>) -> Result<()>;

    /// Issue subscriptions in order, stopping at the first failure.
    async fn make_subscriptions(&self, topics: &[(&str, Option<&str>)]) -> Result<()> {
        // ---
        for (command, node_id) in topics {
            self.subscribe(command, *node_id).await?;
        }
        Ok(())
    }

    /// Publish a packet to the channel derived from its type and target.
    async fn publish(&self, packet: &Packet) -> Result<()>;
}

/// Shared transporter pointer.
pub type TransporterPtr = Arc<dyn Transporter>;
