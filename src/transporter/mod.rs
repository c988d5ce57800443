//! Sentinel pub/sub transporter.
//!
//! Moves packets between nodes through a store's publish/subscribe
//! primitive, with the store's master located through Sentinel.
//!
//! ## Connection pair
//!
//! A subscribed connection cannot issue `PUBLISH`, so the transporter holds
//! two handles: one for publishing, one for subscribing. They are opened
//! together by [`connect`](Transporter::connect) and closed together by
//! [`disconnect`](Transporter::disconnect). Neither is ever handed out.
//!
//! ## Failover
//!
//! Handles are opaque. The connector behind them may move a connection to a
//! newly elected master without this type noticing; the transporter holds
//! no address and runs no endpoint-specific logic. A handle whose connector
//! gave up reports itself closed, and the transporter then reports
//! disconnected until the next [`connect`](Transporter::connect).
//!
//! ## Channels
//!
//! One subscription fan-in carries every command kind for this node. Each
//! channel is `<prefix>.<command>[.<node_id>]`; the inbound path recovers the
//! command from the second field. See [`crate::topic`].

mod dispatch;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dispatch::InboundDispatch;

use tokio::sync::Mutex as AsyncMutex;

use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    Packet,
    PublisherHandle,
    Result,
    SentinelConfig,
    StoreConnectorPtr,
    SubscriberHandle,
    TransportError,
    Transporter,
    TransporterBase,
};

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Pub/sub transporter over a sentinel-managed store.
///
/// Built by [`SentinelTransporterBuilder`](crate::SentinelTransporterBuilder),
/// which performs the fatal configuration checks before any I/O.
pub struct SentinelTransporter {
    // ---
    base: TransporterBase,
    config: SentinelConfig,
    connector: StoreConnectorPtr,
    publisher: Mutex<Option<Box<dyn PublisherHandle>>>,
    subscriber: Mutex<Option<Box<dyn SubscriberHandle>>>,
    connected_once: AtomicBool,
    connect_lock: AsyncMutex<()>,
}

impl SentinelTransporter {
    // ---

    /// Assemble a transporter from a validated config (builder use only).
    pub(crate) fn new(
        base: TransporterBase,
        config: SentinelConfig,
        connector: StoreConnectorPtr,
    ) -> Self {
        Self {
            base,
            config,
            connector,
            publisher: Mutex::new(None),
            subscriber: Mutex::new(None),
            connected_once: AtomicBool::new(false),
            connect_lock: AsyncMutex::new(()),
        }
    }

    /// The configuration this transporter connects with.
    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Close both handles and clear their slots.
    fn close_handles(&self) {
        // ---
        let id = self.transporter_id();

        if let Some(subscriber) = lock_ignore_poison(&self.subscriber).take() {
            log_debug!("{id}: closing subscriber connection");
            subscriber.close();
        }

        if let Some(publisher) = lock_ignore_poison(&self.publisher).take() {
            log_debug!("{id}: closing publisher connection");
            publisher.close();
        }
    }
}

#[async_trait::async_trait]
impl Transporter for SentinelTransporter {
    // ---

    fn base(&self) -> &TransporterBase {
        &self.base
    }

    fn is_connected(&self) -> bool {
        lock_ignore_poison(&self.publisher)
            .as_ref()
            .is_some_and(|p| p.is_open())
            && lock_ignore_poison(&self.subscriber)
                .as_ref()
                .is_some_and(|s| s.is_open())
    }

    /// Open the publisher and subscriber connections.
    ///
    /// Resolves after both connections exist (master discovery done) and the
    /// broker's `on_connected` hook has resolved. Calling `connect` while
    /// connected performs a full reconnect cycle. If either connection fails
    /// to open, nothing is kept and the store error is returned. Concurrent
    /// calls run one after the other.
    async fn connect(&self) -> Result<()> {
        // ---
        let _connecting = self.connect_lock.lock().await;
        let id = self.transporter_id();

        if self.is_connected() {
            log_info!("{id}: reconnecting, closing current connections");
        }
        // also clears a half whose connector gave up
        self.close_handles();

        let dispatch = Arc::new(InboundDispatch::new(
            id,
            Arc::clone(&self.base.broker),
            Arc::clone(&self.base.stats),
        ));

        let publisher = self.connector.connect_publisher().await.map_err(|err| {
            log_error!("{id}: publisher connection failed: {err}");
            err
        })?;

        let subscriber = match self.connector.connect_subscriber(dispatch).await {
            Ok(subscriber) => subscriber,
            Err(err) => {
                log_error!("{id}: subscriber connection failed: {err}");
                publisher.close();
                return Err(err);
            }
        };

        if let Some(stale) = lock_ignore_poison(&self.publisher).replace(publisher) {
            stale.close();
        }
        if let Some(stale) = lock_ignore_poison(&self.subscriber).replace(subscriber) {
            stale.close();
        }

        let was_reconnect = self.connected_once.swap(true, Ordering::SeqCst);
        log_info!(
            "{id}: connected to master `{}` via {} sentinel(s)",
            self.config.name,
            self.config.sentinels.len()
        );

        self.base.broker.on_connected(was_reconnect).await
    }

    /// Close both connections. A second call finds nothing to close.
    async fn disconnect(&self) {
        self.close_handles();
    }

    /// Request a subscription on the subscriber connection.
    ///
    /// Returns once the request is queued; confirmation is not awaited.
    /// A command that cannot form a channel name is rejected before the
    /// connection is consulted.
    async fn subscribe(&self, command: &str, node_id: Option<&str>) -> Result<()> {
        // ---
        let topic = self.topic_name(command, node_id)?;

        let subscriber = lock_ignore_poison(&self.subscriber);
        let Some(subscriber) = subscriber.as_ref() else {
            return Err(TransportError::TransportUnavailable(format!(
                "{}: no subscriber connection for {topic}",
                self.transporter_id()
            )));
        };

        log_debug!("{}: subscribe {topic}", self.transporter_id());
        subscriber.subscribe(topic)
    }

    /// Serialize, publish and count a packet.
    ///
    /// The channel is derived from `packet_type` and `target`; a packet
    /// without a target goes to the command's broadcast channel. Success
    /// means the `PUBLISH` was issued, not that anyone received it.
    async fn publish(&self, packet: &Packet) -> Result<()> {
        // ---
        let publisher = lock_ignore_poison(&self.publisher);
        let Some(publisher) = publisher.as_ref() else {
            return Err(TransportError::TransportUnavailable(format!(
                "{}: publisher connection is not available",
                self.transporter_id()
            )));
        };

        let data = self.base.serialize(packet)?;
        let topic = self.topic_name(packet.packet_type.as_str(), packet.target.as_deref())?;

        let len = data.len();

        log_debug!("{}: publish {topic} ({len} bytes)", self.transporter_id());
        publisher.publish(topic, data)?;

        self.base.stats.inc_sent(len);
        Ok(())
    }
}

impl Drop for SentinelTransporter {
    fn drop(&mut self) {
        self.close_handles();
    }
}
