//! In-memory store connector.
//!
//! A pure in-process stand-in for a pub/sub store, for tests only. It also
//! serves as the reference for the semantics every connector is expected to
//! approximate:
//!
//! - Channel matching is exact string equality. No patterns.
//! - Messages published on one connection to one channel reach each
//!   subscriber in publish order.
//! - `publish` and `subscribe` return as soon as the request is recorded.
//! - A subscriber's sink is called from that subscriber's own delivery task,
//!   never from the publisher's call stack.
//!
//! ## Non-Goals
//!
//! No persistence, no network failure simulation, no sentinel topology.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;

use crate::{
    // ---
    log_debug,
    MessageSinkPtr,
    PublisherHandle,
    Result,
    StoreConnector,
    StoreConnectorPtr,
    SubscriberHandle,
    TransportError,
};

type Delivery = (String, Bytes);
type SubscriberId = u64;

/// Oldest entries of the published log are dropped past this many.
const PUBLISHED_LOG_LIMIT: usize = 4096;

/// Shared message bus for in-memory connections.
///
/// Every connector built on the same hub sees the same channels, exactly as
/// nodes attached to one store would.
///
/// # Testing Only
///
/// The inspection methods (`published`, `connection_count`,
/// `open_connections`, `subscriber_count`) exist for this crate's own tests
/// and for node runtimes testing against the transporter. Production code
/// should use the Redis connector.
pub struct MemoryHub {
    // ---
    channels: RwLock<HashMap<String, Vec<(SubscriberId, mpsc::UnboundedSender<Delivery>)>>>,
    published: Mutex<VecDeque<Delivery>>,
    next_id: AtomicU64,
    connections: AtomicUsize,
    open: AtomicUsize,
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn read_ignore_poison<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match l.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_ignore_poison<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match l.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryHub {
    // ---

    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish `payload` to every current subscriber of `channel`.
    ///
    /// Returns the number of subscribers the message was handed to.
    pub fn publish(&self, channel: &str, payload: Bytes) -> usize {
        // ---
        {
            let mut log = lock_ignore_poison(&self.published);
            if log.len() == PUBLISHED_LOG_LIMIT {
                log.pop_front();
            }
            log.push_back((channel.to_string(), payload.clone()));
        }

        let channels = read_ignore_poison(&self.channels);
        let Some(subscribers) = channels.get(channel) else {
            return 0;
        };

        subscribers
            .iter()
            .filter(|(_, tx)| tx.send((channel.to_string(), payload.clone())).is_ok())
            .count()
    }

    /// The most recent `(channel, payload)` pairs published through this
    /// hub, oldest first. Only the last 4096 are kept.
    pub fn published(&self) -> Vec<(String, Bytes)> {
        lock_ignore_poison(&self.published).iter().cloned().collect()
    }

    /// Number of connections ever opened against this hub.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of connections opened and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        read_ignore_poison(&self.channels)
            .get(channel)
            .map_or(0, Vec::len)
    }

    fn add_subscription(&self, channel: String, id: SubscriberId, tx: mpsc::UnboundedSender<Delivery>) {
        // ---
        let mut channels = write_ignore_poison(&self.channels);
        let entry = channels.entry(channel).or_default();

        // SUBSCRIBE is idempotent per connection.
        if !entry.iter().any(|(existing, _)| *existing == id) {
            entry.push((id, tx));
        }
    }

    fn remove_subscriber(&self, id: SubscriberId) {
        // ---
        let mut channels = write_ignore_poison(&self.channels);
        for subscribers in channels.values_mut() {
            subscribers.retain(|(existing, _)| *existing != id);
        }
        channels.retain(|_, subscribers| !subscribers.is_empty());
    }

    fn open_connection(&self) -> SubscriberId {
        self.connections.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn close_connection(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            channels: RwLock::new(HashMap::new()),
            published: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            connections: AtomicUsize::new(0),
            open: AtomicUsize::new(0),
        }
    }
}

struct MemoryPublisher {
    // ---
    hub: Arc<MemoryHub>,
    closed: AtomicBool,
}

impl PublisherHandle for MemoryPublisher {
    // ---
    fn publish(&self, channel: String, payload: Bytes) -> Result<()> {
        // ---
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::TransportUnavailable(
                "memory publisher is closed".into(),
            ));
        }
        self.hub.publish(&channel, payload);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.hub.close_connection();
        }
    }
}

struct MemorySubscriber {
    // ---
    id: SubscriberId,
    hub: Arc<MemoryHub>,
    tx: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
}

impl SubscriberHandle for MemorySubscriber {
    // ---
    fn subscribe(&self, channel: String) -> Result<()> {
        // ---
        let tx = lock_ignore_poison(&self.tx).clone().ok_or_else(|| {
            TransportError::TransportUnavailable("memory subscriber is closed".into())
        })?;

        log_debug!("memory-{}: subscribe to {channel}", self.id);
        self.hub.add_subscription(channel, self.id, tx);
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock_ignore_poison(&self.tx).is_some()
    }

    fn close(&self) {
        // ---
        // Dropping every sender ends the delivery task once it drains.
        if lock_ignore_poison(&self.tx).take().is_some() {
            self.hub.remove_subscriber(self.id);
            self.hub.close_connection();
        }
    }
}

/// Opens connections on a [`MemoryHub`].
struct MemoryConnector {
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl StoreConnector for MemoryConnector {
    // ---
    async fn connect_publisher(&self) -> Result<Box<dyn PublisherHandle>> {
        // ---
        self.hub.open_connection();

        Ok(Box::new(MemoryPublisher {
            hub: Arc::clone(&self.hub),
            closed: AtomicBool::new(false),
        }))
    }

    async fn connect_subscriber(&self, sink: MessageSinkPtr) -> Result<Box<dyn SubscriberHandle>> {
        // ---
        let id = self.hub.open_connection();
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();

        tokio::spawn(async move {
            while let Some((channel, payload)) = rx.recv().await {
                sink.on_message(channel.as_bytes(), payload);
            }
            log_debug!("memory-{id}: delivery task stopped");
        });

        Ok(Box::new(MemorySubscriber {
            id,
            hub: Arc::clone(&self.hub),
            tx: Mutex::new(Some(tx)),
        }))
    }
}

/// Create an in-memory connector on the provided hub.
///
/// Every connector built on the same hub shares one message bus.
pub fn create_memory_connector_with_hub(hub: Arc<MemoryHub>) -> StoreConnectorPtr {
    Arc::new(MemoryConnector { hub })
}
