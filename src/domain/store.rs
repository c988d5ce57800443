// src/domain/store.rs

//! Store-client abstractions.
//!
//! A pub/sub store needs two connections: once a connection is subscribed
//! it can no longer issue `PUBLISH`. These traits describe the two halves
//! and the factory that opens them, without naming a concrete client
//! library.
//!
//! Handles are opaque capability tokens. The transporter holds a handle,
//! never an address: a connector is free to move the underlying connection
//! to a different master (sentinel failover) behind the handle.
//!
//! Both `publish` and `subscribe` are fire-and-forget. Returning `Ok` means
//! the request was queued on the connection in call order, not that the
//! store acknowledged it. Callers that need delivery confirmation build it
//! above this layer.
//!
//! Concrete implementations live under `src/transport/`.

use bytes::Bytes;
use std::sync::Arc;

use crate::Result;

/// Receiver of raw messages from a subscriber connection.
///
/// `on_message` runs on the connection's receive loop and must not block.
pub trait MessageSink: Send + Sync {
    fn on_message(&self, channel: &[u8], payload: Bytes);
}

/// Shared message sink pointer.
pub type MessageSinkPtr = Arc<dyn MessageSink>;

/// The publishing half of a connection pair.
pub trait PublisherHandle: Send + Sync {
    /// Queue a `PUBLISH` of `payload` on `channel`.
    fn publish(&self, channel: String, payload: Bytes) -> Result<()>;

    /// Whether the connection can still carry requests.
    ///
    /// Turns `false` after `close`, or when the connector gave up restoring
    /// a broken connection.
    fn is_open(&self) -> bool;

    /// Close the connection. Queued requests may be abandoned.
    fn close(&self);
}

/// The subscribing half of a connection pair.
pub trait SubscriberHandle: Send + Sync {
    /// Queue a `SUBSCRIBE` for `channel`.
    fn subscribe(&self, channel: String) -> Result<()>;

    /// See [`PublisherHandle::is_open`].
    fn is_open(&self) -> bool;

    /// Close the connection. Queued requests may be abandoned.
    fn close(&self);
}

/// Opens connection halves against a store.
///
/// Both methods resolve only once the connection is established, so a
/// successful return means the handle is usable.
///
/// This trait uses `async_trait`; treat its methods as normal `async fn`s.
#[async_trait::async_trait]
pub trait StoreConnector: Send + Sync {
    // ---

    /// Open a connection dedicated to publishing.
    async fn connect_publisher(&self) -> Result<Box<dyn PublisherHandle>>;

    /// Open a connection dedicated to subscribing.
    ///
    /// Every message received on a subscribed channel is passed to `sink`.
    async fn connect_subscriber(&self, sink: MessageSinkPtr) -> Result<Box<dyn SubscriberHandle>>;
}

/// Shared connector pointer.
pub type StoreConnectorPtr = Arc<dyn StoreConnector>;
