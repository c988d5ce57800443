//! Redis Sentinel connector using `redis`.
//!
//! Opens the two connections a pub/sub transporter needs against whichever
//! Redis node the sentinels currently report as master of the configured
//! set. It follows an **actor-based concurrency model**: each connection is
//! owned by one background task, and handles only enqueue commands to it.
//!
//! ## Two connections required
//!
//! Redis mandates a dedicated connection for Pub/Sub: a connection in
//! Pub/Sub mode cannot issue `PUBLISH`. Each half therefore has its own
//! actor:
//!
//! - the publisher actor owns a `MultiplexedConnection` used only for
//!   `PUBLISH`,
//! - the subscriber actor owns a `PubSubSink` / `PubSubStream` pair split
//!   from `aio::PubSub`, issuing `SUBSCRIBE` on the sink while polling the
//!   stream in the same `select!`.
//!
//! ## Fire-and-forget commands
//!
//! `publish()` and `subscribe()` push onto an unbounded queue and return.
//! The queue preserves call order, so messages published through one handle
//! to one channel leave in FIFO order. Failures are logged by the actor; the
//! caller has already moved on.
//!
//! ## Failover
//!
//! Neither handle stores a master address. When a connection breaks the
//! owning actor asks the sentinels again, waiting on the configured backoff
//! between lookups, and reconnects to the new master. A close request ends
//! the lookup early. The subscriber actor then re-issues `SUBSCRIBE` for
//! every channel ever requested on it, including requests that failed.
//! Messages published while no master was reachable are dropped. An actor
//! that runs out of lookups stops, and its handle reports itself closed.

use bytes::Bytes;
use futures_util::StreamExt;

use redis::aio::{MultiplexedConnection, PubSubSink, PubSubStream};
use redis::sentinel::{Sentinel, SentinelNodeConnectionInfo};
use redis::{ConnectionAddr, ConnectionInfo, ProtocolVersion, RedisConnectionInfo, RedisError, RedisResult};

use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use crate::retry::Backoff;
use crate::{
    //
    log_debug,
    log_error,
    log_info,
    log_warn,
    ExtraOptions,
    MessageSinkPtr,
    Protocol,
    PublisherHandle,
    Result,
    RetryConfig,
    SentinelConfig,
    StoreConnector,
    StoreConnectorPtr,
    SubscriberHandle,
    TlsSetting,
    TransportError,
};

/// Asks the sentinels for the current master of one set.
struct MasterResolver {
    // ---
    label: String, // for logging only
    sentinels: Vec<ConnectionInfo>,
    master_name: String,
    node_info: SentinelNodeConnectionInfo,
    retry: RetryConfig,
}

fn protocol_version(protocol: Protocol) -> ProtocolVersion {
    match protocol {
        Protocol::Resp2 => ProtocolVersion::RESP2,
        Protocol::Resp3 => ProtocolVersion::RESP3,
    }
}

fn tls_mode(tls: TlsSetting) -> Option<redis::TlsMode> {
    match tls {
        TlsSetting::Off => None,
        TlsSetting::Secure => Some(redis::TlsMode::Secure),
        TlsSetting::Insecure => Some(redis::TlsMode::Insecure),
    }
}

impl MasterResolver {
    // ---

    fn new(config: &SentinelConfig, extra: &ExtraOptions) -> Self {
        // ---
        let options = &config.options;
        let protocol = protocol_version(extra.protocol);

        let sentinels = config
            .sentinels
            .iter()
            .map(|addr| ConnectionInfo {
                addr: ConnectionAddr::Tcp(addr.host.clone(), addr.port),
                redis: RedisConnectionInfo {
                    username: extra.sentinel_username.clone(),
                    password: options.sentinel_password.clone(),
                    protocol,
                    ..Default::default()
                },
            })
            .collect();

        let node_info = SentinelNodeConnectionInfo {
            tls_mode: tls_mode(extra.tls),
            redis_connection_info: Some(RedisConnectionInfo {
                db: options.db,
                username: options.username.clone(),
                password: options.password.clone(),
                protocol,
                ..Default::default()
            }),
        };

        Self {
            label: format!("sentinel/{}", config.name),
            sentinels,
            master_name: config.name.clone(),
            node_info,
            retry: config.reconnect.clone(),
        }
    }

    /// Resolve the master once.
    async fn master_client(&self) -> Result<redis::Client> {
        // ---
        let mut sentinel = Sentinel::build(self.sentinels.clone()).map_err(|err| {
            let msg = format!("{}: invalid sentinel address list: {err}", self.label);
            log_error!("{msg}");
            TransportError::Transport(msg)
        })?;

        sentinel
            .async_master_for(&self.master_name, Some(&self.node_info))
            .await
            .map_err(|err| {
                let msg = format!(
                    "{}: no master available for `{}`: {err}",
                    self.label, self.master_name
                );
                log_warn!("{msg}");
                TransportError::TransportRetryable(msg)
            })
    }

    /// Resolve the master, backing off while the sentinels have none to
    /// offer.
    ///
    /// Returns `Ok(None)` when `shutdown` fires first, whether during a
    /// lookup or a wait.
    async fn resolve(&self, shutdown: &Notify) -> Result<Option<redis::Client>> {
        // ---
        let mut backoff = Backoff::new(&self.retry);

        loop {
            let attempt = tokio::select! {
                biased;

                _ = shutdown.notified() => return Ok(None),
                attempt = self.master_client() => attempt,
            };

            let details = match attempt {
                Ok(client) => return Ok(Some(client)),
                Err(TransportError::TransportRetryable(details)) => details,
                Err(err) => return Err(err),
            };

            let Some(delay) = backoff.next_delay() else {
                log_warn!(
                    "{}: no master after {} lookups, giving up",
                    self.label,
                    backoff.retries() + 1
                );
                return Err(TransportError::TransportRetryable(details));
            };

            log_debug!(
                "{}: master lookup {} failed, next in {delay:?}",
                self.label,
                backoff.retries()
            );

            tokio::select! {
                biased;

                _ = shutdown.notified() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn publish_connection(&self, shutdown: &Notify) -> Result<Option<MultiplexedConnection>> {
        // ---
        let Some(client) = self.resolve(shutdown).await? else {
            return Ok(None);
        };

        client
            .get_multiplexed_async_connection()
            .await
            .map(Some)
            .map_err(|err| self.connect_error("publish", err))
    }

    async fn pubsub_connection(&self, shutdown: &Notify) -> Result<Option<(PubSubSink, PubSubStream)>> {
        // ---
        let Some(client) = self.resolve(shutdown).await? else {
            return Ok(None);
        };

        let pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|err| self.connect_error("pubsub", err))?;

        Ok(Some(pubsub.split()))
    }

    fn connect_error(&self, which: &str, err: RedisError) -> TransportError {
        // ---
        let msg = format!("{}: failed to open {which} connection: {err}", self.label);
        log_error!("{msg}");
        TransportError::Transport(msg)
    }

    fn closed_while_connecting(&self) -> TransportError {
        TransportError::TransportUnavailable(format!("{}: closed while connecting", self.label))
    }
}

//
// Publisher actor
//

struct Publish {
    channel: String,
    payload: Bytes,
}

struct PublisherActor {
    // ---
    resolver: Arc<MasterResolver>,
    conn: MultiplexedConnection,
    cmd_rx: mpsc::UnboundedReceiver<Publish>,
    shutdown: Arc<Notify>,
}

impl PublisherActor {
    // ---

    async fn run(mut self) {
        // ---
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => break,

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_publish(cmd).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        log_debug!("{}: publisher actor stopped", self.resolver.label);
    }

    /// Issue one `PUBLISH`. Returns `false` when the actor should stop.
    async fn handle_publish(&mut self, cmd: Publish) -> bool {
        // ---
        let result: RedisResult<i64> = redis::cmd("PUBLISH")
            .arg(&cmd.channel)
            .arg(cmd.payload.as_ref())
            .query_async(&mut self.conn)
            .await;

        let err = match result {
            Ok(_receivers) => return true,
            Err(err) => err,
        };

        log_error!(
            "{}: publish failed for channel {}: {err}",
            self.resolver.label,
            cmd.channel
        );

        if !(err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()) {
            return true;
        }

        match self.resolver.publish_connection(&self.shutdown).await {
            Ok(Some(conn)) => {
                log_info!("{}: publisher reconnected to master", self.resolver.label);
                self.conn = conn;
                true
            }
            Ok(None) => false,
            Err(err) => {
                log_error!("{}: publisher giving up: {err}", self.resolver.label);
                false
            }
        }
    }
}

struct RedisPublisher {
    cmd_tx: mpsc::UnboundedSender<Publish>,
    shutdown: Arc<Notify>,
}

impl PublisherHandle for RedisPublisher {
    // ---
    fn publish(&self, channel: String, payload: Bytes) -> Result<()> {
        // ---
        self.cmd_tx
            .send(Publish { channel, payload })
            .map_err(|_| TransportError::TransportUnavailable("publisher actor stopped".into()))
    }

    fn is_open(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    fn close(&self) {
        self.shutdown.notify_one();
    }
}

//
// Subscriber actor
//

/// Issues `SUBSCRIBE` on a pub/sub connection.
#[async_trait::async_trait]
trait SubscribeRequest: Send {
    async fn subscribe_channel(&mut self, channel: &str) -> RedisResult<()>;
}

#[async_trait::async_trait]
impl SubscribeRequest for PubSubSink {
    async fn subscribe_channel(&mut self, channel: &str) -> RedisResult<()> {
        self.subscribe(channel).await
    }
}

/// Every channel requested on one subscriber, in first-request order.
#[derive(Debug, Default)]
struct ChannelSet(Vec<String>);

impl ChannelSet {
    // ---

    fn insert(&mut self, channel: &str) {
        if !self.0.iter().any(|c| c == channel) {
            self.0.push(channel.to_string());
        }
    }

    fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Record `channel`, then request it.
///
/// The record outlives a failed request, so the next reconnect issues it
/// again.
async fn request_channel<S: SubscribeRequest>(
    conn: &mut S,
    channels: &mut ChannelSet,
    channel: &str,
    label: &str,
) {
    // ---
    channels.insert(channel);

    match conn.subscribe_channel(channel).await {
        Ok(()) => log_debug!("{label}: subscribed to {channel}"),
        Err(err) => log_error!("{label}: failed to subscribe to {channel}: {err}"),
    }
}

/// Re-issue every recorded channel on a fresh connection. Returns how many
/// were accepted.
async fn restore_channels<S: SubscribeRequest>(conn: &mut S, channels: &ChannelSet, label: &str) -> usize {
    // ---
    let mut restored = 0;

    for channel in channels.iter() {
        match conn.subscribe_channel(channel).await {
            Ok(()) => {
                log_info!("{label}: resubscribed to {channel}");
                restored += 1;
            }
            Err(err) => log_error!("{label}: resubscribe failed for {channel}: {err}"),
        }
    }

    restored
}

struct SubscriberActor {
    // ---
    resolver: Arc<MasterResolver>,
    pubsub_sink: PubSubSink,
    pubsub_stream: PubSubStream,
    cmd_rx: mpsc::UnboundedReceiver<String>,
    channels: ChannelSet,
    on_message: MessageSinkPtr,
    shutdown: Arc<Notify>,
}

impl SubscriberActor {
    // ---

    async fn run(mut self) {
        // ---
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => break,

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(channel) => {
                            request_channel(
                                &mut self.pubsub_sink,
                                &mut self.channels,
                                &channel,
                                &self.resolver.label,
                            )
                            .await;
                        }
                        None => break,
                    }
                }

                maybe_msg = self.pubsub_stream.next() => {
                    match maybe_msg {
                        Some(msg) => self.handle_incoming(msg),
                        None => {
                            log_error!("{}: pubsub stream ended", self.resolver.label);
                            if !self.reconnect().await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        log_debug!("{}: subscriber actor stopped", self.resolver.label);
    }

    /// Hand one message to the sink. Must not await.
    fn handle_incoming(&self, msg: redis::Msg) {
        // ---
        let payload = Bytes::copy_from_slice(msg.get_payload_bytes());
        self.on_message
            .on_message(msg.get_channel_name().as_bytes(), payload);
    }

    /// Re-resolve the master and restore every subscription. Returns
    /// `false` when the actor should stop.
    async fn reconnect(&mut self) -> bool {
        // ---
        let (sink, stream) = match self.resolver.pubsub_connection(&self.shutdown).await {
            Ok(Some(pair)) => pair,
            Ok(None) => return false,
            Err(err) => {
                log_error!("{}: subscriber giving up: {err}", self.resolver.label);
                return false;
            }
        };

        self.pubsub_sink = sink;
        self.pubsub_stream = stream;

        restore_channels(&mut self.pubsub_sink, &self.channels, &self.resolver.label).await;
        true
    }
}

struct RedisSubscriber {
    cmd_tx: mpsc::UnboundedSender<String>,
    shutdown: Arc<Notify>,
}

impl SubscriberHandle for RedisSubscriber {
    // ---
    fn subscribe(&self, channel: String) -> Result<()> {
        // ---
        self.cmd_tx
            .send(channel)
            .map_err(|_| TransportError::TransportUnavailable("subscriber actor stopped".into()))
    }

    fn is_open(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    fn close(&self) {
        self.shutdown.notify_one();
    }
}

/// Sentinel-backed implementation of [`StoreConnector`].
pub struct RedisSentinelConnector {
    resolver: Arc<MasterResolver>,
}

#[async_trait::async_trait]
impl StoreConnector for RedisSentinelConnector {
    // ---

    async fn connect_publisher(&self) -> Result<Box<dyn PublisherHandle>> {
        // ---
        let shutdown = Arc::new(Notify::new());
        let conn = self
            .resolver
            .publish_connection(&shutdown)
            .await?
            .ok_or_else(|| self.resolver.closed_while_connecting())?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let actor = PublisherActor {
            resolver: Arc::clone(&self.resolver),
            conn,
            cmd_rx,
            shutdown: Arc::clone(&shutdown),
        };
        tokio::spawn(actor.run());

        log_info!("{}: publish connection ready", self.resolver.label);
        Ok(Box::new(RedisPublisher { cmd_tx, shutdown }))
    }

    async fn connect_subscriber(&self, sink: MessageSinkPtr) -> Result<Box<dyn SubscriberHandle>> {
        // ---
        let shutdown = Arc::new(Notify::new());
        let (pubsub_sink, pubsub_stream) = self
            .resolver
            .pubsub_connection(&shutdown)
            .await?
            .ok_or_else(|| self.resolver.closed_while_connecting())?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let actor = SubscriberActor {
            resolver: Arc::clone(&self.resolver),
            pubsub_sink,
            pubsub_stream,
            cmd_rx,
            channels: ChannelSet::default(),
            on_message: sink,
            shutdown: Arc::clone(&shutdown),
        };
        tokio::spawn(actor.run());

        log_info!("{}: pubsub connection ready", self.resolver.label);
        Ok(Box::new(RedisSubscriber { cmd_tx, shutdown }))
    }
}

/// Creates a sentinel-backed Redis connector.
///
/// No network I/O happens here; the sentinels are first contacted by
/// `connect_publisher` / `connect_subscriber`.
///
/// # Errors
///
/// [`TransportError::Fatal`] if the `extra` client options contain an
/// unknown key or value.
pub fn create_transport(config: &SentinelConfig) -> Result<StoreConnectorPtr> {
    // ---
    let extra = config.options.parse_extra().map_err(TransportError::Fatal)?;

    Ok(Arc::new(RedisSentinelConnector {
        resolver: Arc::new(MasterResolver::new(config, &extra)),
    }))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::ClientOptions;
    use std::io;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Records requested channels; fails every request while `down`.
    #[derive(Default)]
    struct FakeConn {
        down: bool,
        issued: Vec<String>,
    }

    #[async_trait::async_trait]
    impl SubscribeRequest for FakeConn {
        async fn subscribe_channel(&mut self, channel: &str) -> RedisResult<()> {
            if self.down {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset").into());
            }
            self.issued.push(channel.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_subscribe_is_restored_on_reconnect() {
        // ---
        let mut channels = ChannelSet::default();
        let mut broken = FakeConn {
            down: true,
            ..Default::default()
        };

        request_channel(&mut broken, &mut channels, "MOL.REQ.n1", "test").await;
        assert!(broken.issued.is_empty());

        let mut fresh = FakeConn::default();
        let restored = restore_channels(&mut fresh, &channels, "test").await;

        assert_eq!(restored, 1);
        assert_eq!(fresh.issued, vec!["MOL.REQ.n1".to_string()]);
    }

    #[tokio::test]
    async fn test_channels_restored_once_in_request_order() {
        // ---
        let mut channels = ChannelSet::default();
        let mut conn = FakeConn::default();

        for channel in ["MOL.EVENT.n1", "MOL.HEARTBEAT", "MOL.EVENT.n1"] {
            request_channel(&mut conn, &mut channels, channel, "test").await;
        }

        let mut fresh = FakeConn::default();
        restore_channels(&mut fresh, &channels, "test").await;
        assert_eq!(fresh.issued, vec!["MOL.EVENT.n1", "MOL.HEARTBEAT"]);
    }

    fn config_with_extra(pairs: &[(&str, &str)]) -> SentinelConfig {
        // ---
        let options = ClientOptions {
            db: 3,
            password: Some("master-secret".into()),
            sentinel_password: Some("sentinel-secret".into()),
            extra: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        };

        SentinelConfig::new("mymaster")
            .with_sentinel("10.0.0.1", 26379)
            .with_sentinel("10.0.0.2", 26379)
            .with_options(options)
    }

    #[test]
    fn test_client_options_reach_connection_info() {
        // ---
        let config = config_with_extra(&[
            ("protocol", "resp3"),
            ("tls", "secure"),
            ("sentinel_username", "watcher"),
        ]);
        let extra = config.options.parse_extra().unwrap();
        let resolver = MasterResolver::new(&config, &extra);

        assert_eq!(resolver.sentinels.len(), 2);
        for sentinel in &resolver.sentinels {
            assert_eq!(sentinel.redis.username.as_deref(), Some("watcher"));
            assert_eq!(sentinel.redis.password.as_deref(), Some("sentinel-secret"));
            assert!(matches!(sentinel.redis.protocol, ProtocolVersion::RESP3));
        }

        assert!(matches!(resolver.node_info.tls_mode, Some(redis::TlsMode::Secure)));
        let master = resolver.node_info.redis_connection_info.as_ref().unwrap();
        assert_eq!(master.db, 3);
        assert_eq!(master.password.as_deref(), Some("master-secret"));
        assert!(matches!(master.protocol, ProtocolVersion::RESP3));
    }

    #[test]
    fn test_default_options_plain_resp2() {
        // ---
        let config = config_with_extra(&[]);
        let resolver = MasterResolver::new(&config, &ExtraOptions::default());

        assert!(resolver.node_info.tls_mode.is_none());
        assert!(resolver.sentinels[0].redis.username.is_none());
        assert!(matches!(resolver.sentinels[0].redis.protocol, ProtocolVersion::RESP2));
    }

    #[test]
    fn test_unknown_option_rejected_by_connector() {
        // ---
        let config = config_with_extra(&[("pool_size", "8")]);
        assert!(matches!(create_transport(&config), Err(TransportError::Fatal(_))));
    }

    #[tokio::test]
    async fn test_close_interrupts_master_lookup() {
        // ---
        // nothing listens on port 1, so every lookup fails and waits
        let config = SentinelConfig::new("mymaster")
            .with_sentinel("127.0.0.1", 1)
            .with_reconnect(RetryConfig {
                max_attempts: 10,
                multiplier: 1.0,
                initial_delay: Duration::from_secs(60),
                max_delay: Duration::from_secs(60),
            });
        let resolver = Arc::new(MasterResolver::new(&config, &ExtraOptions::default()));
        let shutdown = Arc::new(Notify::new());

        let lookup = tokio::spawn({
            let resolver = Arc::clone(&resolver);
            let shutdown = Arc::clone(&shutdown);
            async move { resolver.resolve(&shutdown).await.map(|client| client.is_some()) }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.notify_one();

        let result = timeout(Duration::from_secs(5), lookup)
            .await
            .expect("close was ignored during backoff")
            .expect("lookup task panicked");
        assert!(matches!(result, Ok(false)));
    }

    #[tokio::test]
    async fn test_lookup_gives_up_after_retries() {
        // ---
        let config = SentinelConfig::new("mymaster")
            .with_sentinel("127.0.0.1", 1)
            .with_reconnect(RetryConfig {
                max_attempts: 1,
                multiplier: 1.0,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
            });
        let resolver = MasterResolver::new(&config, &ExtraOptions::default());

        let result = timeout(Duration::from_secs(5), resolver.resolve(&Notify::new()))
            .await
            .expect("lookup did not give up");
        assert!(matches!(result, Err(TransportError::TransportRetryable(_))));
    }
}
