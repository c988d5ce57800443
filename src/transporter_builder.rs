//! Transporter builder.
//!
//! Provides a fluent builder API for constructing a [`SentinelTransporter`]
//! with clear separation between required and optional configuration. All
//! configuration checks happen in [`build`](SentinelTransporterBuilder::build),
//! before any network I/O, so a malformed config can never leave a
//! half-open connection behind.

use std::sync::Arc;

use crate::topic::TopicNamer;
use crate::transport::create_redis_connector;
use crate::{
    // ---
    log_error,
    Broker,
    ClientOptions,
    JsonSerializer,
    Result,
    RetryConfig,
    SentinelConfig,
    SentinelTransporter,
    Serializer,
    StoreConnectorPtr,
    TransportError,
    TransportStats,
    TransporterBase,
};

/// Builder for [`SentinelTransporter`].
///
/// # Examples
///
/// ```no_run
/// use meshbus::{SentinelTransporterBuilder, Transporter};
/// # use std::sync::Arc;
///
/// # async fn example(broker: Arc<dyn meshbus::Broker>) -> meshbus::Result<()> {
/// let transporter = SentinelTransporterBuilder::new()
///     .sentinel("10.0.0.1", 26379)
///     .sentinel("10.0.0.2", 26379)
///     .master_name("mymaster")
///     .node_id("node-7")
///     .broker(broker)
///     .build()?;
///
/// transporter.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct SentinelTransporterBuilder {
    config: SentinelConfig,
    node_id: Option<String>,
    broker: Option<Arc<dyn Broker>>,
    serializer: Option<Arc<dyn Serializer>>,
    stats: Option<Arc<TransportStats>>,
    connector: Option<StoreConnectorPtr>,
}

impl SentinelTransporterBuilder {
    /// Create a new builder with an empty configuration.
    pub fn new() -> Self {
        Self {
            config: SentinelConfig::new(""),
            node_id: None,
            broker: None,
            serializer: None,
            stats: None,
            connector: None,
        }
    }

    /// Replace the whole sentinel configuration.
    pub fn config(mut self, config: SentinelConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a sentinel endpoint (at least one is required).
    pub fn sentinel(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config = self.config.with_sentinel(host, port);
        self
    }

    /// Set the master set name (required).
    pub fn master_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set pass-through client options.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.config.options = options;
        self
    }

    /// Set the channel prefix. Default: `"MOL"`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Scope channels to a namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = Some(namespace.into());
        self
    }

    /// Set the master re-resolution backoff.
    pub fn reconnect(mut self, retry: RetryConfig) -> Self {
        self.config.reconnect = retry;
        self
    }

    /// Set the id used in log lines. Defaults to the master set name.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Set the owning node runtime (required).
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Set the packet serializer. Default: [`JsonSerializer`].
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Share a process-wide stats counter. Default: a fresh one.
    pub fn stats(mut self, stats: Arc<TransportStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Use a specific store connector instead of the Redis one.
    ///
    /// Intended for tests with the in-memory connector.
    pub fn connector(mut self, connector: StoreConnectorPtr) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build the transporter (consumes self).
    ///
    /// # Errors
    ///
    /// - [`TransportError::MissingConfig`] if no broker was given; there is
    ///   nobody to report a fatal error to.
    /// - [`TransportError::Fatal`] if the sentinel list is empty, the master
    ///   name is missing, or the Redis client library is not compiled in.
    ///   The broker's `fatal` hook is called first, exactly once, with
    ///   `kill_process = true`.
    pub fn build(self) -> Result<SentinelTransporter> {
        // ---
        let broker = self
            .broker
            .ok_or_else(|| TransportError::MissingConfig("broker".into()))?;

        if let Err(msg) = self.config.validate() {
            log_error!("{msg}");
            broker.fatal(&msg, None, true);
            return Err(TransportError::Fatal(msg));
        }

        let connector = match self.connector {
            Some(connector) => connector,
            None => match create_redis_connector(&self.config) {
                Ok(connector) => connector,
                Err(err) => {
                    let msg = format!("cannot create sentinel transporter: {err}");
                    log_error!("{msg}");
                    broker.fatal(&msg, Some(&err), true);
                    return Err(TransportError::Fatal(msg));
                }
            },
        };

        let node_id = self.node_id.unwrap_or_else(|| self.config.name.clone());
        let topics = TopicNamer::new(&self.config.prefix, self.config.namespace.as_deref());

        let base = TransporterBase::new(
            node_id,
            topics,
            broker,
            self.serializer.unwrap_or_else(|| Arc::new(JsonSerializer)),
            self.stats.unwrap_or_default(),
        );

        Ok(SentinelTransporter::new(base, self.config, connector))
    }
}

impl Default for SentinelTransporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
