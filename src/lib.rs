//! Redis Sentinel pub/sub transporter for service-mesh node runtimes.
//!
//! This library moves framed packets (heartbeats, requests, responses,
//! discovery events) between independently running nodes using Redis
//! publish/subscribe, with the active master located through Sentinel.
//!
//! The node runtime owns routing and fatal-error policy and plugs in through
//! the [`Broker`] trait. Packet bodies are encoded by a [`Serializer`].
//! The transporter handles the connection pair, channel naming, and the
//! inbound demultiplexing path.
//!

// Import all sub modules once...
mod domain;
mod macros;
mod transport;
mod transporter;

mod retry;
mod sentinel_config;
mod transporter_builder;

pub mod topic;

mod error;

#[allow(unused_imports)]
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use transporter::SentinelTransporter;
pub use transporter_builder::SentinelTransporterBuilder;

pub use retry::RetryConfig;
pub use sentinel_config::{
    //
    ClientOptions,
    ExtraOptions,
    Protocol,
    SentinelAddr,
    SentinelConfig,
    TlsSetting,
};

pub use error::{Result, TransportError};

pub use transport::{
    //
    create_memory_connector_with_hub,
    create_redis_connector,
    MemoryHub,
};

// --- public re-exports
pub use domain::{
    //
    Broker,
    JsonSerializer,
    MessageSink,
    MessageSinkPtr,
    Packet,
    PacketType,
    PublisherHandle,
    Serializer,
    StatsSnapshot,
    StoreConnector,
    StoreConnectorPtr,
    SubscriberHandle,
    Transporter,
    TransporterBase,
    TransporterPtr,
    TransportStats,
};
