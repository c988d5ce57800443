//! Domain layer public interface.
//!
//! This module defines the abstractions the transporter is written against:
//! packets, the serializer, traffic counters, the broker callbacks, and the
//! store-client seam. None of them refer to a concrete client library.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod broker;
mod packet;
mod serializer;
mod stats;
mod store;
mod transporter;

pub use broker::Broker;

pub use packet::{
    //
    Packet,
    PacketType,
};

pub use serializer::{
    //
    JsonSerializer,
    Serializer,
};

pub use stats::{
    //
    StatsSnapshot,
    TransportStats,
};

pub use store::{
    //
    MessageSink,
    MessageSinkPtr,
    PublisherHandle,
    StoreConnector,
    StoreConnectorPtr,
    SubscriberHandle,
};

pub use transporter::{
    //
    Transporter,
    TransporterBase,
    TransporterPtr,
};
