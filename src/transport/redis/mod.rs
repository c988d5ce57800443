//! Redis protocol connectors.
//!
//! Currently supports:
//! - sentinel - Redis Pub/Sub behind Sentinel master discovery (sentinel.rs)

#[cfg(feature = "transport_redis")]
mod sentinel;

#[cfg(feature = "transport_redis")]
pub use sentinel::create_transport as create_redis_connector;

/// Stand-in used when the Redis client library is not compiled in.
///
/// The builder reports this error through the broker's fatal hook.
#[cfg(not(feature = "transport_redis"))]
pub fn create_redis_connector(
    _config: &crate::SentinelConfig,
) -> crate::Result<crate::StoreConnectorPtr> {
    Err(crate::TransportError::Fatal(
        "the Redis client library is missing; rebuild with the `transport_redis` feature".into(),
    ))
}
