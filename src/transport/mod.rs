//! Store connector implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `StoreConnector` trait. Each is exposed only through a constructor
//! function; domain code must not depend on connector-specific types.

mod memory;
mod redis;

pub use memory::{
    //
    create_memory_connector_with_hub,
    MemoryHub,
};

pub use redis::create_redis_connector;
