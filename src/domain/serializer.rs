// src/domain/serializer.rs

//! Packet serialization seam.
//!
//! The transporter never inspects packet bodies. It asks a `Serializer` for
//! bytes, counts them, and publishes them.

use bytes::Bytes;

use crate::{Packet, Result};

/// Turns an outbound packet into the bytes put on the wire.
pub trait Serializer: Send + Sync {
    fn serialize(&self, packet: &Packet) -> Result<Bytes>;
}

/// JSON encoding of the whole packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, packet: &Packet) -> Result<Bytes> {
        // ---
        let bytes = serde_json::to_vec(packet)?;
        Ok(Bytes::from(bytes))
    }
}
