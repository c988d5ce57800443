// src/domain/packet.rs

//! Packets exchanged between nodes.
//!
//! A packet is produced by the node runtime. The transporter reads only its
//! command kind and target to pick a channel; the payload is handed to the
//! serializer untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Command kind carried by a packet.
///
/// The string form is the channel's command field, so it must never contain
/// a `.`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PacketType {
    Event,
    Req,
    Res,
    Discover,
    Info,
    Disconnect,
    Heartbeat,
    Ping,
    Pong,
}

impl PacketType {
    // ---

    /// Every command kind, in the order a node subscribes to them.
    pub const ALL: [PacketType; 9] = [
        PacketType::Event,
        PacketType::Req,
        PacketType::Res,
        PacketType::Discover,
        PacketType::Info,
        PacketType::Disconnect,
        PacketType::Heartbeat,
        PacketType::Ping,
        PacketType::Pong,
    ];

    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            PacketType::Event => "EVENT",
            PacketType::Req => "REQ",
            PacketType::Res => "RES",
            PacketType::Discover => "DISCOVER",
            PacketType::Info => "INFO",
            PacketType::Disconnect => "DISCONNECT",
            PacketType::Heartbeat => "HEARTBEAT",
            PacketType::Ping => "PING",
            PacketType::Pong => "PONG",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed envelope exchanged between nodes.
///
/// `target == None` is a broadcast: the packet goes to the command's shared
/// channel rather than one node's private channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    // ---
    #[serde(rename = "type")]
    pub packet_type: PacketType,

    /// Destination node id, or `None` for broadcast.
    pub target: Option<String>,

    /// Opaque body produced by the node runtime.
    pub payload: serde_json::Value,
}

impl Packet {
    // ---

    /// Packet addressed to a single node.
    pub fn to_node(
        packet_type: PacketType,
        target: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            packet_type,
            target: Some(target.into()),
            payload,
        }
    }

    /// Packet for every node subscribed to the command's broadcast channel.
    pub fn broadcast(packet_type: PacketType, payload: serde_json::Value) -> Self {
        Self {
            packet_type,
            target: None,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_serde_form_matches_command_field() {
        // ---
        for t in PacketType::ALL {
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, serde_json::Value::String(t.as_str().into()));
        }
    }

    #[test]
    fn test_no_separator_in_command() {
        // ---
        assert!(PacketType::ALL.iter().all(|t| !t.as_str().contains('.')));
    }
}
