// src/domain/broker.rs

//! Node runtime interface consumed by the transporter.
//!
//! The broker owns routing decisions and the fatal-error policy. The
//! transporter calls back into it for three things only: reporting
//! unrecoverable errors, announcing that a connection is ready, and handing
//! over every inbound message.

use bytes::Bytes;

use crate::{Result, TransportError};

/// Callbacks from the transporter into the owning node runtime.
///
/// This trait uses `async_trait`; treat `on_connected` as a normal `async fn`.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    // ---

    /// Report an unrecoverable condition.
    ///
    /// The transporter never exits the process itself. `kill_process` tells
    /// the broker whether the node must stop rather than merely refuse to
    /// serve traffic.
    fn fatal(&self, message: &str, cause: Option<&TransportError>, kill_process: bool);

    /// Called once both connections are ready.
    ///
    /// `connect()` does not report success until this resolves. Node-presence
    /// announcement happens here.
    async fn on_connected(&self, was_reconnect: bool) -> Result<()>;

    /// Sink for every decoded inbound message.
    ///
    /// Called from the subscriber connection's receive loop. Implementations
    /// must return promptly and move slow work elsewhere, otherwise later
    /// messages queue up behind it.
    fn incoming_message(&self, command: &str, payload: Bytes);
}
