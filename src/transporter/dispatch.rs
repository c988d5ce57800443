//! Inbound dispatch.
//!
//! Installed as the subscriber connection's [`MessageSink`]. For each
//! message it recovers the command from the channel name and hands the
//! payload to the broker. No filtering happens here: the subscriber only
//! receives channels that were subscribed, and channel scoping is the
//! naming scheme's job.

use bytes::Bytes;
use std::sync::Arc;

use crate::topic::command_of;
use crate::{log_debug, Broker, MessageSink, TransportStats};

pub(crate) struct InboundDispatch {
    // ---
    transporter_id: String, // for logging only
    broker: Arc<dyn Broker>,
    stats: Arc<TransportStats>,
}

impl InboundDispatch {
    pub(crate) fn new(
        transporter_id: impl Into<String>,
        broker: Arc<dyn Broker>,
        stats: Arc<TransportStats>,
    ) -> Self {
        Self {
            transporter_id: transporter_id.into(),
            broker,
            stats,
        }
    }
}

impl MessageSink for InboundDispatch {
    // ---

    /// Decode and forward. Never awaits.
    fn on_message(&self, channel: &[u8], payload: Bytes) {
        // ---
        let Ok(topic) = std::str::from_utf8(channel) else {
            log_debug!("{}: dropping message on non UTF-8 channel", self.transporter_id);
            return;
        };

        let Some(command) = command_of(topic) else {
            log_debug!("{}: dropping message on channel without command: {topic}", self.transporter_id);
            return;
        };

        self.stats.inc_received(payload.len());
        self.broker.incoming_message(command, payload);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{Result, TransportError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, Bytes)>>,
    }

    #[async_trait::async_trait]
    impl Broker for Recorder {
        fn fatal(&self, _message: &str, _cause: Option<&TransportError>, _kill_process: bool) {}

        async fn on_connected(&self, _was_reconnect: bool) -> Result<()> {
            Ok(())
        }

        fn incoming_message(&self, command: &str, payload: Bytes) {
            self.messages
                .lock()
                .unwrap()
                .push((command.to_string(), payload));
        }
    }

    fn dispatch() -> (InboundDispatch, Arc<Recorder>, Arc<TransportStats>) {
        let broker = Arc::new(Recorder::default());
        let stats = Arc::new(TransportStats::new());
        let d = InboundDispatch::new("test", broker.clone(), stats.clone());
        (d, broker, stats)
    }

    #[test]
    fn test_forwards_command_and_payload() {
        // ---
        let (d, broker, stats) = dispatch();
        d.on_message(b"MOL.REQ.node-7", Bytes::from_static(b"{\"a\":1}"));

        let messages = broker.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "REQ");
        assert_eq!(messages[0].1, Bytes::from_static(b"{\"a\":1}"));
        assert_eq!(stats.snapshot().bytes_received, 7);
    }

    #[test]
    fn test_drops_undecodable_channels() {
        // ---
        let (d, broker, stats) = dispatch();
        d.on_message(&[0xff, 0xfe], Bytes::from_static(b"x"));
        d.on_message(b"MOL", Bytes::from_static(b"x"));

        assert!(broker.messages.lock().unwrap().is_empty());
        assert_eq!(stats.snapshot().packets_received, 0);
    }
}
