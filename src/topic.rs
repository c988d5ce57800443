//! Channel naming for the pub/sub transporter.
//!
//! Every node computes channel names independently, so both sides of a
//! publish/subscribe pair must arrive at the same string without talking to
//! each other. The format is positional:
//!
//! ```text
//! <prefix>.<command>[.<node_id>]
//! ```
//!
//! The command is always the second `.`-delimited field. Inbound dispatch
//! relies on that position to recover the command from a raw channel name,
//! so prefixes never contain a `.` (a namespace is joined with `-`) and a
//! command that is empty or contains a `.` is rejected. The node id is the
//! remainder of the name and may contain anything.

use crate::{Result, TransportError};

/// Default channel prefix.
pub const DEFAULT_PREFIX: &str = "MOL";

const SEPARATOR: char = '.';

/// Builds and decodes channel names for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNamer {
    prefix: String,
}

impl TopicNamer {
    // ---

    /// Namer using `prefix`, optionally scoped to a namespace.
    ///
    /// With a namespace the effective prefix becomes `"<prefix>-<namespace>"`.
    /// Any `.` in either part is replaced with `-` to keep the command in
    /// second position.
    pub fn new(prefix: impl AsRef<str>, namespace: Option<&str>) -> Self {
        // ---
        let mut effective = prefix.as_ref().replace(SEPARATOR, "-");

        if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
            effective.push('-');
            effective.push_str(&ns.replace(SEPARATOR, "-"));
        }

        Self { prefix: effective }
    }

    /// The effective prefix (namespace included).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Channel name for `command`, addressed to `node_id` when given.
    ///
    /// `None` yields the broadcast channel for the command.
    ///
    /// # Errors
    ///
    /// [`TransportError::InvalidCommand`] if `command` is empty or contains
    /// a `.`; such a name could not be told apart from another pair.
    pub fn topic_name(&self, command: &str, node_id: Option<&str>) -> Result<String> {
        // ---
        if command.is_empty() || command.contains(SEPARATOR) {
            return Err(TransportError::InvalidCommand(command.to_string()));
        }

        let mut topic = String::with_capacity(
            self.prefix.len() + command.len() + node_id.map_or(0, |n| n.len() + 1) + 1,
        );

        topic.push_str(&self.prefix);
        topic.push(SEPARATOR);
        topic.push_str(command);

        if let Some(node_id) = node_id {
            topic.push(SEPARATOR);
            topic.push_str(node_id);
        }

        Ok(topic)
    }
}

impl Default for TopicNamer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, None)
    }
}

/// Recover the command field from a channel name.
///
/// Returns `None` when the name has no second field.
pub fn command_of(topic: &str) -> Option<&str> {
    // ---
    topic.split(SEPARATOR).nth(1).filter(|cmd| !cmd.is_empty())
}
