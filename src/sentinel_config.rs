//! Sentinel connection configuration.
//!
//! This type names which sentinels to ask and which master set to resolve.
//! It never holds a master address: the connector asks the sentinels for
//! one on every (re)connect.

use std::collections::BTreeMap;
use std::fmt;

use crate::topic::DEFAULT_PREFIX;
use crate::RetryConfig;

/// One sentinel endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SentinelAddr {
    pub host: String,
    pub port: u16,
}

impl SentinelAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for SentinelAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Additional client options, passed through to the store client.
///
/// `db`, `username` and `password` apply to the resolved master
/// connection. `sentinel_password` authenticates against the sentinels
/// themselves.
///
/// `extra` holds string-keyed options. Recognized keys:
///
/// | key | values | applies to |
/// |---|---|---|
/// | `protocol` | `resp2` (default), `resp3` | master and sentinel connections |
/// | `tls` | `off` (default), `secure`, `insecure` | master connection |
/// | `sentinel_username` | any non-empty name | sentinel connections |
///
/// Any other key is a configuration error, reported at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sentinel_password: Option<String>,
    pub extra: BTreeMap<String, String>,
}

/// Wire protocol spoken to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Resp2,
    Resp3,
}

/// TLS use on the master connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsSetting {
    #[default]
    Off,
    /// Verify the server certificate.
    Secure,
    /// Encrypt without verifying the certificate.
    Insecure,
}

/// The recognized `extra` options, parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraOptions {
    pub protocol: Protocol,
    pub tls: TlsSetting,
    pub sentinel_username: Option<String>,
}

impl ClientOptions {
    // ---

    /// Parse `extra` into typed options.
    ///
    /// Returns a message naming the offending key for an unknown key or an
    /// unrecognized value.
    pub fn parse_extra(&self) -> std::result::Result<ExtraOptions, String> {
        // ---
        let mut parsed = ExtraOptions::default();

        for (key, value) in &self.extra {
            match key.as_str() {
                "protocol" => {
                    parsed.protocol = match value.to_ascii_lowercase().as_str() {
                        "resp2" => Protocol::Resp2,
                        "resp3" => Protocol::Resp3,
                        _ => return Err(bad_value(key, value, "resp2, resp3")),
                    }
                }
                "tls" => {
                    parsed.tls = match value.to_ascii_lowercase().as_str() {
                        "off" => TlsSetting::Off,
                        "secure" => TlsSetting::Secure,
                        "insecure" => TlsSetting::Insecure,
                        _ => return Err(bad_value(key, value, "off, secure, insecure")),
                    }
                }
                "sentinel_username" => {
                    if value.is_empty() {
                        return Err(bad_value(key, value, "a non-empty name"));
                    }
                    parsed.sentinel_username = Some(value.clone());
                }
                _ => {
                    return Err(format!(
                        "unknown client option `{key}` (known: protocol, tls, sentinel_username)"
                    ))
                }
            }
        }

        Ok(parsed)
    }
}

fn bad_value(key: &str, value: &str, expected: &str) -> String {
    format!("client option `{key}` has invalid value `{value}` (expected {expected})")
}

/// Sentinel transporter configuration.
///
/// Immutable once handed to the transporter. Both `sentinels` and `name`
/// are required; [`SentinelConfig::validate`] reports what is missing.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    // ---
    /// Sentinel endpoints, asked in order.
    pub sentinels: Vec<SentinelAddr>,

    /// Master set name the sentinels should resolve.
    pub name: String,

    /// Options passed through to the store client.
    pub options: ClientOptions,

    /// Channel prefix. Default: `"MOL"`.
    pub prefix: String,

    /// Optional namespace; channels become `"<prefix>-<namespace>.…"`.
    pub namespace: Option<String>,

    /// Backoff used by connections re-resolving the master after a drop.
    pub reconnect: RetryConfig,
}

impl SentinelConfig {
    /// Create a config for master set `name` with no sentinels yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            sentinels: Vec::new(),
            name: name.into(),
            options: ClientOptions::default(),
            prefix: DEFAULT_PREFIX.to_string(),
            namespace: None,
            reconnect: RetryConfig::default(),
        }
    }

    /// Append a sentinel endpoint.
    pub fn with_sentinel(mut self, host: impl Into<String>, port: u16) -> Self {
        self.sentinels.push(SentinelAddr::new(host, port));
        self
    }

    /// Replace the pass-through client options.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the channel prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Scope all channels to a namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the master re-resolution backoff.
    pub fn with_reconnect(mut self, retry: RetryConfig) -> Self {
        self.reconnect = retry;
        self
    }

    /// Check the required fields.
    ///
    /// Returns the message to report through the broker's fatal hook for the
    /// first problem found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        // ---
        if self.sentinels.is_empty() {
            return Err("at least one sentinel must be specified in `sentinels`".into());
        }
        if self.name.trim().is_empty() {
            return Err("the master set name must be specified in `name`".into());
        }
        self.options.parse_extra()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_valid_config() {
        // ---
        let config = SentinelConfig::new("mymaster").with_sentinel("10.0.0.1", 26379);
        assert!(config.validate().is_ok());
        assert_eq!(config.prefix, "MOL");
        assert_eq!(config.sentinels[0].to_string(), "10.0.0.1:26379");
    }

    #[test]
    fn test_missing_sentinels() {
        // ---
        let err = SentinelConfig::new("mymaster").validate().unwrap_err();
        assert!(err.contains("sentinel"));
    }

    #[test]
    fn test_missing_name() {
        // ---
        let err = SentinelConfig::new("  ")
            .with_sentinel("localhost", 26379)
            .validate()
            .unwrap_err();
        assert!(err.contains("name"));
    }

    fn with_extra(pairs: &[(&str, &str)]) -> ClientOptions {
        ClientOptions {
            extra: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extra_defaults() {
        // ---
        let parsed = ClientOptions::default().parse_extra().unwrap();
        assert_eq!(parsed, ExtraOptions::default());
        assert_eq!(parsed.protocol, Protocol::Resp2);
        assert_eq!(parsed.tls, TlsSetting::Off);
    }

    #[test]
    fn test_extra_known_keys() {
        // ---
        let options = with_extra(&[
            ("protocol", "RESP3"),
            ("tls", "insecure"),
            ("sentinel_username", "watcher"),
        ]);

        let parsed = options.parse_extra().unwrap();
        assert_eq!(parsed.protocol, Protocol::Resp3);
        assert_eq!(parsed.tls, TlsSetting::Insecure);
        assert_eq!(parsed.sentinel_username.as_deref(), Some("watcher"));
    }

    #[test]
    fn test_extra_unknown_key_rejected() {
        // ---
        let err = with_extra(&[("retry_strategy", "fast")]).parse_extra().unwrap_err();
        assert!(err.contains("retry_strategy"), "{err}");

        let config = SentinelConfig::new("mymaster")
            .with_sentinel("localhost", 26379)
            .with_options(with_extra(&[("retry_strategy", "fast")]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extra_bad_value_rejected() {
        // ---
        let err = with_extra(&[("tls", "maybe")]).parse_extra().unwrap_err();
        assert!(err.contains("tls") && err.contains("maybe"), "{err}");
    }
}
