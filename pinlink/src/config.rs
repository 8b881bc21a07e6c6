//! Link configuration, usually parsed from a URI such as
//! `tcp://192.168.1.20:4478?reconnect=true&boot_wait=ready`.

use crate::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default TCP port of a device proxy.
pub const DEFAULT_PORT: u16 = 4478;

/// How [`Link::wait_for_boot`](crate::Link::wait_for_boot)
/// decides the device is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootWaitMode {
    /// Send a probe request and wait for its reply.
    #[default]
    Probe,
    /// Send nothing; wait for the device's ready marker.
    ReadyMessageOnly,
}

impl BootWaitMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "probe" => Some(BootWaitMode::Probe),
            "ready" | "ready_message_only" => Some(BootWaitMode::ReadyMessageOnly),
            _ => None,
        }
    }
}

/// Configuration for [`ConnectionLink::connect`](crate::ConnectionLink::connect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    /// Redial the target after a stream failure.
    pub reconnect: bool,
    pub reconnect_delay_ms: u64,
    /// Consecutive malformed frames tolerated before the stream counts as lost.
    pub max_malformed: usize,
    /// Wait this long for the device to boot while connecting. Zero skips the wait.
    pub boot_timeout_ms: u64,
    pub boot_wait: BootWaitMode,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            reconnect: false,
            reconnect_delay_ms: 1000,
            max_malformed: 16,
            boot_timeout_ms: 0,
            boot_wait: BootWaitMode::Probe,
        }
    }
}

impl LinkConfig {
    /// Parses a `tcp://host[:port][?key=value..]` URI.
    ///
    /// Recognized keys: `reconnect`, `reconnect_delay_ms`, `max_malformed`,
    /// `boot_timeout_ms`, `boot_wait` (`probe` or `ready`).
    pub fn from_uri(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)?;
        if url.scheme() != "tcp" {
            return Err(LinkError::Config(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }

        let mut cfg = LinkConfig::default();
        cfg.host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| LinkError::Config(format!("missing host in {}", uri)))?
            .to_string();
        cfg.port = url.port().unwrap_or(DEFAULT_PORT);

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "reconnect" => cfg.reconnect = parse_value(&key, &value)?,
                "reconnect_delay_ms" => cfg.reconnect_delay_ms = parse_value(&key, &value)?,
                "max_malformed" => cfg.max_malformed = parse_value(&key, &value)?,
                "boot_timeout_ms" => cfg.boot_timeout_ms = parse_value(&key, &value)?,
                "boot_wait" => {
                    cfg.boot_wait = BootWaitMode::parse(&value).ok_or_else(|| {
                        LinkError::Config(format!("invalid boot_wait {:?}", value))
                    })?
                }
                other => {
                    return Err(LinkError::Config(format!("unknown parameter {:?}", other)));
                }
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks values that cannot be expressed by the field types alone.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(LinkError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(LinkError::Config("port must not be 0".to_string()));
        }
        if self.reconnect && self.reconnect_delay_ms == 0 {
            return Err(LinkError::Config(
                "reconnect_delay_ms must be positive when reconnect is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Returns the boot timeout, or `None` if no boot wait is configured.
    pub fn boot_timeout(&self) -> Option<Duration> {
        (self.boot_timeout_ms > 0).then(|| Duration::from_millis(self.boot_timeout_ms))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| LinkError::Config(format!("invalid value {:?} for {}", value, key)))
}
