//! Configuration schema for `switchback.toml`.
//!
//! Every field has a default so a partial (or absent) file is valid:
//!
//! ```toml
//! [server]
//! port = 8123
//! assets_dir = "/opt/switchback/assets"
//!
//! [proxy]
//! max_retries = 2
//! retry_backoff_ms = 1000
//! ```

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Browser-like User-Agent sent on every upstream request. Some IPTV and CDN
/// hosts refuse requests without one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 12; Streaming Box) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
}

impl GatewayConfig {
    /// Reject values that would make the gateway unusable.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::invalid("server.port", "must not be 0"));
        }
        if self.proxy.max_redirects > 20 {
            return Err(Error::invalid(
                "proxy.max_redirects",
                format!("{} exceeds the limit of 20", self.proxy.max_redirects),
            ));
        }
        if self.proxy.max_retries > 10 {
            return Err(Error::invalid(
                "proxy.max_retries",
                format!("{} exceeds the limit of 10", self.proxy.max_retries),
            ));
        }
        if self.proxy.user_agent.trim().is_empty() {
            return Err(Error::invalid("proxy.user_agent", "must not be empty"));
        }
        Ok(())
    }
}

/// Listener settings for the loopback asset/proxy server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind. Keep this on loopback; callers other than
    /// `127.0.0.1`/`::1` are refused regardless.
    pub bind: String,
    /// Listener port. Also used as the port of rewritten playlist links.
    pub port: u16,
    /// Directory holding the bundled web client.
    pub assets_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8123,
            assets_dir: PathBuf::from("assets"),
        }
    }
}

/// Upstream fetch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub connect_timeout_secs: u64,
    /// Per-read timeout. Live streams have no total-duration limit.
    pub read_timeout_secs: u64,
    pub max_redirects: usize,
    /// Retries after the first attempt, for transport errors and 5xx.
    pub max_retries: u32,
    /// Linear backoff unit: retry `n` (0-based) sleeps `(n + 1) * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    pub user_agent: String,
    /// How much of an upstream error body is echoed back to the caller.
    pub error_snippet_bytes: usize,
}

impl ProxyConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            max_redirects: 5,
            max_retries: 2,
            retry_backoff_ms: 1000,
            user_agent: DEFAULT_USER_AGENT.into(),
            error_snippet_bytes: 1024,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_gateway_behaviour() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.proxy.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.proxy.read_timeout(), Duration::from_secs(60));
        assert_eq!(config.proxy.max_redirects, 5);
        assert_eq!(config.proxy.max_retries, 2);
        assert_eq!(config.proxy.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.proxy.error_snippet_bytes, 1024);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [proxy]
            max_retries = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.proxy.max_retries, 4);
        assert_eq!(config.proxy.retry_backoff_ms, 1000);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = GatewayConfig::default();
        config.server.port = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::Invalid {
                field: "server.port",
                ..
            })
        ));

        let mut config = GatewayConfig::default();
        config.proxy.max_redirects = 50;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.proxy.max_retries = 11;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.proxy.user_agent = "  ".into();
        assert!(config.validate().is_err());
    }
}
