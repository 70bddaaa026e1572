//! # Server Configuration
//!
//! [`ServerConfig`] holds every serialisable knob of a preview server. It can be built in
//! code, read from a TOML file, and then overridden from environment variables.
//!
//! ## TOML
//!
//! ```toml
//! port_reassignment_retry_count = 20
//! inject_base_url_into_environment = true
//! index_file_names = ["index.html", "index.htm"]
//! watch = true
//!
//! [headers]
//! Cache-Control = "no-store"
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |---|---|
//! | `LIVEPREVIEW_PORT_RETRIES` | `port_reassignment_retry_count` |
//! | `LIVEPREVIEW_INJECT_BASE_URL` | `inject_base_url_into_environment` |
//! | `LIVEPREVIEW_HOST` | `host` |
//!
//! Unparseable values are ignored and the current value is kept.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

/// Default name of the environment variable the base URL is published under.
pub const DEFAULT_BASE_URL_ENV_VAR: &str = "LIVEPREVIEW_SERVER_BASEURL";

/// Serialisable server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// How many times binding moves on to the next port after a conflict.
    pub port_reassignment_retry_count: u32,
    /// Publish `http://host:port/` into the environment while serving.
    pub inject_base_url_into_environment: bool,
    /// Variable used when publishing the base URL.
    pub base_url_env_var: String,
    /// Host name used in the published/logged base URL.
    pub host: String,
    /// Interface the listener binds to.
    pub bind_address: IpAddr,
    /// Documents tried, in order, when a URL maps to a directory.
    pub index_file_names: Vec<String>,
    /// Extra headers for every response. Never override headers set by middleware.
    pub headers: BTreeMap<String, String>,
    /// Inject the reload client into HTML and answer the reload endpoints.
    pub live_reload: bool,
    /// Watch the root directory and reload browsers on change.
    pub watch: bool,
    /// How long a reload long-poll waits before answering with a keep-alive.
    pub reload_poll_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port_reassignment_retry_count: 10,
            inject_base_url_into_environment: false,
            base_url_env_var: DEFAULT_BASE_URL_ENV_VAR.to_string(),
            host: "localhost".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            index_file_names: vec!["index.html".to_string()],
            headers: BTreeMap::new(),
            live_reload: true,
            watch: false,
            reload_poll_timeout_ms: 25_000,
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("invalid server configuration")
    }

    /// Read and parse a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("in {}", path.display()))
    }

    /// Apply `LIVEPREVIEW_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        if let Some(retries) = env::var("LIVEPREVIEW_PORT_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.port_reassignment_retry_count = retries;
        }
        if let Some(inject) = env::var("LIVEPREVIEW_INJECT_BASE_URL")
            .ok()
            .and_then(|v| parse_flag(&v))
        {
            self.inject_base_url_into_environment = inject;
        }
        if let Ok(host) = env::var("LIVEPREVIEW_HOST") {
            if !host.trim().is_empty() {
                self.host = host.trim().to_string();
            }
        }
    }

    /// `scheme://host:port/` for a bound port.
    #[must_use]
    pub fn base_url(&self, port: u16) -> String {
        format!("http://{}:{}/", self.host, port)
    }

    #[must_use]
    pub fn reload_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.reload_poll_timeout_ms)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port_reassignment_retry_count, 10);
        assert!(!cfg.inject_base_url_into_environment);
        assert_eq!(cfg.index_file_names, vec!["index.html".to_string()]);
        assert!(cfg.live_reload);
        assert_eq!(cfg.base_url(8080), "http://localhost:8080/");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = ServerConfig::from_toml_str(
            r#"
port_reassignment_retry_count = 3
index_file_names = ["index.htm", "index.html"]

[headers]
Cache-Control = "no-store"
"#,
        )
        .unwrap();
        assert_eq!(cfg.port_reassignment_retry_count, 3);
        assert_eq!(cfg.index_file_names.len(), 2);
        assert_eq!(cfg.headers.get("Cache-Control").unwrap(), "no-store");
        assert_eq!(cfg.host, "localhost");
        assert!(!cfg.watch);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(ServerConfig::from_toml_str("port_reassignment_retry_count = \"many\"").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
