//! Validated agent configuration.
//!
//! Options arrive from the host one key at a time. Each assignment is
//! validated on its own: a bad value aborts that assignment only and the
//! prior value stays in effect. An empty value resets the option to its
//! documented default, and unknown keys are logged and ignored.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};

pub const DEFAULT_REFRESH_INTERVAL: u64 = 10;
pub const MIN_REFRESH_INTERVAL: u64 = 10;
pub const MAX_REFRESH_INTERVAL: u64 = 86_399;

pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    cache_url: Option<String>,
    refresh_interval: u64,
    listen_address: SocketAddr,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cache_url: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            listen_address: DEFAULT_LISTEN_ADDRESS
                .parse()
                .expect("default listen address is valid"),
        }
    }
}

impl AgentConfig {
    /// Cache URL; `None` disables fetching entirely.
    pub fn cache_url(&self) -> Option<&str> {
        self.cache_url.as_deref()
    }

    /// Seconds between refresh cycles.
    pub fn refresh_interval(&self) -> u64 {
        self.refresh_interval
    }

    /// Address the policy listener binds.
    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Applies one host-delivered option.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        let value = normalize(value);
        tracing::info!(key, value = value.unwrap_or(""), "setting configuration option");
        match key {
            "cache_url" => {
                self.cache_url = value.map(str::to_string);
                Ok(())
            }
            "refresh_interval" => {
                self.refresh_interval = parse_refresh_interval(value)?;
                Ok(())
            }
            "listen_address" => {
                self.listen_address = parse_listen_address(value)?;
                Ok(())
            }
            _ => {
                tracing::warn!(key, "ignoring unknown option");
                Ok(())
            }
        }
    }
}

fn normalize(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_refresh_interval(value: Option<&str>) -> Result<u64> {
    let Some(value) = value else {
        return Ok(DEFAULT_REFRESH_INTERVAL);
    };
    let interval = value
        .parse::<u64>()
        .with_context(|| format!("refresh_interval '{value}' is not an integer"))?;
    if !(MIN_REFRESH_INTERVAL..=MAX_REFRESH_INTERVAL).contains(&interval) {
        bail!(
            "refresh_interval must be in range {MIN_REFRESH_INTERVAL} - {MAX_REFRESH_INTERVAL}, got {interval}"
        );
    }
    Ok(interval)
}

fn parse_listen_address(value: Option<&str>) -> Result<SocketAddr> {
    let Some(value) = value else {
        return Ok(DEFAULT_LISTEN_ADDRESS
            .parse()
            .expect("default listen address is valid"));
    };
    value
        .parse::<SocketAddr>()
        .with_context(|| format!("listen_address '{value}' is not a socket address"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_interval_boundaries() {
        let mut config = AgentConfig::default();
        assert!(config.set_option("refresh_interval", "9").is_err());
        assert!(config.set_option("refresh_interval", "86400").is_err());
        assert_eq!(config.refresh_interval(), DEFAULT_REFRESH_INTERVAL);

        assert!(config.set_option("refresh_interval", "10").is_ok());
        assert_eq!(config.refresh_interval(), 10);
        assert!(config.set_option("refresh_interval", "86399").is_ok());
        assert_eq!(config.refresh_interval(), 86_399);
    }

    #[test]
    fn invalid_assignment_keeps_the_prior_value() {
        let mut config = AgentConfig::default();
        config.set_option("refresh_interval", "120").unwrap();
        assert!(config.set_option("refresh_interval", "soon").is_err());
        assert_eq!(config.refresh_interval(), 120);
    }

    #[test]
    fn empty_value_resets_to_the_default() {
        let mut config = AgentConfig::default();
        config.set_option("refresh_interval", "120").unwrap();
        config.set_option("refresh_interval", "").unwrap();
        assert_eq!(config.refresh_interval(), DEFAULT_REFRESH_INTERVAL);

        config.set_option("cache_url", "http://cache/api/v1").unwrap();
        config.set_option("cache_url", "  ").unwrap();
        assert_eq!(config.cache_url(), None);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut config = AgentConfig::default();
        assert!(config.set_option("colour", "mauve").is_ok());
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn listen_address_is_validated() {
        let mut config = AgentConfig::default();
        config.set_option("listen_address", "127.0.0.1:0").unwrap();
        assert_eq!(config.listen_address().port(), 0);
        assert!(config.set_option("listen_address", "localhost").is_err());
        config.set_option("listen_address", "").unwrap();
        assert_eq!(config.listen_address().port(), 8000);
    }
}
