// Copyright (c) 2025 - Cowboy AI, Inc.
//! Gateway configuration
//!
//! Every setting has a default and can be overridden by a `C2C_` prefixed
//! environment variable:
//!
//! | variable                      | default                    |
//! |-------------------------------|----------------------------|
//! | `C2C_LISTEN_ADDR`             | `0.0.0.0:8080`             |
//! | `C2C_NATS_URL`                | `nats://localhost:4222`    |
//! | `C2C_NATS_NAME`               | `c2c-gateway`              |
//! | `C2C_SUBSCRIPTIONS_BUCKET`    | `c2c-subscriptions`        |
//! | `C2C_RECONNECT_INTERVAL_SECS` | `10`                       |
//! | `C2C_EMIT_TIMEOUT_SECS`       | `10`                       |
//! | `C2C_HUB_ID`                  | `hub`                      |
//! | `C2C_ACCESS_TOKENS`           | empty (`token=owner,...`)  |
//! | `C2C_AUTH_WHITELIST`          | `/healthz`                 |

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::cloud2cloud::DEFAULT_RECONNECT_INTERVAL;
use crate::errors::{HubError, HubResult};
use crate::nats::NatsConfig;

pub const ENV_PREFIX: &str = "C2C_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: String,
    pub nats: NatsConfig,
    /// JetStream key-value bucket holding subscriptions
    pub subscriptions_bucket: String,
    pub reconnect_interval: Duration,
    /// Timeout of one webhook delivery
    pub emit_timeout: Duration,
    pub hub_id: String,
    /// Access token to owner table of the bundled token validator
    pub access_tokens: HashMap<String, String>,
    /// Paths served without authentication
    pub auth_whitelist: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            nats: NatsConfig::default(),
            subscriptions_bucket: "c2c-subscriptions".to_string(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            emit_timeout: Duration::from_secs(10),
            hub_id: "hub".to_string(),
            access_tokens: HashMap::new(),
            auth_whitelist: vec!["/healthz".to_string()],
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> HubResult<Self> {
        Self::from_lookup(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    /// Builds the configuration from a variable lookup without the prefix.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> HubResult<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(urls) = lookup("NATS_URL") {
            config.nats.servers = split_list(&urls);
        }
        if let Some(name) = lookup("NATS_NAME") {
            config.nats.name = name;
        }
        if let Some(bucket) = lookup("SUBSCRIPTIONS_BUCKET") {
            config.subscriptions_bucket = bucket;
        }
        if let Some(secs) = lookup("RECONNECT_INTERVAL_SECS") {
            config.reconnect_interval = parse_secs("RECONNECT_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("EMIT_TIMEOUT_SECS") {
            config.emit_timeout = parse_secs("EMIT_TIMEOUT_SECS", &secs)?;
        }
        if let Some(hub_id) = lookup("HUB_ID") {
            config.hub_id = hub_id;
        }
        if let Some(tokens) = lookup("ACCESS_TOKENS") {
            config.access_tokens = parse_tokens(&tokens)?;
        }
        if let Some(whitelist) = lookup("AUTH_WHITELIST") {
            config.auth_whitelist = split_list(&whitelist);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.nats.servers.is_empty() {
            return Err(HubError::Configuration("no NATS servers configured".into()));
        }
        if self.subscriptions_bucket.is_empty() {
            return Err(HubError::Configuration("empty subscriptions bucket".into()));
        }
        if self.reconnect_interval.is_zero() || self.emit_timeout.is_zero() {
            return Err(HubError::Configuration(
                "reconnect interval and emit timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

fn parse_secs(name: &str, value: &str) -> HubResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| HubError::Configuration(format!("{ENV_PREFIX}{name}: {e}")))
}

fn parse_tokens(value: &str) -> HubResult<HashMap<String, String>> {
    split_list(value)
        .into_iter()
        .map(|pair| match pair.split_once('=') {
            Some((token, owner)) if !token.is_empty() && !owner.is_empty() => {
                Ok((token.to_string(), owner.to_string()))
            }
            _ => Err(HubError::Configuration(format!(
                "{ENV_PREFIX}ACCESS_TOKENS: expected token=owner, got '{pair}'"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_overrides() {
        let vars = HashMap::from([
            ("NATS_URL", "nats://a:4222, nats://b:4222"),
            ("EMIT_TIMEOUT_SECS", "3"),
            ("ACCESS_TOKENS", "t1=alice,t2=bob"),
        ]);
        let config =
            GatewayConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.nats.servers, vec!["nats://a:4222", "nats://b:4222"]);
        assert_eq!(config.emit_timeout, Duration::from_secs(3));
        assert_eq!(config.access_tokens.get("t2").map(String::as_str), Some("bob"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(GatewayConfig::from_lookup(|name| {
            (name == "RECONNECT_INTERVAL_SECS").then(|| "soon".to_string())
        })
        .is_err());
        assert!(GatewayConfig::from_lookup(|name| {
            (name == "ACCESS_TOKENS").then(|| "orphan".to_string())
        })
        .is_err());
        assert!(GatewayConfig::from_lookup(|name| {
            (name == "EMIT_TIMEOUT_SECS").then(|| "0".to_string())
        })
        .is_err());
    }
}
