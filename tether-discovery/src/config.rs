//! Store connection settings

use crate::error::DiscoveryError;
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Default etcd endpoint
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:2379";

/// Default lease time-to-live in seconds
pub const DEFAULT_TTL_SECS: i64 = 10;

/// Default connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// etcd connection and lease settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    /// Cluster endpoints
    pub endpoints: Vec<String>,

    /// User name for authentication
    pub user: Option<String>,

    /// Password for authentication
    pub password: Option<String>,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Lease time-to-live in seconds for registrars built from this config
    pub ttl: i64,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            user: None,
            password: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            ttl: DEFAULT_TTL_SECS,
        }
    }
}

impl EtcdConfig {
    /// Create config from `TETHER_ETCD_*` environment variables.
    ///
    /// - `TETHER_ETCD_ENDPOINTS` - comma separated endpoints
    /// - `TETHER_ETCD_USER` / `TETHER_ETCD_PASSWORD` - credentials
    /// - `TETHER_ETCD_CONNECT_TIMEOUT_SECS` - connect timeout
    /// - `TETHER_SERVICE_TTL` - lease time-to-live
    pub fn from_env() -> Result<Self, DiscoveryError> {
        let mut config = Self::default();

        if let Ok(endpoints) = env::var("TETHER_ETCD_ENDPOINTS") {
            config.endpoints = parse_endpoints(&endpoints);
        }

        config.user = env::var("TETHER_ETCD_USER").ok();
        config.password = env::var("TETHER_ETCD_PASSWORD").ok();

        if let Ok(timeout) = env::var("TETHER_ETCD_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout_secs = timeout.parse().map_err(|_| {
                DiscoveryError::InvalidConfiguration(format!(
                    "TETHER_ETCD_CONNECT_TIMEOUT_SECS is not a number: {}",
                    timeout
                ))
            })?;
        }

        if let Ok(ttl) = env::var("TETHER_SERVICE_TTL") {
            config.ttl = ttl.parse().map_err(|_| {
                DiscoveryError::InvalidConfiguration(format!(
                    "TETHER_SERVICE_TTL is not a number: {}",
                    ttl
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.endpoints.is_empty() {
            return Err(DiscoveryError::InvalidConfiguration(
                "at least one etcd endpoint is required".to_string(),
            ));
        }
        if self.user.is_some() != self.password.is_some() {
            return Err(DiscoveryError::InvalidConfiguration(
                "etcd user and password must be set together".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(DiscoveryError::InvalidConfiguration(
                "connect timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn parse_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|endpoint| !endpoint.is_empty())
        .map(String::from)
        .collect()
}
