use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{DiscoveryError, Result};

/// How container-instance ARNs are turned into private addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressLookup {
    /// One describe round trip per instance.
    #[default]
    PerInstance,
    /// One describe call per batch of instances.
    Batched,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct ConsulConfig {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8500".into(),
            token: None,
            datacenter: None,
        }
    }
}

// The ACL token never reaches the logs.
impl fmt::Debug for ConsulConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsulConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("datacenter", &self.datacenter)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub cluster: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_domain: Option<String>,
    pub hostname_label: String,
    pub address_lookup: AddressLookup,
    pub interval_secs: u64,
    pub max_backoff_secs: u64,
    pub consul: ConsulConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: String::new(),
            region: "us-east-1".into(),
            default_domain: None,
            // Docker label carrying the endpoint override
            hostname_label: "hostname".into(),
            address_lookup: AddressLookup::PerInstance,
            interval_secs: 15,
            max_backoff_secs: 300,
            consul: ConsulConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut config: Config = Self::figment()
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // Support Docker-style secrets
        if let Ok(secret_file) = std::env::var("REGISTRAR_CONSUL_TOKEN_FILE") {
            config.consul.token = Some(std::fs::read_to_string(secret_file)?.trim().to_string());
        }

        config.validate()?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("registrar.toml"))
            .merge(Json::file("registrar.json"))
            .merge(Env::prefixed("REGISTRAR_").split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster.trim().is_empty() {
            return Err(DiscoveryError::configuration("cluster name must be set"));
        }
        if self.hostname_label.is_empty() {
            return Err(DiscoveryError::configuration("hostname_label must not be empty"));
        }
        if self.interval_secs == 0 {
            return Err(DiscoveryError::configuration("interval_secs must be positive"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs.max(self.interval_secs))
    }
}
