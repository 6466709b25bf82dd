//! Consul KV backend over the agent's HTTP API.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Url};

use super::KvStore;
use crate::config::ConsulConfig;
use crate::error::{DiscoveryError, Result};

const TOKEN_HEADER: &str = "X-Consul-Token";

pub struct ConsulKv {
    client: Client,
    base: Url,
    token: Option<String>,
    datacenter: Option<String>,
}

impl ConsulKv {
    pub fn new(config: &ConsulConfig) -> Result<Self> {
        let base = Url::parse(&config.address).map_err(|e| {
            DiscoveryError::configuration(format!(
                "invalid consul address {:?}: {}",
                config.address, e
            ))
        })?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(DiscoveryError::configuration(format!(
                "consul address must be an http(s) URL, got {:?}",
                config.address
            )));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| DiscoveryError::transport("consul client", e))?;
        Ok(Self {
            client,
            base,
            token: config.token.clone(),
            datacenter: config.datacenter.clone(),
        })
    }

    /// Each `/`-separated part of `key` becomes one percent-encoded path segment.
    fn url(&self, key: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                DiscoveryError::configuration(format!(
                    "consul address {} cannot carry a path",
                    self.base
                ))
            })?
            .pop_if_empty()
            .extend(["v1", "kv"])
            .extend(key.trim_start_matches('/').split('/'));
        Ok(url)
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(dc) = &self.datacenter {
            request = request.query(&[("dc", dc)]);
        }
        request
    }

    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<String> {
        let response = self
            .authorize(request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DiscoveryError::transport(operation, e))?;
        response
            .text()
            .await
            .map_err(|e| DiscoveryError::transport(operation, e))
    }
}

#[async_trait]
impl KvStore for ConsulKv {
    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let body = self
            .send("consul PUT", self.client.put(self.url(key)?).body(value.to_vec()))
            .await?;
        // Consul answers `true` or `false`; `false` means the write was refused.
        let written: bool = serde_json::from_str(body.trim())
            .map_err(|e| DiscoveryError::transport("consul PUT", e))?;
        if !written {
            return Err(DiscoveryError::transport(
                "consul PUT",
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("write of {} was rejected", key),
                ),
            ));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.send("consul DELETE", self.client.delete(self.url(key)?))
            .await?;
        Ok(())
    }

    async fn delete_tree(&self, prefix: &str) -> Result<()> {
        let prefix = prefix.trim_end_matches('/');
        self.delete(prefix).await?;

        // Consul matches prefixes textually, so anchor on the separator.
        let nested = format!("{}/", prefix);
        debug!("Consul recursive delete of {}", nested);
        self.send(
            "consul DELETE recurse",
            self.client
                .delete(self.url(&nested)?)
                .query(&[("recurse", "true")]),
        )
        .await?;
        Ok(())
    }
}
