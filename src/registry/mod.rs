//! Applies reconciliation output to a hierarchical key-value registry.
//!
//! Mutations carry keys relative to the cluster; [`RegistrySync`] namespaces
//! them under `{cluster}/` before handing them to a [`KvStore`].

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::error::Result;
use crate::types::Mutation;

pub mod consul;
pub mod memory;

pub use consul::ConsulKv;
pub use memory::MemoryKv;

/// The registry capability.  Every operation must be idempotent: removing
/// something absent is a no-op and writing an existing key overwrites it.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Removes `prefix` and every key nested beneath `prefix/`.
    async fn delete_tree(&self, prefix: &str) -> Result<()>;
}

pub struct RegistrySync {
    cluster: String,
    store: Arc<dyn KvStore>,
}

impl RegistrySync {
    pub fn new(cluster: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Self {
            cluster: cluster.into(),
            store,
        }
    }

    /// Applies `mutations` in order and returns how many were applied.
    ///
    /// Stops at the first failure.  Mutations applied before it stay applied.
    pub async fn apply(&self, mutations: &[Mutation]) -> Result<usize> {
        for mutation in mutations {
            debug!("Registry {}: {}", self.cluster, mutation);
            match mutation {
                Mutation::DeleteTree { prefix } => {
                    self.store.delete_tree(&self.namespaced(prefix)).await?
                }
                Mutation::DeleteKey { key } => self.store.delete(&self.namespaced(key)).await?,
                Mutation::AddKey { key, value } => {
                    self.store
                        .put(&self.namespaced(key), value.as_bytes())
                        .await?
                }
            }
        }
        Ok(mutations.len())
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}/{}", self.cluster, key)
    }
}
