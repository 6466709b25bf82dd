use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KvStore;
use crate::error::{DiscoveryError, Result};

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Vec<u8>>,
    // remaining successful writes before every call fails
    budget: Option<usize>,
}

/// Ordered in-memory registry.  Useful for dry runs and tests.
#[derive(Default)]
pub struct MemoryKv {
    inner: RwLock<Inner>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(key)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub async fn keys(&self) -> Vec<String> {
        self.inner.read().await.entries.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Lets `operations` more calls succeed, then fails every call.
    pub async fn fail_after(&self, operations: usize) {
        self.inner.write().await.budget = Some(operations);
    }

    fn charge(inner: &mut Inner, operation: &'static str) -> Result<()> {
        match inner.budget.as_mut() {
            Some(0) => Err(DiscoveryError::transport(
                operation,
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "registry unavailable"),
            )),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::charge(&mut inner, "registry put")?;
        inner.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::charge(&mut inner, "registry delete")?;
        inner.entries.remove(key);
        Ok(())
    }

    async fn delete_tree(&self, prefix: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::charge(&mut inner, "registry delete-tree")?;
        let nested = format!("{}/", prefix.trim_end_matches('/'));
        inner
            .entries
            .retain(|key, _| key != prefix && !key.starts_with(&nested));
        Ok(())
    }
}
