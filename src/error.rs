//! Error taxonomy shared by the resolvers, the registry and the orchestrator.
//!
//! Every variant propagates to the caller of
//! [`DiscoveryOrchestrator::run_cycle`](crate::discovery::DiscoveryOrchestrator::run_cycle)
//! unchanged.  Nothing in the crate retries internally.

use std::error::Error as StdError;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A client or setting is missing.  Raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An upstream or registry call failed (network, auth, throttling, bad status).
    #[error("{operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A lookup that must yield a result came back empty.
    #[error("not found: {0}")]
    NotFound(String),
}

impl DiscoveryError {
    pub fn transport<E>(operation: &'static str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Transport {
            operation,
            source: Box::new(source),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn configuration(what: impl Into<String>) -> Self {
        Self::Configuration(what.into())
    }
}
