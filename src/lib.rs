//! Keeps a key-value service registry in step with the tasks running on a
//! container cluster.
//!
//! Each cycle crawls the orchestration API into a [`Snapshot`] of services,
//! diffs it against the snapshot of the previous cycle and writes the
//! difference to the registry under `{cluster}/`:
//!
//! ```text
//! {cluster}/{container}-{port}/endpoint          -> endpoint hostname
//! {cluster}/{container}-{port}/instances/{task}  -> "{ip}:{host-port}"
//! ```

pub mod assembler;
pub mod config;
pub mod discovery;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod types;
pub mod upstream;

pub use config::{AddressLookup, Config, ConsulConfig};
pub use discovery::{CycleReport, DiscoveryBuilder, DiscoveryOrchestrator};
pub use error::{DiscoveryError, Result};
pub use registry::{ConsulKv, KvStore, MemoryKv, RegistrySync};
pub use types::{Mutation, Service, Snapshot, Task};
