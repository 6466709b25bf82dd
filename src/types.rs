//! Data structures shared by the assembler, the diff engine and the registry.
//!
//! A [`Snapshot`] is rebuilt from scratch every cycle and maps a service key
//! (`{container-name}-{container-port}`) to the [`Service`] discovered under it.
//! The reconciliation engine turns two snapshots into [`Mutation`]s, which the
//! registry applies relative to the cluster prefix.

use std::collections::BTreeMap;
use std::fmt;

/// The complete discovered state at one point in time.
///
/// Ordered so that diffs and registry writes come out in a stable order.
pub type Snapshot = BTreeMap<String, Service>;

/// One exposed network binding of one container of one running task.
///
/// Equality is structural over every field: the same task id with a new
/// address is a different `Task`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Task {
    pub name: String,
    pub task_id: String,
    pub ip_address: String,
    pub container_port: u16,
    pub host_port: u16,
}

impl Task {
    /// Registry value for the instance key, `"{ip}:{host_port}"`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip_address, self.host_port)
    }
}

/// A logical service: a routing name plus the tasks currently backing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Service {
    pub endpoint: String,
    pub tasks: Vec<Task>,
}

impl Service {
    pub fn contains(&self, task: &Task) -> bool {
        self.tasks.iter().any(|t| t == task)
    }
}

/// Derives the identity of a [`Service`].
pub fn service_key(container_name: &str, container_port: u16) -> String {
    format!("{}-{}", container_name, container_port)
}

/// Extracts the task identifier from a task ARN.
///
/// Both `arn:...:task/<id>` and `arn:...:task/<cluster>/<id>` end with the id.
pub fn task_id(task_arn: &str) -> &str {
    task_arn.rsplit('/').next().unwrap_or(task_arn)
}

/// A single registry change, keyed relative to the cluster prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Remove a key and everything nested beneath it.
    DeleteTree { prefix: String },
    /// Remove a single key.
    DeleteKey { key: String },
    /// Create or overwrite a key.
    AddKey { key: String, value: String },
}

impl Mutation {
    pub fn delete_tree(prefix: impl Into<String>) -> Self {
        Mutation::DeleteTree {
            prefix: prefix.into(),
        }
    }

    pub fn delete_key(key: impl Into<String>) -> Self {
        Mutation::DeleteKey { key: key.into() }
    }

    pub fn add_key(key: impl Into<String>, value: impl Into<String>) -> Self {
        Mutation::AddKey {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_deletion(&self) -> bool {
        !matches!(self, Mutation::AddKey { .. })
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::DeleteTree { prefix } => write!(f, "delete-tree {}", prefix),
            Mutation::DeleteKey { key } => write!(f, "delete {}", key),
            Mutation::AddKey { key, value } => write!(f, "put {} = {}", key, value),
        }
    }
}
