//! Orchestration and compute APIs as consumed by the resolvers.
//!
//! The traits mirror the handful of calls the resolvers make.  Records are
//! reduced to the fields discovery needs; adapters drop everything else at
//! the boundary.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{DiscoveryError, Result};

#[cfg(feature = "aws")]
pub mod aws;
#[cfg(feature = "aws")]
pub use aws::{AwsComputeApi, AwsContainerApi};

#[cfg(test)]
pub(crate) mod fake;

/// Maximum number of items a single describe call accepts.
pub const DESCRIBE_BATCH_SIZE: usize = 100;

/// One page of a paginated listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<String>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInstance {
    pub arn: String,
    pub ec2_instance_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkBinding {
    pub container_port: u16,
    pub host_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub name: String,
    pub network_bindings: Vec<NetworkBinding>,
}

/// A running orchestration-level task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_arn: String,
    pub container_instance_arn: Option<String>,
    pub task_definition_arn: String,
    pub containers: Vec<ContainerRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDefinition {
    pub name: String,
    pub docker_labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub arn: String,
    pub container_definitions: Vec<ContainerDefinition>,
}

impl TaskDefinition {
    pub fn container(&self, name: &str) -> Option<&ContainerDefinition> {
        self.container_definitions.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub instance_id: String,
    pub private_ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservation {
    pub instances: Vec<Instance>,
}

/// The container-orchestration service.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    async fn list_container_instances(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<Page>;

    async fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> Result<Vec<ContainerInstance>>;

    async fn list_tasks(&self, cluster: &str, next_token: Option<String>) -> Result<Page>;

    async fn describe_tasks(&self, cluster: &str, arns: &[String]) -> Result<Vec<TaskRecord>>;

    async fn describe_task_definition(&self, arn: &str) -> Result<TaskDefinition>;
}

/// The compute service backing container instances.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<Reservation>>;
}

pub type PageFuture = Pin<Box<dyn Future<Output = Result<Page>> + Send>>;

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Turns a page fetcher into a lazy stream of every item across all pages.
///
/// Nothing is fetched until the stream is polled, and calling `paginate`
/// again restarts from the first page.  Pages are followed until the
/// continuation token is absent or empty; an empty page in the middle does
/// not end the sequence.
pub fn paginate<F>(fetch: F) -> BoxStream<'static, Result<String>>
where
    F: Fn(Option<String>) -> PageFuture + Send + Sync + 'static,
{
    let fetch = Arc::new(fetch);
    stream::try_unfold(Cursor::Start, move |cursor| {
        next_page(Arc::clone(&fetch), cursor)
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok::<String, DiscoveryError>)))
    .try_flatten()
    .boxed()
}

async fn next_page<F>(fetch: Arc<F>, cursor: Cursor) -> Result<Option<(Vec<String>, Cursor)>>
where
    F: Fn(Option<String>) -> PageFuture + Send + Sync,
{
    let token = match cursor {
        Cursor::Done => return Ok(None),
        Cursor::Start => None,
        Cursor::Next(token) => Some(token),
    };
    let page = fetch(token).await?;
    let next = match page.next_token {
        Some(token) if !token.is_empty() => Cursor::Next(token),
        _ => Cursor::Done,
    };
    Ok(Some((page.items, next)))
}
