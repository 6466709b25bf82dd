use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use log::debug;

use crate::error::{DiscoveryError, Result};
use crate::upstream::{
    paginate, ContainerApi, PageFuture, TaskDefinition, TaskRecord, DESCRIBE_BATCH_SIZE,
};

/// Fetches running tasks and the definitions they were launched from.
pub struct TaskResolver {
    cluster: String,
    api: Arc<dyn ContainerApi>,
}

impl TaskResolver {
    pub fn new(cluster: impl Into<String>, api: Arc<dyn ContainerApi>) -> Self {
        Self {
            cluster: cluster.into(),
            api,
        }
    }

    /// Every task ARN in the cluster, page by page.
    pub fn list_task_arns(&self) -> BoxStream<'static, Result<String>> {
        let api = Arc::clone(&self.api);
        let cluster = self.cluster.clone();
        paginate(move |token| -> PageFuture {
            let api = Arc::clone(&api);
            let cluster = cluster.clone();
            Box::pin(async move { api.list_tasks(&cluster, token).await })
        })
    }

    /// Describes the given tasks, returned in the order they were asked for.
    pub async fn describe_tasks(&self, arns: &[String]) -> Result<Vec<TaskRecord>> {
        let mut tasks = Vec::with_capacity(arns.len());
        for chunk in arns.chunks(DESCRIBE_BATCH_SIZE) {
            let described: HashMap<String, TaskRecord> = self
                .api
                .describe_tasks(&self.cluster, chunk)
                .await?
                .into_iter()
                .map(|task| (task.task_arn.clone(), task))
                .collect();
            for arn in chunk {
                let task = described.get(arn).cloned().ok_or_else(|| {
                    DiscoveryError::not_found(format!("no tasks found for task arn {}", arn))
                })?;
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// Fetches each distinct task definition referenced by `tasks` once.
    pub async fn describe_task_definitions(
        &self,
        tasks: &[TaskRecord],
    ) -> Result<HashMap<String, TaskDefinition>> {
        let mut definitions = HashMap::new();
        for task in tasks {
            if definitions.contains_key(&task.task_definition_arn) {
                continue;
            }
            let definition = self
                .api
                .describe_task_definition(&task.task_definition_arn)
                .await?;
            definitions.insert(task.task_definition_arn.clone(), definition);
        }
        debug!(
            "Fetched {} task definitions for {} tasks",
            definitions.len(),
            tasks.len()
        );
        Ok(definitions)
    }
}
