//! In-memory cluster used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    ComputeApi, ContainerApi, ContainerDefinition, ContainerInstance, ContainerRecord, Instance,
    NetworkBinding, Page, Reservation, TaskDefinition, TaskRecord,
};
use crate::error::{DiscoveryError, Result};

#[derive(Default)]
struct State {
    // container-instance ARN -> EC2 instance id
    container_instances: Vec<(String, String)>,
    // EC2 instance id -> private address
    addresses: HashMap<String, Option<String>>,
    empty_reservations: HashSet<String>,
    tasks: Vec<TaskRecord>,
    definitions: HashMap<String, TaskDefinition>,
    calls: HashMap<&'static str, usize>,
    fail_on: Option<&'static str>,
}

pub(crate) struct FakeCluster {
    cluster: String,
    page_size: usize,
    state: Mutex<State>,
}

impl FakeCluster {
    pub(crate) fn new(cluster: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            page_size: 2,
            state: Mutex::new(State::default()),
        }
    }

    pub(crate) fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub(crate) fn add_instance(&self, arn: &str, instance_id: &str, ip: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .container_instances
            .push((arn.to_string(), instance_id.to_string()));
        state
            .addresses
            .insert(instance_id.to_string(), Some(ip.to_string()));
    }

    pub(crate) fn set_address(&self, instance_id: &str, ip: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state
            .addresses
            .insert(instance_id.to_string(), ip.map(str::to_string));
    }

    pub(crate) fn empty_reservation(&self, instance_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.addresses.remove(instance_id);
        state.empty_reservations.insert(instance_id.to_string());
    }

    pub(crate) fn add_task(&self, task: TaskRecord) {
        self.state.lock().unwrap().tasks.push(task);
    }

    pub(crate) fn remove_task(&self, task_arn: &str) {
        self.state
            .lock()
            .unwrap()
            .tasks
            .retain(|t| t.task_arn != task_arn);
    }

    pub(crate) fn add_definition(&self, definition: TaskDefinition) {
        self.state
            .lock()
            .unwrap()
            .definitions
            .insert(definition.arn.clone(), definition);
    }

    pub(crate) fn fail_on(&self, operation: Option<&'static str>) {
        self.state.lock().unwrap().fail_on = operation;
    }

    pub(crate) fn calls(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, operation: &'static str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(operation).or_default() += 1;
        if state.fail_on == Some(operation) {
            return Err(DiscoveryError::transport(
                operation,
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "injected failure"),
            ));
        }
        Ok(())
    }

    fn check_cluster(&self, cluster: &str) -> Result<()> {
        if cluster != self.cluster {
            return Err(DiscoveryError::transport(
                "cluster",
                std::io::Error::new(std::io::ErrorKind::NotFound, "ClusterNotFoundException"),
            ));
        }
        Ok(())
    }

    fn page(&self, items: Vec<String>, next_token: Option<String>) -> Page {
        let offset: usize = next_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (offset + self.page_size).min(items.len());
        Page {
            items: items[offset.min(end)..end].to_vec(),
            next_token: (end < items.len()).then(|| end.to_string()),
        }
    }
}

#[async_trait]
impl ContainerApi for FakeCluster {
    async fn list_container_instances(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<Page> {
        self.record("ListContainerInstances")?;
        self.check_cluster(cluster)?;
        let arns = {
            let state = self.state.lock().unwrap();
            state
                .container_instances
                .iter()
                .map(|(arn, _)| arn.clone())
                .collect()
        };
        Ok(self.page(arns, next_token))
    }

    async fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> Result<Vec<ContainerInstance>> {
        self.record("DescribeContainerInstances")?;
        self.check_cluster(cluster)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .container_instances
            .iter()
            .filter(|(arn, _)| arns.contains(arn))
            .map(|(arn, id)| ContainerInstance {
                arn: arn.clone(),
                ec2_instance_id: Some(id.clone()),
            })
            .collect())
    }

    async fn list_tasks(&self, cluster: &str, next_token: Option<String>) -> Result<Page> {
        self.record("ListTasks")?;
        self.check_cluster(cluster)?;
        let arns = {
            let state = self.state.lock().unwrap();
            state.tasks.iter().map(|t| t.task_arn.clone()).collect()
        };
        Ok(self.page(arns, next_token))
    }

    async fn describe_tasks(&self, cluster: &str, arns: &[String]) -> Result<Vec<TaskRecord>> {
        self.record("DescribeTasks")?;
        self.check_cluster(cluster)?;
        let state = self.state.lock().unwrap();
        // the provider makes no ordering promise; hand results back reversed
        Ok(state
            .tasks
            .iter()
            .rev()
            .filter(|t| arns.contains(&t.task_arn))
            .cloned()
            .collect())
    }

    async fn describe_task_definition(&self, arn: &str) -> Result<TaskDefinition> {
        self.record("DescribeTaskDefinition")?;
        let state = self.state.lock().unwrap();
        state.definitions.get(arn).cloned().ok_or_else(|| {
            DiscoveryError::transport(
                "DescribeTaskDefinition",
                std::io::Error::new(std::io::ErrorKind::NotFound, "ClientException"),
            )
        })
    }
}

#[async_trait]
impl ComputeApi for FakeCluster {
    async fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<Reservation>> {
        self.record("DescribeInstances")?;
        let state = self.state.lock().unwrap();
        let mut reservations = Vec::new();
        for id in instance_ids {
            if state.empty_reservations.contains(id) {
                reservations.push(Reservation::default());
            } else if let Some(ip) = state.addresses.get(id) {
                reservations.push(Reservation {
                    instances: vec![Instance {
                        instance_id: id.clone(),
                        private_ip_address: ip.clone(),
                    }],
                });
            }
        }
        Ok(reservations)
    }
}

/// Builds a task record with a single container.
pub(crate) fn task(
    arn: &str,
    instance_arn: &str,
    definition_arn: &str,
    container: &str,
    bindings: &[(u16, u16)],
) -> TaskRecord {
    TaskRecord {
        task_arn: arn.to_string(),
        container_instance_arn: Some(instance_arn.to_string()),
        task_definition_arn: definition_arn.to_string(),
        containers: vec![container_record(container, bindings)],
    }
}

pub(crate) fn container_record(name: &str, bindings: &[(u16, u16)]) -> ContainerRecord {
    ContainerRecord {
        name: name.to_string(),
        network_bindings: bindings
            .iter()
            .map(|&(container_port, host_port)| NetworkBinding {
                container_port,
                host_port,
            })
            .collect(),
    }
}

/// Builds a task definition; `labels` pairs a container name with its hostname label.
pub(crate) fn definition(arn: &str, containers: &[(&str, Option<&str>)]) -> TaskDefinition {
    TaskDefinition {
        arn: arn.to_string(),
        container_definitions: containers
            .iter()
            .map(|(name, hostname)| ContainerDefinition {
                name: name.to_string(),
                docker_labels: hostname
                    .map(|h| HashMap::from([("hostname".to_string(), h.to_string())]))
                    .unwrap_or_default(),
            })
            .collect(),
    }
}
