//! Folds task, container and address data into a [`Snapshot`].

use std::collections::HashMap;

use log::{debug, warn};

use crate::types::{service_key, task_id, Service, Snapshot, Task};
use crate::upstream::{ContainerRecord, TaskDefinition, TaskRecord};

pub struct ServiceAssembler {
    hostname_label: String,
}

impl ServiceAssembler {
    pub fn new(hostname_label: impl Into<String>) -> Self {
        Self {
            hostname_label: hostname_label.into(),
        }
    }

    /// Builds the current snapshot.
    ///
    /// `addresses` maps container-instance ARNs to host addresses.  Containers
    /// without network bindings are not discoverable and are left out.
    pub fn assemble(
        &self,
        tasks: &[TaskRecord],
        definitions: &HashMap<String, TaskDefinition>,
        addresses: &HashMap<String, String>,
    ) -> Snapshot {
        let mut snapshot = Snapshot::new();

        for record in tasks {
            let ip_address = match record
                .container_instance_arn
                .as_ref()
                .and_then(|arn| addresses.get(arn))
            {
                Some(ip) => ip,
                None => {
                    warn!(
                        "No address known for task {} (container instance {:?}), skipping",
                        record.task_arn, record.container_instance_arn
                    );
                    continue;
                }
            };
            let definition = definitions.get(&record.task_definition_arn);

            for container in &record.containers {
                if container.network_bindings.is_empty() {
                    debug!(
                        "Container {} of {} exposes no ports, skipping",
                        container.name, record.task_arn
                    );
                    continue;
                }

                let endpoint = self.endpoint(container, definition);
                for binding in &container.network_bindings {
                    let service = snapshot
                        .entry(service_key(&container.name, binding.container_port))
                        .or_default();
                    service.endpoint = endpoint.clone();
                    service.tasks.push(Task {
                        name: container.name.clone(),
                        task_id: task_id(&record.task_arn).to_string(),
                        ip_address: ip_address.clone(),
                        container_port: binding.container_port,
                        host_port: binding.host_port,
                    });
                }
            }
        }

        snapshot
    }

    fn endpoint(&self, container: &ContainerRecord, definition: Option<&TaskDefinition>) -> String {
        definition
            .and_then(|d| d.container(&container.name))
            .and_then(|c| c.docker_labels.get(&self.hostname_label))
            .filter(|hostname| !hostname.is_empty())
            .cloned()
            .unwrap_or_else(|| container.name.clone())
    }
}
