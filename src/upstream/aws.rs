//! ECS and EC2 clients from the AWS SDK.
//!
//! Credentials come from the SDK's default provider chain.  Records are cut
//! down to what discovery reads; bindings without both ports are dropped.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecs::config::Region;
use log::debug;

use super::{
    ComputeApi, ContainerApi, ContainerDefinition, ContainerInstance, ContainerRecord, Instance,
    NetworkBinding, Page, Reservation, TaskDefinition, TaskRecord,
};
use crate::error::{DiscoveryError, Result};

pub async fn load_sdk_config(region: &str) -> aws_config::SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

pub struct AwsContainerApi {
    client: aws_sdk_ecs::Client,
}

impl AwsContainerApi {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ecs::Client::new(config),
        }
    }
}

fn port(value: Option<i32>) -> Option<u16> {
    value.and_then(|p| u16::try_from(p).ok())
}

fn task_record(task: aws_sdk_ecs::types::Task) -> Option<TaskRecord> {
    let task_arn = task.task_arn?;
    let task_definition_arn = task.task_definition_arn?;
    let containers = task
        .containers
        .unwrap_or_default()
        .into_iter()
        .filter_map(|container| {
            let name = container.name?;
            let network_bindings = container
                .network_bindings
                .unwrap_or_default()
                .into_iter()
                .filter_map(|binding| {
                    Some(NetworkBinding {
                        container_port: port(binding.container_port)?,
                        host_port: port(binding.host_port)?,
                    })
                })
                .collect();
            Some(ContainerRecord {
                name,
                network_bindings,
            })
        })
        .collect();

    Some(TaskRecord {
        task_arn,
        container_instance_arn: task.container_instance_arn,
        task_definition_arn,
        containers,
    })
}

#[async_trait]
impl ContainerApi for AwsContainerApi {
    async fn list_container_instances(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<Page> {
        let out = self
            .client
            .list_container_instances()
            .cluster(cluster)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| DiscoveryError::transport("ListContainerInstances", e))?;
        Ok(Page {
            items: out.container_instance_arns.unwrap_or_default(),
            next_token: out.next_token,
        })
    }

    async fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> Result<Vec<ContainerInstance>> {
        let out = self
            .client
            .describe_container_instances()
            .cluster(cluster)
            .set_container_instances(Some(arns.to_vec()))
            .send()
            .await
            .map_err(|e| DiscoveryError::transport("DescribeContainerInstances", e))?;
        Ok(out
            .container_instances
            .unwrap_or_default()
            .into_iter()
            .filter_map(|ci| {
                Some(ContainerInstance {
                    arn: ci.container_instance_arn?,
                    ec2_instance_id: ci.ec2_instance_id,
                })
            })
            .collect())
    }

    async fn list_tasks(&self, cluster: &str, next_token: Option<String>) -> Result<Page> {
        let out = self
            .client
            .list_tasks()
            .cluster(cluster)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| DiscoveryError::transport("ListTasks", e))?;
        Ok(Page {
            items: out.task_arns.unwrap_or_default(),
            next_token: out.next_token,
        })
    }

    async fn describe_tasks(&self, cluster: &str, arns: &[String]) -> Result<Vec<TaskRecord>> {
        let out = self
            .client
            .describe_tasks()
            .cluster(cluster)
            .set_tasks(Some(arns.to_vec()))
            .send()
            .await
            .map_err(|e| DiscoveryError::transport("DescribeTasks", e))?;
        if let Some(failures) = out.failures.as_ref().filter(|f| !f.is_empty()) {
            debug!("DescribeTasks reported {} failures", failures.len());
        }
        Ok(out
            .tasks
            .unwrap_or_default()
            .into_iter()
            .filter_map(task_record)
            .collect())
    }

    async fn describe_task_definition(&self, arn: &str) -> Result<TaskDefinition> {
        let out = self
            .client
            .describe_task_definition()
            .task_definition(arn)
            .send()
            .await
            .map_err(|e| DiscoveryError::transport("DescribeTaskDefinition", e))?;
        let definition = out
            .task_definition
            .ok_or_else(|| DiscoveryError::not_found(format!("task definition {}", arn)))?;
        Ok(TaskDefinition {
            arn: arn.to_string(),
            container_definitions: definition
                .container_definitions
                .unwrap_or_default()
                .into_iter()
                .filter_map(|cd| {
                    Some(ContainerDefinition {
                        name: cd.name?,
                        docker_labels: cd.docker_labels.unwrap_or_default(),
                    })
                })
                .collect(),
        })
    }
}

pub struct AwsComputeApi {
    client: aws_sdk_ec2::Client,
}

impl AwsComputeApi {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ec2::Client::new(config),
        }
    }
}

#[async_trait]
impl ComputeApi for AwsComputeApi {
    async fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<Reservation>> {
        let mut reservations = Vec::new();
        let mut next_token = None;
        loop {
            let out = self
                .client
                .describe_instances()
                .set_instance_ids(Some(instance_ids.to_vec()))
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| DiscoveryError::transport("DescribeInstances", e))?;

            reservations.extend(out.reservations.unwrap_or_default().into_iter().map(|r| {
                Reservation {
                    instances: r
                        .instances
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|i| {
                            Some(Instance {
                                instance_id: i.instance_id?,
                                private_ip_address: i.private_ip_address,
                            })
                        })
                        .collect(),
                }
            }));

            match out.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        Ok(reservations)
    }
}
