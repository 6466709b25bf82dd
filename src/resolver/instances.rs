use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{BoxStream, TryStreamExt};
use log::debug;

use crate::config::AddressLookup;
use crate::error::{DiscoveryError, Result};
use crate::upstream::{paginate, ComputeApi, ContainerApi, PageFuture, DESCRIBE_BATCH_SIZE};

/// Maps container instances to the private address of their backing host.
pub struct InstanceResolver {
    cluster: String,
    containers: Arc<dyn ContainerApi>,
    compute: Arc<dyn ComputeApi>,
    lookup: AddressLookup,
}

impl InstanceResolver {
    pub fn new(
        cluster: impl Into<String>,
        containers: Arc<dyn ContainerApi>,
        compute: Arc<dyn ComputeApi>,
        lookup: AddressLookup,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            containers,
            compute,
            lookup,
        }
    }

    /// Every container-instance ARN registered in the cluster, page by page.
    pub fn list_container_instances(&self) -> BoxStream<'static, Result<String>> {
        let api = Arc::clone(&self.containers);
        let cluster = self.cluster.clone();
        paginate(move |token| -> PageFuture {
            let api = Arc::clone(&api);
            let cluster = cluster.clone();
            Box::pin(async move { api.list_container_instances(&cluster, token).await })
        })
    }

    /// Returns the compute-instance id behind a container instance.
    pub async fn backing_instance_id(&self, arn: &str) -> Result<String> {
        let described = self
            .containers
            .describe_container_instances(&self.cluster, &[arn.to_string()])
            .await?;
        let instance = described.into_iter().next().ok_or_else(|| {
            DiscoveryError::not_found(format!("no container instances were found for {}", arn))
        })?;
        instance.ec2_instance_id.ok_or_else(|| {
            DiscoveryError::not_found(format!("container instance {} has no compute instance", arn))
        })
    }

    /// Returns the private address of a compute instance.
    pub async fn resolve_ip_address(&self, instance_id: &str) -> Result<String> {
        let reservations = self
            .compute
            .describe_instances(&[instance_id.to_string()])
            .await?;
        let reservation = reservations.into_iter().next().ok_or_else(|| {
            DiscoveryError::not_found(format!("no reservations found for {}", instance_id))
        })?;
        let instance = reservation.instances.into_iter().next().ok_or_else(|| {
            DiscoveryError::not_found(format!("no instances found for {}", instance_id))
        })?;
        instance.private_ip_address.ok_or_else(|| {
            DiscoveryError::not_found(format!("instance {} has no private address", instance_id))
        })
    }

    /// Builds the ARN -> address index for the given container instances.
    pub async fn build_index(&self, arns: &[String]) -> Result<HashMap<String, String>> {
        match self.lookup {
            AddressLookup::PerInstance => self.build_index_per_instance(arns).await,
            AddressLookup::Batched => self.build_index_batched(arns).await,
        }
    }

    /// Lists every container instance and indexes its address.
    pub async fn index(&self) -> Result<HashMap<String, String>> {
        let arns: Vec<String> = self.list_container_instances().try_collect().await?;
        debug!("Found {} container instances in {}", arns.len(), self.cluster);
        self.build_index(&arns).await
    }

    async fn build_index_per_instance(&self, arns: &[String]) -> Result<HashMap<String, String>> {
        let mut index = HashMap::with_capacity(arns.len());
        for arn in arns {
            let instance_id = self.backing_instance_id(arn).await?;
            let address = self.resolve_ip_address(&instance_id).await?;
            index.insert(arn.clone(), address);
        }
        Ok(index)
    }

    async fn build_index_batched(&self, arns: &[String]) -> Result<HashMap<String, String>> {
        let mut instance_ids = HashMap::with_capacity(arns.len());
        for chunk in arns.chunks(DESCRIBE_BATCH_SIZE) {
            for described in self
                .containers
                .describe_container_instances(&self.cluster, chunk)
                .await?
            {
                if let Some(id) = described.ec2_instance_id {
                    instance_ids.insert(described.arn, id);
                }
            }
        }

        let ids: Vec<String> = arns
            .iter()
            .map(|arn| {
                instance_ids.get(arn).cloned().ok_or_else(|| {
                    DiscoveryError::not_found(format!(
                        "no container instances were found for {}",
                        arn
                    ))
                })
            })
            .collect::<Result<_>>()?;

        let mut addresses = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(DESCRIBE_BATCH_SIZE) {
            for reservation in self.compute.describe_instances(chunk).await? {
                for instance in reservation.instances {
                    if let Some(ip) = instance.private_ip_address {
                        addresses.insert(instance.instance_id, ip);
                    }
                }
            }
        }

        arns.iter()
            .map(|arn| {
                let id = &instance_ids[arn];
                addresses
                    .get(id)
                    .map(|ip| (arn.clone(), ip.clone()))
                    .ok_or_else(|| {
                        DiscoveryError::not_found(format!("no instances found for {}", id))
                    })
            })
            .collect()
    }
}
