//! One reconciliation cycle: resolve, assemble, diff, sync, retain.
//!
//! The orchestrator owns the previous snapshot.  It starts empty and is
//! swapped for the freshly assembled one only after every mutation of the
//! cycle has been applied.  A failed cycle leaves it untouched, so the next
//! cycle diffs against the last known-good state.  Registry writes made
//! before the failure are not rolled back.
//!
//! Callers schedule [`DiscoveryOrchestrator::run_cycle`] themselves and
//! decide on backoff.  `run_cycle` takes `&mut self`, so two cycles on the
//! same orchestrator cannot overlap.

use std::sync::Arc;

use futures_util::TryStreamExt;
use log::{debug, info};
use tokio::sync::RwLock;

use crate::assembler::ServiceAssembler;
use crate::config::Config;
use crate::error::{DiscoveryError, Result};
use crate::reconcile;
use crate::registry::{KvStore, RegistrySync};
use crate::resolver::{InstanceResolver, TaskResolver};
use crate::types::Snapshot;
use crate::upstream::{ComputeApi, ContainerApi};

/// What a successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub services: usize,
    pub tasks: usize,
    pub mutations: usize,
}

pub struct DiscoveryOrchestrator {
    cluster: String,
    default_domain: Option<String>,
    instances: InstanceResolver,
    tasks: TaskResolver,
    assembler: ServiceAssembler,
    registry: RegistrySync,
    previous: Arc<RwLock<Snapshot>>,
}

impl DiscoveryOrchestrator {
    pub fn builder(config: &Config) -> DiscoveryBuilder {
        DiscoveryBuilder::new(config)
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn default_domain(&self) -> Option<&str> {
        self.default_domain.as_deref()
    }

    /// Shared handle to the retained snapshot for readers outside the cycle.
    pub fn snapshot_handle(&self) -> Arc<RwLock<Snapshot>> {
        Arc::clone(&self.previous)
    }

    /// Runs one full cycle and returns on the first error of any phase.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let current = self.discover().await?;

        let mutations = {
            let previous = self.previous.read().await;
            reconcile::diff(&previous, &current)
        };
        debug!(
            "Cycle for {} computed {} mutations",
            self.cluster,
            mutations.len()
        );

        let applied = self.registry.apply(&mutations).await?;

        let report = CycleReport {
            services: current.len(),
            tasks: current.values().map(|s| s.tasks.len()).sum(),
            mutations: applied,
        };
        *self.previous.write().await = current;

        info!(
            "Cluster {}: {} services, {} tasks, {} registry mutations",
            self.cluster, report.services, report.tasks, report.mutations
        );
        Ok(report)
    }

    /// Builds the current snapshot without touching the registry.
    pub async fn discover(&self) -> Result<Snapshot> {
        let addresses = self.instances.index().await?;

        let task_arns: Vec<String> = self.tasks.list_task_arns().try_collect().await?;
        let tasks = self.tasks.describe_tasks(&task_arns).await?;
        let definitions = self.tasks.describe_task_definitions(&tasks).await?;

        Ok(self.assembler.assemble(&tasks, &definitions, &addresses))
    }
}

/// Collects the capabilities an orchestrator needs.
pub struct DiscoveryBuilder {
    config: Config,
    containers: Option<Arc<dyn ContainerApi>>,
    compute: Option<Arc<dyn ComputeApi>>,
    store: Option<Arc<dyn KvStore>>,
}

impl DiscoveryBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            containers: None,
            compute: None,
            store: None,
        }
    }

    pub fn container_api(mut self, api: Arc<dyn ContainerApi>) -> Self {
        self.containers = Some(api);
        self
    }

    pub fn compute_api(mut self, api: Arc<dyn ComputeApi>) -> Self {
        self.compute = Some(api);
        self
    }

    pub fn registry(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<DiscoveryOrchestrator> {
        self.config.validate()?;
        let containers = self.containers.ok_or_else(|| {
            DiscoveryError::configuration("no container orchestration client set")
        })?;
        let compute = self
            .compute
            .ok_or_else(|| DiscoveryError::configuration("no compute client set"))?;
        let store = self
            .store
            .ok_or_else(|| DiscoveryError::configuration("no registry client set"))?;

        let cluster = self.config.cluster;
        Ok(DiscoveryOrchestrator {
            instances: InstanceResolver::new(
                cluster.clone(),
                Arc::clone(&containers),
                compute,
                self.config.address_lookup,
            ),
            tasks: TaskResolver::new(cluster.clone(), containers),
            assembler: ServiceAssembler::new(self.config.hostname_label),
            registry: RegistrySync::new(cluster.clone(), store),
            previous: Arc::new(RwLock::new(Snapshot::new())),
            default_domain: self.config.default_domain,
            cluster,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryKv;
    use crate::upstream::fake::{definition, task, FakeCluster};

    fn config() -> Config {
        Config {
            cluster: "prod".into(),
            default_domain: Some("discovery.example.com".into()),
            ..Config::default()
        }
    }

    fn fixture() -> (Arc<FakeCluster>, Arc<MemoryKv>, DiscoveryOrchestrator) {
        let fake = FakeCluster::new("prod").with_page_size(2);
        fake.add_instance("ci-0", "i-0", "10.0.0.1");
        fake.add_instance("ci-1", "i-1", "10.0.0.2");
        fake.add_definition(definition("td-web:1", &[("web", None)]));
        fake.add_definition(definition("td-api:1", &[("api", Some("api.internal"))]));
        fake.add_task(task("arn:task/prod/w1", "ci-0", "td-web:1", "web", &[(80, 32768)]));
        fake.add_task(task("arn:task/prod/w2", "ci-1", "td-web:1", "web", &[(80, 32769)]));
        fake.add_task(task("arn:task/prod/a1", "ci-1", "td-api:1", "api", &[(9000, 9000)]));
        let fake = Arc::new(fake);
        let store = Arc::new(MemoryKv::new());
        let orchestrator = DiscoveryOrchestrator::builder(&config())
            .container_api(fake.clone())
            .compute_api(fake.clone())
            .registry(store.clone())
            .build()
            .unwrap();
        (fake, store, orchestrator)
    }

    #[tokio::test]
    async fn first_cycle_registers_everything() {
        let (_fake, store, mut orchestrator) = fixture();
        let report = orchestrator.run_cycle().await.unwrap();
        assert_eq!(
            report,
            CycleReport {
                services: 2,
                tasks: 3,
                mutations: 5
            }
        );
        assert_eq!(
            store.keys().await,
            vec![
                "prod/api-9000/endpoint",
                "prod/api-9000/instances/a1",
                "prod/web-80/endpoint",
                "prod/web-80/instances/w1",
                "prod/web-80/instances/w2",
            ]
        );
        assert_eq!(
            store.get("prod/api-9000/endpoint").await.as_deref(),
            Some("api.internal")
        );
        assert_eq!(
            store.get("prod/web-80/instances/w2").await.as_deref(),
            Some("10.0.0.2:32769")
        );
        assert_eq!(orchestrator.snapshot_handle().read().await.len(), 2);
    }

    #[tokio::test]
    async fn steady_state_is_quiet() {
        let (_fake, _store, mut orchestrator) = fixture();
        orchestrator.run_cycle().await.unwrap();
        let report = orchestrator.run_cycle().await.unwrap();
        assert_eq!(report.mutations, 0);
    }

    #[tokio::test]
    async fn converges_on_task_churn() {
        let (fake, store, mut orchestrator) = fixture();
        orchestrator.run_cycle().await.unwrap();

        fake.remove_task("arn:task/prod/a1");
        fake.remove_task("arn:task/prod/w1");
        fake.add_task(task("arn:task/prod/w3", "ci-0", "td-web:1", "web", &[(80, 32770)]));
        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report.mutations, 3);
        assert_eq!(
            store.keys().await,
            vec![
                "prod/web-80/endpoint",
                "prod/web-80/instances/w2",
                "prod/web-80/instances/w3",
            ]
        );
    }

    #[tokio::test]
    async fn failed_discovery_keeps_previous_snapshot() {
        let (fake, store, mut orchestrator) = fixture();
        orchestrator.run_cycle().await.unwrap();
        let before = orchestrator.snapshot_handle().read().await.clone();
        let keys_before = store.keys().await;

        fake.remove_task("arn:task/prod/a1");
        fake.fail_on(Some("DescribeTaskDefinition"));
        let err = orchestrator.run_cycle().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Transport { .. }));
        assert_eq!(*orchestrator.snapshot_handle().read().await, before);
        assert_eq!(store.keys().await, keys_before);

        fake.fail_on(None);
        let report = orchestrator.run_cycle().await.unwrap();
        assert_eq!(report.mutations, 1);
        assert!(store.get("prod/api-9000/endpoint").await.is_none());
    }

    #[tokio::test]
    async fn partial_registry_failure_is_not_rolled_back() {
        let (_fake, store, mut orchestrator) = fixture();
        store.fail_after(2).await;

        assert!(orchestrator.run_cycle().await.is_err());
        assert!(orchestrator.snapshot_handle().read().await.is_empty());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn not_found_aborts_cycle() {
        let (fake, store, mut orchestrator) = fixture();
        fake.empty_reservation("i-1");
        let err = orchestrator.run_cycle().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn wrong_cluster_surfaces_transport_error() {
        let fake = Arc::new(FakeCluster::new("staging"));
        let mut orchestrator = DiscoveryOrchestrator::builder(&config())
            .container_api(fake.clone())
            .compute_api(fake)
            .registry(Arc::new(MemoryKv::new()))
            .build()
            .unwrap();
        assert!(matches!(
            orchestrator.run_cycle().await,
            Err(DiscoveryError::Transport { .. })
        ));
    }

    #[test]
    fn missing_clients_are_configuration_errors() {
        let fake = Arc::new(FakeCluster::new("prod"));
        let err = DiscoveryOrchestrator::builder(&config())
            .container_api(fake.clone())
            .registry(Arc::new(MemoryKv::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, DiscoveryError::Configuration(_)));

        let err = DiscoveryOrchestrator::builder(&Config::default())
            .container_api(fake.clone())
            .compute_api(fake)
            .registry(Arc::new(MemoryKv::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, DiscoveryError::Configuration(_)));
    }

    #[test]
    fn carries_configuration_through() {
        let (_fake, _store, orchestrator) = fixture();
        assert_eq!(orchestrator.cluster(), "prod");
        assert_eq!(orchestrator.default_domain(), Some("discovery.example.com"));
    }
}
