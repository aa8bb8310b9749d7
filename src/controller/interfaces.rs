//! Seams between the reconciliation core and the outside world.
//!
//! The core never talks to Kubernetes or the storage cluster directly. It
//! reads and writes the ObjectStore record through [`RecordStore`], queries
//! the parent cluster through [`ClusterQuery`], and provisions sub-resources
//! through [`Provisioner`]. The `backend` module implements all three against
//! a live cluster; the functional tests implement them in memory.

use async_trait::async_trait;

use crate::controller::cluster_info::{ClusterInfo, ClusterVersion, DaemonType};
use crate::controller::error::Result;
use crate::controller::provisioning::{GatewayEndpoint, ProvisioningContext};
use crate::crd::{ClusterSpec, ObjectStore, ObjectStoreStatus, StorageClusterStatus};

/// Namespace and name of an ObjectStore.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Persistence of ObjectStore records.
///
/// The spec is never written. Status and finalizers have independent write
/// paths, and each write is a single atomic update.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the record, `None` if it does not exist.
    async fn read_record(&self, key: &ObjectKey) -> Result<Option<ObjectStore>>;

    /// Replace the status of the record.
    async fn write_status(&self, key: &ObjectKey, status: &ObjectStoreStatus) -> Result<()>;

    /// Replace the finalizer list of the record.
    async fn write_finalizers(&self, key: &ObjectKey, finalizers: &[String]) -> Result<()>;
}

/// What the parent cluster looks like right now.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterObservation {
    /// Name of the StorageCluster object.
    pub name: String,
    pub spec: ClusterSpec,
    pub status: StorageClusterStatus,
}

/// Read-only queries against the parent storage cluster.
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// The cluster in `namespace`, `None` if there is none.
    async fn get_cluster_spec(&self, namespace: &str) -> Result<Option<ClusterObservation>>;

    /// Identity of the cluster in `namespace`.
    async fn get_cluster_info(&self, namespace: &str) -> Result<ClusterInfo>;

    /// Least up-to-date version among the running daemons of `daemon` type.
    async fn get_daemon_version(
        &self,
        namespace: &str,
        daemon: DaemonType,
    ) -> Result<ClusterVersion>;
}

/// Provisioning of the sub-resources that make up an object store.
///
/// Every operation must be idempotent and must tolerate being called after a
/// partial failure of a previous attempt.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Ensure the gateway has a stable address.
    async fn reconcile_endpoint(&self, ctx: &ProvisioningContext) -> Result<GatewayEndpoint>;

    /// Ensure metadata and data pools exist with the desired parameters.
    async fn reconcile_pools(&self, ctx: &ProvisioningContext) -> Result<()>;

    /// Ensure the realm, zone group and zone exist and point at `endpoint`.
    async fn reconcile_realm(
        &self,
        ctx: &ProvisioningContext,
        endpoint: &GatewayEndpoint,
    ) -> Result<()>;

    /// Ensure the gateway workload matches the desired spec.
    async fn reconcile_workload(&self, ctx: &ProvisioningContext) -> Result<()>;

    /// Release everything provisioned for this object store.
    async fn delete_all_sub_resources(&self, ctx: &ProvisioningContext) -> Result<()>;
}
