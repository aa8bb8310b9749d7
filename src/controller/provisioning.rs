//! Creation/update workflow for ObjectStores.
//!
//! Phases run in a fixed order and each one is a precondition for the next:
//!
//! | Phase | Produces |
//! |-------|----------|
//! | Validate spec | nothing, no external calls |
//! | Endpoint | stable gateway address |
//! | Pools | metadata and data pools |
//! | Realm | realm, zone group and zone pointing at the endpoint |
//! | Workload | gateway deployment |
//!
//! Every phase is idempotent, so a retry after a failure simply runs all
//! phases again and the ones that already converged are no-ops.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{Instrument, Span, debug, info};

use crate::controller::cluster_info::{ClusterInfo, ClusterVersion, DaemonType};
use crate::controller::error::{Error, PhaseExt, Result};
use crate::controller::interfaces::{ObjectKey, Provisioner, RecordStore};
use crate::controller::validation::{check_external_version, validate_store};
use crate::crd::{ClusterSpec, ObjectStore};

/// Pool shared by every object store in the cluster.
pub const ROOT_POOL: &str = ".rgw.root";

/// Per-store metadata pool suffixes.
pub const METADATA_POOL_SUFFIXES: &[&str] = &[
    "rgw.control",
    "rgw.meta",
    "rgw.log",
    "rgw.buckets.index",
    "rgw.buckets.non-ec",
];

/// Per-store data pool suffix.
pub const DATA_POOL_SUFFIX: &str = "rgw.buckets.data";

/// Metadata pools for a store, including the shared root pool.
pub fn metadata_pool_names(store: &str) -> Vec<String> {
    METADATA_POOL_SUFFIXES
        .iter()
        .map(|suffix| format!("{}.{}", store, suffix))
        .chain(std::iter::once(ROOT_POOL.to_string()))
        .collect()
}

/// Data pool for a store.
pub fn data_pool_name(store: &str) -> String {
    format!("{}.{}", store, DATA_POOL_SUFFIX)
}

/// Pools to delete when a store goes away, empty when they are preserved.
///
/// The root pool is shared with every other store in the cluster and is
/// never deleted.
pub fn teardown_pools(store: &str, preserve: bool) -> Vec<String> {
    if preserve {
        return Vec::new();
    }
    metadata_pool_names(store)
        .into_iter()
        .filter(|p| p != ROOT_POOL)
        .chain(std::iter::once(data_pool_name(store)))
        .collect()
}

/// Address the gateway is reachable at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEndpoint {
    pub address: String,
    pub port: i32,
    pub secure: bool,
}

impl GatewayEndpoint {
    /// URL advertised in the zone group and zone.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.address, self.port)
    }
}

/// Where a stateless daemon keeps its data and logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataPathMap {
    /// Host directory for daemon data. Stateless daemons have none.
    pub host_data_dir: Option<String>,
    /// Data directory inside the container.
    pub container_data_dir: String,
    /// Host directory for logs.
    pub host_log_dir: Option<String>,
    /// Log directory inside the container.
    pub container_log_dir: String,
}

impl DataPathMap {
    /// Layout for a stateless daemon such as the gateway.
    pub fn stateless(
        daemon: DaemonType,
        name: &str,
        namespace: &str,
        data_dir_host_path: &str,
    ) -> Self {
        let host_log_dir = if data_dir_host_path.is_empty() {
            None
        } else {
            Some(format!(
                "{}/{}/log",
                data_dir_host_path.trim_end_matches('/'),
                namespace
            ))
        };

        Self {
            host_data_dir: None,
            container_data_dir: format!("/var/lib/ceph/{}/ceph-{}", daemon, name),
            host_log_dir,
            container_log_dir: "/var/log/ceph".to_string(),
        }
    }
}

/// Everything a provisioning call needs, built fresh for each reconciliation.
pub struct ProvisioningContext {
    pub key: ObjectKey,
    /// Persistence handle for the record.
    pub records: Arc<dyn RecordStore>,
    /// In-memory copy of the record for this invocation.
    pub record: ObjectStore,
    pub cluster_info: ClusterInfo,
    pub cluster_spec: ClusterSpec,
    pub data_path_map: DataPathMap,
    /// Span all logging for this invocation is recorded under.
    pub span: Span,
}

impl ProvisioningContext {
    pub fn new(
        records: Arc<dyn RecordStore>,
        record: ObjectStore,
        cluster_info: ClusterInfo,
        cluster_spec: ClusterSpec,
        span: Span,
    ) -> Self {
        let key = ObjectKey::new(record.namespace().unwrap_or_default(), record.name_any());
        let data_path_map = DataPathMap::stateless(
            DaemonType::Rgw,
            &key.name,
            &key.namespace,
            &cluster_spec.data_dir_host_path,
        );
        Self {
            key,
            records,
            record,
            cluster_info,
            cluster_spec,
            data_path_map,
            span,
        }
    }

    /// Gateway image: the store's override or the cluster image.
    pub fn gateway_image(&self) -> &str {
        self.record
            .spec
            .gateway
            .image
            .as_deref()
            .unwrap_or(&self.cluster_spec.image)
    }
}

/// Run the creation/update phases in order.
pub async fn run_provisioning(
    provisioner: &dyn Provisioner,
    ctx: &ProvisioningContext,
) -> Result<()> {
    let name = ctx.key.name.clone();

    async {
        validate_store(&ctx.record)
            .map_err(|e| e.in_phase(format!("invalid object store {:?} arguments", name)))?;

        debug!("Reconciling object store service");
        let endpoint = provisioner
            .reconcile_endpoint(ctx)
            .await
            .phase("failed to reconcile service")?;

        debug!("Reconciling object store pools");
        provisioner
            .reconcile_pools(ctx)
            .await
            .phase("failed to create object pools")?;

        debug!(endpoint = %endpoint.url(), "Reconciling object store realm");
        provisioner
            .reconcile_realm(ctx, &endpoint)
            .await
            .phase("failed to create object store realm")?;

        debug!("Reconciling object store deployments");
        reconcile_workload(provisioner, ctx)
            .await
            .phase("failed to create object store deployments")?;

        info!(endpoint = %endpoint.url(), "Object store provisioned");
        Ok::<(), Error>(())
    }
    .instrument(ctx.span.clone())
    .await
}

/// Check external cluster compatibility, then reconcile the workload.
async fn reconcile_workload(
    provisioner: &dyn Provisioner,
    ctx: &ProvisioningContext,
) -> Result<()> {
    if ctx.cluster_spec.external.enable {
        let local = ClusterVersion::parse(&ctx.cluster_spec.image).ok();
        check_external_version(local.as_ref(), ctx.cluster_info.version.as_ref())
            .phase("refusing to run new object store")?;
    }

    provisioner
        .reconcile_workload(ctx)
        .await
        .map_err(|e| e.in_phase(format!("failed to create object store {:?}", ctx.key.name)))
}
