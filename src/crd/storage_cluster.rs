//! StorageCluster Custom Resource Definition.
//!
//! The StorageCluster is the parent of every ObjectStore in its namespace.
//! It is owned by another controller; this operator only reads it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Health reported by a storage cluster that accepts work.
pub const HEALTH_OK: &str = "HEALTH_OK";
/// Health reported by a degraded but usable storage cluster.
pub const HEALTH_WARN: &str = "HEALTH_WARN";

/// Cluster-wide configuration shared by all object stores in the namespace.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "objectstore.rgw.io",
    version = "v1",
    kind = "StorageCluster",
    plural = "storageclusters",
    status = "StorageClusterStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Connect to a cluster managed outside of Kubernetes.
    #[serde(default)]
    pub external: ExternalSpec,

    /// Daemon image used by the cluster, e.g. `ceph/ceph:v15.2.4`.
    #[serde(default)]
    pub image: String,

    /// Host directory for daemon configuration and logs (default: /var/lib/rook).
    #[serde(default = "default_data_dir_host_path")]
    pub data_dir_host_path: String,

    /// Skip safety checks during upgrades.
    #[serde(default)]
    pub skip_upgrade_checks: bool,
}

fn default_data_dir_host_path() -> String {
    "/var/lib/rook".to_string()
}

/// External cluster settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSpec {
    /// The cluster runs outside of Kubernetes.
    #[serde(default)]
    pub enable: bool,
}

/// Observed state of a StorageCluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterStatus {
    /// Health string reported by the cluster (HEALTH_OK, HEALTH_WARN, HEALTH_ERR).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,

    /// Cluster identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fsid: Option<String>,

    /// Running daemon version, e.g. `15.2.4`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl StorageClusterStatus {
    /// Whether the reported health allows reconciling dependents.
    pub fn is_healthy(&self) -> bool {
        matches!(self.health.as_deref(), Some(HEALTH_OK) | Some(HEALTH_WARN))
    }
}
