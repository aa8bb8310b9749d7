//! Parent cluster queries against the Kubernetes API.
//!
//! The parent is the StorageCluster in the ObjectStore's namespace. Daemon
//! versions come from the `ceph-version` label the cluster controller puts on
//! each daemon Deployment.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, warn};

use crate::controller::cluster_info::{ClusterInfo, ClusterVersion, DaemonType, least_uptodate};
use crate::controller::error::{Error, Result};
use crate::controller::interfaces::{ClusterObservation, ClusterQuery};
use crate::crd::StorageCluster;
use crate::resources::common::{APP_LABEL, VERSION_LABEL};

/// [`ClusterQuery`] backed by the StorageCluster and Deployment APIs.
#[derive(Clone)]
pub struct KubeClusterQuery {
    client: Client,
}

impl KubeClusterQuery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn find_cluster(&self, namespace: &str) -> Result<Option<StorageCluster>> {
        let api: Api<StorageCluster> = Api::namespaced(self.client.clone(), namespace);
        let clusters = api.list(&ListParams::default()).await?;
        if clusters.items.len() > 1 {
            warn!(
                namespace = %namespace,
                count = clusters.items.len(),
                "Multiple storage clusters in namespace, using the first"
            );
        }
        Ok(clusters.items.into_iter().next())
    }
}

/// Versions reported by the daemon deployments' labels.
pub fn deployment_versions(deployments: &[Deployment]) -> Vec<ClusterVersion> {
    deployments
        .iter()
        .filter_map(|d| {
            let label = d.labels().get(VERSION_LABEL)?;
            match ClusterVersion::parse(label) {
                Ok(version) => Some(version),
                Err(e) => {
                    debug!(deployment = %d.name_any(), error = %e, "Ignoring unparsable version label");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl ClusterQuery for KubeClusterQuery {
    async fn get_cluster_spec(&self, namespace: &str) -> Result<Option<ClusterObservation>> {
        Ok(self.find_cluster(namespace).await?.map(|cluster| {
            ClusterObservation {
                name: cluster.name_any(),
                spec: cluster.spec,
                status: cluster.status.unwrap_or_default(),
            }
        }))
    }

    async fn get_cluster_info(&self, namespace: &str) -> Result<ClusterInfo> {
        let cluster = self.find_cluster(namespace).await?.ok_or_else(|| {
            Error::ClusterInfo(format!("no storage cluster in namespace {:?}", namespace))
        })?;

        let cluster_name = cluster.name_any();
        let fsid = cluster
            .status
            .and_then(|s| s.fsid)
            .filter(|fsid| !fsid.is_empty())
            .ok_or_else(|| {
                Error::ClusterInfo(format!(
                    "storage cluster {:?} has not reported its fsid",
                    cluster_name
                ))
            })?;

        Ok(ClusterInfo {
            name: namespace.to_string(),
            fsid,
            version: None,
        })
    }

    async fn get_daemon_version(
        &self,
        namespace: &str,
        daemon: DaemonType,
    ) -> Result<ClusterVersion> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("{}={}", APP_LABEL, daemon);
        let deployments = api.list(&ListParams::default().labels(&selector)).await?;

        least_uptodate(deployment_versions(&deployments.items)).ok_or_else(|| {
            Error::ClusterInfo(format!(
                "no {} deployment in namespace {:?} reports a version",
                daemon, namespace
            ))
        })
    }
}
