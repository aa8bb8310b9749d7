//! Readiness gate for the parent storage cluster.
//!
//! Nothing is provisioned or torn down unless the parent cluster exists and
//! reports a usable health. The gate is a pure query.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::controller::interfaces::{ClusterQuery, ObjectKey};
use crate::crd::ClusterSpec;

/// Requeue delay when a lookup of the parent cluster itself failed.
pub const IMMEDIATE_RETRY: Duration = Duration::from_secs(1);

/// Outcome of the readiness gate.
#[derive(Clone, Debug, PartialEq)]
pub enum Readiness {
    /// The parent cluster is usable.
    Ready(ClusterSpec),
    /// The parent cluster exists but cannot accept work yet.
    NotReady { requeue_after: Duration },
    /// There is no parent cluster in the namespace.
    ClusterGone { requeue_after: Duration },
}

impl Readiness {
    /// Whether the parent cluster exists (ready or not).
    pub fn cluster_exists(&self) -> bool {
        !matches!(self, Readiness::ClusterGone { .. })
    }

    /// Requeue delay for the not-ready outcomes.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Readiness::Ready(_) => None,
            Readiness::NotReady { requeue_after } | Readiness::ClusterGone { requeue_after } => {
                Some(*requeue_after)
            }
        }
    }
}

/// Decide whether the ObjectStore at `key` may be reconciled.
///
/// A failed lookup is reported as `NotReady`, not `ClusterGone`: a transient
/// API error must never be mistaken for a deleted cluster.
pub async fn check_ready(
    query: &dyn ClusterQuery,
    key: &ObjectKey,
    not_ready_requeue: Duration,
) -> Readiness {
    let observation = match query.get_cluster_spec(&key.namespace).await {
        Ok(observation) => observation,
        Err(e) => {
            warn!(namespace = %key.namespace, error = %e, "Failed to fetch storage cluster");
            return Readiness::NotReady {
                requeue_after: IMMEDIATE_RETRY,
            };
        }
    };

    let Some(cluster) = observation else {
        debug!(
            namespace = %key.namespace,
            retry_in = ?not_ready_requeue,
            "No storage cluster found"
        );
        return Readiness::ClusterGone {
            requeue_after: not_ready_requeue,
        };
    };

    if cluster.status.is_healthy() {
        return Readiness::Ready(cluster.spec);
    }

    info!(
        namespace = %key.namespace,
        cluster = %cluster.name,
        health = ?cluster.status.health,
        retry_in = ?not_ready_requeue,
        "Storage cluster found but not ready"
    );
    Readiness::NotReady {
        requeue_after: not_ready_requeue,
    }
}
