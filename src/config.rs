//! Operator configuration from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `WATCH_NAMESPACE` | all namespaces |
//! | `POD_NAME` | hostname |
//! | `POD_NAMESPACE` | `default` |
//! | `RECONCILE_TIMEOUT_SECS` | 300 |
//! | `CLUSTER_NOT_READY_REQUEUE_SECS` | 10 |
//! | `HEALTH_PORT` | 8080 |
//! | `CEPH_BIN` | `ceph` |
//! | `RGW_ADMIN_BIN` | `radosgw-admin` |
//! | `CEPH_CONFIG_DIR` | `/var/lib/rook` |

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::backend::AdminConfig;
use crate::controller::finalizer::FINALIZER;
use crate::controller::reconciler::{DEFAULT_NOT_READY_REQUEUE, ReconcilerSettings};

/// Default deadline for a single reconciliation
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(300);
/// Default port of the health and metrics server
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Runtime configuration of the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Only watch this namespace. `None` watches the whole cluster.
    pub watch_namespace: Option<String>,
    /// Identity used for leader election and events.
    pub pod_name: Option<String>,
    /// Namespace holding the leader election lease.
    pub pod_namespace: String,
    /// Deadline for a single reconciliation.
    pub reconcile_timeout: Duration,
    /// Requeue delay while the parent cluster is missing or not ready.
    pub not_ready_requeue: Duration,
    pub health_port: u16,
    pub admin: AdminConfig,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            pod_name: None,
            pod_namespace: "default".to_string(),
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            not_ready_requeue: DEFAULT_NOT_READY_REQUEUE,
            health_port: DEFAULT_HEALTH_PORT,
            admin: AdminConfig::default(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            watch_namespace: var("WATCH_NAMESPACE"),
            pod_name: var("POD_NAME"),
            pod_namespace: var("POD_NAMESPACE").unwrap_or(defaults.pod_namespace),
            reconcile_timeout: Duration::from_secs(parse_or(
                "RECONCILE_TIMEOUT_SECS",
                var("RECONCILE_TIMEOUT_SECS"),
                defaults.reconcile_timeout.as_secs(),
            )),
            not_ready_requeue: Duration::from_secs(parse_or(
                "CLUSTER_NOT_READY_REQUEUE_SECS",
                var("CLUSTER_NOT_READY_REQUEUE_SECS"),
                defaults.not_ready_requeue.as_secs(),
            )),
            health_port: parse_or("HEALTH_PORT", var("HEALTH_PORT"), defaults.health_port),
            admin: AdminConfig {
                ceph_bin: var("CEPH_BIN").unwrap_or(defaults.admin.ceph_bin),
                rgw_admin_bin: var("RGW_ADMIN_BIN").unwrap_or(defaults.admin.rgw_admin_bin),
                config_dir: var("CEPH_CONFIG_DIR").unwrap_or(defaults.admin.config_dir),
            },
        }
    }

    /// Settings for the reconciliation core.
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            not_ready_requeue: self.not_ready_requeue,
            finalizer: FINALIZER.to_string(),
        }
    }

    /// Settings for the storage admin tools.
    pub fn admin_config(&self) -> AdminConfig {
        self.admin.clone()
    }
}

/// Parse a numeric variable, falling back to the default when it is invalid.
fn parse_or<T>(key: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Copy + PartialOrd + Default + std::fmt::Display,
{
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => parsed,
        _ => {
            warn!(variable = %key, value = %raw, default = %default, "Invalid value, using default");
            default
        }
    }
}
