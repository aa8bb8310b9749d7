//! Parent cluster identity and version.
//!
//! Cluster info is loaded on every reconciliation and never cached, the parent
//! cluster may have been upgraded or replaced since the last call.

use std::sync::LazyLock;

use semver::Version;
use tracing::{debug, error};

use crate::controller::error::{Error, PhaseExt, Result};
use crate::controller::interfaces::ClusterQuery;

/// Daemon kinds whose versions can be queried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DaemonType {
    Mon,
    Mgr,
    Osd,
    Rgw,
}

impl DaemonType {
    /// Label value used on the daemon's deployments.
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonType::Mon => "mon",
            DaemonType::Mgr => "mgr",
            DaemonType::Osd => "osd",
            DaemonType::Rgw => "rgw",
        }
    }
}

impl std::fmt::Display for DaemonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version of the storage cluster daemons.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterVersion(Version);

impl ClusterVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// Extract a version from a tag or image reference.
    ///
    /// Accepts `15.2.4`, `v15.2`, `ceph/ceph:v15.2.4-20200630` and similar.
    pub fn parse(input: &str) -> Result<Self> {
        // Pattern: v?MAJOR.MINOR[.PATCH]
        static VERSION_RE: LazyLock<Option<regex::Regex>> =
            LazyLock::new(|| regex::Regex::new(r"v?(\d+)\.(\d+)(?:\.(\d+))?").ok());

        let tag = input.rsplit(':').next().unwrap_or(input);
        let caps = VERSION_RE
            .as_ref()
            .and_then(|re| re.captures(tag))
            .ok_or_else(|| Error::Validation(format!("no version found in '{}'", input)))?;

        let part = |i: usize| -> Result<u64> {
            caps.get(i).map_or(Ok(0), |m| {
                m.as_str()
                    .parse::<u64>()
                    .map_err(|e| Error::Validation(format!("invalid version '{}': {}", input, e)))
            })
        };
        Ok(Self::new(part(1)?, part(2)?, part(3)?))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }
}

impl std::fmt::Display for ClusterVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity and version facts about the parent cluster.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterInfo {
    /// Cluster name (the namespace it runs in).
    pub name: String,
    /// Cluster identifier.
    pub fsid: String,
    /// Least up-to-date monitor version, if it could be determined.
    pub version: Option<ClusterVersion>,
}

/// The oldest of a set of reported versions.
pub fn least_uptodate<I>(versions: I) -> Option<ClusterVersion>
where
    I: IntoIterator<Item = ClusterVersion>,
{
    versions.into_iter().min()
}

/// Load cluster info for `namespace`.
///
/// Failing to resolve the cluster identity aborts the reconciliation. Failing
/// to determine the daemon version is only logged.
pub async fn load_cluster_info(query: &dyn ClusterQuery, namespace: &str) -> Result<ClusterInfo> {
    let mut info = query
        .get_cluster_info(namespace)
        .await
        .phase("failed to populate cluster info")?;

    let daemon = DaemonType::Mon;
    match query.get_daemon_version(namespace, daemon).await {
        Ok(version) => {
            debug!(namespace = %namespace, daemon = %daemon, version = %version, "Resolved daemon version");
            info.version = Some(version);
        }
        Err(e) => {
            error!(
                namespace = %namespace,
                daemon = %daemon,
                error = %e,
                "Failed to retrieve current daemon version"
            );
        }
    }

    Ok(info)
}
