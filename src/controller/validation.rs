//! Validation of ObjectStore specs and external cluster versions.
//!
//! Validation runs before any external call. A failure is terminal for the
//! current spec: the reconciliation is retried with backoff but keeps failing
//! until the ObjectStore spec or the environment changes.

use std::sync::LazyLock;

use kube::ResourceExt;
use tracing::warn;

use crate::controller::cluster_info::ClusterVersion;
use crate::controller::error::{Error, Result};
use crate::crd::{ObjectStore, PoolSpec};

/// Maximum name length to allow room for suffixes like `.rgw.buckets.index`
/// and the `rgw-` service prefix.
pub const MAX_NAME_LENGTH: usize = 53;

/// Failure domains a pool may be spread across.
pub const FAILURE_DOMAINS: &[&str] = &["host", "osd", "rack", "zone"];

/// Validate the ObjectStore spec.
pub fn validate_store(store: &ObjectStore) -> Result<()> {
    validate_identity(store)?;
    validate_gateway(store)?;
    validate_pool("metadataPool", &store.spec.metadata_pool)?;
    validate_pool("dataPool", &store.spec.data_pool)?;
    Ok(())
}

/// Validate name and namespace
fn validate_identity(store: &ObjectStore) -> Result<()> {
    let name = store.name_any();
    if name.is_empty() {
        return Err(Error::Validation("missing name".to_string()));
    }
    if store.namespace().is_none_or(|ns| ns.is_empty()) {
        return Err(Error::Validation("missing namespace".to_string()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "name '{}' exceeds maximum length of {} characters",
            name, MAX_NAME_LENGTH
        )));
    }
    if !is_dns_label(&name) {
        return Err(Error::Validation(format!(
            "name '{}' must be a lowercase RFC 1035 label",
            name
        )));
    }
    Ok(())
}

/// Check if a name is a valid DNS-1035 label
fn is_dns_label(name: &str) -> bool {
    // Pattern: ^[a-z]([-a-z0-9]*[a-z0-9])?$
    static LABEL_RE: LazyLock<Option<regex::Regex>> =
        LazyLock::new(|| regex::Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").ok());
    LABEL_RE.as_ref().is_some_and(|re| re.is_match(name))
}

/// Validate gateway ports, TLS and instance count
fn validate_gateway(store: &ObjectStore) -> Result<()> {
    let gateway = &store.spec.gateway;

    if !(0..=65535).contains(&gateway.port) {
        return Err(Error::Validation(format!(
            "gateway port {} is out of range",
            gateway.port
        )));
    }

    let secure_port = gateway.secure_port.unwrap_or(0);
    if !(0..=65535).contains(&secure_port) {
        return Err(Error::Validation(format!(
            "gateway securePort {} is out of range",
            secure_port
        )));
    }

    if gateway.port == 0 && secure_port == 0 {
        return Err(Error::Validation(
            "either gateway port or securePort must be set".to_string(),
        ));
    }

    if secure_port > 0
        && gateway
            .ssl_certificate_ref
            .as_deref()
            .is_none_or(str::is_empty)
    {
        return Err(Error::Validation(
            "gateway securePort requires sslCertificateRef".to_string(),
        ));
    }

    if gateway.port > 0 && gateway.port == secure_port {
        return Err(Error::Validation(format!(
            "gateway port and securePort cannot both be {}",
            gateway.port
        )));
    }

    if gateway.instances < 1 {
        return Err(Error::Validation(format!(
            "gateway instances must be at least 1, got {}",
            gateway.instances
        )));
    }

    Ok(())
}

/// Validate a pool spec
fn validate_pool(field: &str, pool: &PoolSpec) -> Result<()> {
    if !FAILURE_DOMAINS.contains(&pool.failure_domain.as_str()) {
        return Err(Error::Validation(format!(
            "{}: unsupported failure domain '{}' (expected one of {})",
            field,
            pool.failure_domain,
            FAILURE_DOMAINS.join(", ")
        )));
    }

    match (&pool.replicated, &pool.erasure_coded) {
        (Some(_), Some(_)) => Err(Error::Validation(format!(
            "{}: both replication and erasure code settings cannot be specified",
            field
        ))),
        (None, None) => Err(Error::Validation(format!(
            "{}: either replicated or erasureCoded must be specified",
            field
        ))),
        (Some(replicated), None) if replicated.size < 1 => Err(Error::Validation(format!(
            "{}: replicated size must be at least 1",
            field
        ))),
        (None, Some(ec)) if ec.data_chunks < 2 => Err(Error::Validation(format!(
            "{}: erasureCoded dataChunks must be at least 2, got {}",
            field, ec.data_chunks
        ))),
        (None, Some(ec)) if ec.coding_chunks < 1 => Err(Error::Validation(format!(
            "{}: erasureCoded codingChunks must be at least 1, got {}",
            field, ec.coding_chunks
        ))),
        _ => Ok(()),
    }
}

/// How a local and an external cluster version relate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionCompatibility {
    /// Same major and minor version.
    Compatible,
    /// Same major version, different minor version.
    MinorMismatch,
    /// One of the versions could not be determined.
    Unknown,
}

/// Compare the operator's local version with the external cluster's version.
///
/// A major mismatch is a validation error. A minor mismatch is tolerated with a
/// warning.
pub fn check_external_version(
    local: Option<&ClusterVersion>,
    external: Option<&ClusterVersion>,
) -> Result<VersionCompatibility> {
    let (Some(local), Some(external)) = (local, external) else {
        warn!(
            local = ?local.map(ToString::to_string),
            external = ?external.map(ToString::to_string),
            "Cannot compare local and external cluster versions"
        );
        return Ok(VersionCompatibility::Unknown);
    };

    if local.major() != external.major() {
        return Err(Error::Validation(format!(
            "external cluster version {} is not compatible with local version {} (major version mismatch)",
            external, local
        )));
    }

    if local.minor() != external.minor() {
        warn!(
            local = %local,
            external = %external,
            "External cluster minor version differs from local version"
        );
        return Ok(VersionCompatibility::MinorMismatch);
    }

    Ok(VersionCompatibility::Compatible)
}
