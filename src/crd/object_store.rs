//! ObjectStore Custom Resource Definition.
//!
//! An ObjectStore describes an S3-compatible gateway deployment: the network
//! endpoint it listens on, the metadata and data pools backing it, and the
//! gateway workload itself. The parent StorageCluster in the same namespace
//! must be healthy before anything is provisioned.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ObjectStore is a custom resource for deploying object store gateways.
///
/// Example:
/// ```yaml
/// apiVersion: objectstore.rgw.io/v1
/// kind: ObjectStore
/// metadata:
///   name: my-store
///   namespace: storage
/// spec:
///   metadataPool:
///     replicated:
///       size: 3
///   dataPool:
///     erasureCoded:
///       dataChunks: 2
///       codingChunks: 1
///   gateway:
///     port: 80
///     instances: 2
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "objectstore.rgw.io",
    version = "v1",
    kind = "ObjectStore",
    plural = "objectstores",
    shortname = "objstore",
    status = "ObjectStoreStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Port", "type":"integer", "jsonPath":".spec.gateway.port"}"#,
    printcolumn = r#"{"name":"Instances", "type":"integer", "jsonPath":".spec.gateway.instances"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreSpec {
    /// Settings for the metadata pools (index, log, control, meta).
    #[serde(default)]
    pub metadata_pool: PoolSpec,

    /// Settings for the bucket data pool.
    #[serde(default)]
    pub data_pool: PoolSpec,

    /// Keep the pools when the ObjectStore is deleted (default: false).
    #[serde(default)]
    pub preserve_pools_on_delete: bool,

    /// Gateway workload and endpoint configuration.
    #[serde(default)]
    pub gateway: GatewaySpec,
}

/// Pool layout. Exactly one of `replicated` or `erasureCoded` must be set.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    /// CRUSH failure domain: host, osd, rack or zone (default: host).
    #[serde(default = "default_failure_domain")]
    pub failure_domain: String,

    /// Replicated pool settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicated: Option<ReplicatedSpec>,

    /// Erasure-coded pool settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub erasure_coded: Option<ErasureCodedSpec>,
}

impl Default for PoolSpec {
    fn default() -> Self {
        Self {
            failure_domain: default_failure_domain(),
            replicated: None,
            erasure_coded: None,
        }
    }
}

impl PoolSpec {
    /// Replicated pool of the given size.
    pub fn replicated(size: u32) -> Self {
        Self {
            replicated: Some(ReplicatedSpec { size }),
            ..Default::default()
        }
    }

    /// Erasure-coded pool with k data and m coding chunks.
    pub fn erasure_coded(data_chunks: u32, coding_chunks: u32) -> Self {
        Self {
            erasure_coded: Some(ErasureCodedSpec {
                data_chunks,
                coding_chunks,
            }),
            ..Default::default()
        }
    }
}

fn default_failure_domain() -> String {
    "host".to_string()
}

/// Replicated pool settings.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedSpec {
    /// Number of copies of each object.
    pub size: u32,
}

/// Erasure-coded pool settings.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErasureCodedSpec {
    /// Number of data chunks (k).
    pub data_chunks: u32,
    /// Number of coding chunks (m).
    pub coding_chunks: u32,
}

/// Gateway configuration.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// Plain HTTP port (default: 80). 0 disables the plain listener.
    #[serde(default = "default_gateway_port")]
    pub port: i32,

    /// HTTPS port. Requires `sslCertificateRef`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure_port: Option<i32>,

    /// Name of the Secret holding the TLS certificate for the secure port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_certificate_ref: Option<String>,

    /// Number of gateway pods (default: 1).
    #[serde(default = "default_instances")]
    pub instances: i32,

    /// Gateway image. Defaults to the parent cluster image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Resource requests and limits for the gateway container.
    #[serde(default)]
    pub resources: GatewayResources,

    /// Additional labels applied to managed resources.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Additional annotations applied to managed resources.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Default for GatewaySpec {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            secure_port: None,
            ssl_certificate_ref: None,
            instances: default_instances(),
            image: None,
            resources: GatewayResources::default(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }
}

fn default_gateway_port() -> i32 {
    80
}

fn default_instances() -> i32 {
    1
}

/// CPU and memory settings for the gateway container.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResources {
    /// Requests, e.g. `{"cpu": "500m", "memory": "1Gi"}`.
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    /// Limits.
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

/// Observed state of an ObjectStore.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreStatus {
    /// Current phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// Most recent failure, cleared on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The generation most recently observed by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Phase of an ObjectStore.
///
/// Deletion is not a phase: it is derived from the deletion timestamp.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum Phase {
    /// The record has been observed, provisioning has not completed yet.
    Created,
    /// All sub-resources are provisioned.
    Ready,
    /// The last reconciliation failed; see `status.message`.
    ReconcileFailed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Created => write!(f, "Created"),
            Phase::Ready => write!(f, "Ready"),
            Phase::ReconcileFailed => write!(f, "ReconcileFailed"),
        }
    }
}

/// Condition describes the state of a resource at a certain point.
///
/// Equality ignores `last_transition_time` so unchanged conditions do not
/// cause status writes.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "Ready" condition.
    pub fn ready(ready: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Ready", ready, reason, message, generation)
    }
}
