//! Common resource generation utilities.
//!
//! Provides naming, labels and owner references shared by every resource
//! owned by an ObjectStore.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

use crate::controller::cluster_info::DaemonType;
use crate::crd::ObjectStore;

/// Label carrying the daemon type, also read back to find daemon versions.
pub const APP_LABEL: &str = "app";
/// Label carrying the store name on gateway pods.
pub const STORE_LABEL: &str = "rgw_store";
/// Label carrying the daemon version on daemon deployments.
pub const VERSION_LABEL: &str = "ceph-version";

/// Name of the Service and Deployment for a store.
pub fn gateway_name(resource: &ObjectStore) -> String {
    format!("{}-{}", DaemonType::Rgw, resource.name_any())
}

/// Standard labels applied to all managed resources
pub fn standard_labels(resource: &ObjectStore) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        "objectstore".to_string(),
    );
    labels.insert(
        "app.kubernetes.io/instance".to_string(),
        resource.name_any(),
    );
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "objectstore-operator".to_string(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "gateway".to_string(),
    );

    // Merge user-defined labels
    for (key, value) in &resource.spec.gateway.labels {
        labels.insert(key.clone(), value.clone());
    }

    // Selector labels win over user labels
    labels.extend(pod_selector_labels(resource));
    labels
}

/// Labels used to select gateway pods.
pub fn pod_selector_labels(resource: &ObjectStore) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(APP_LABEL.to_string(), DaemonType::Rgw.to_string());
    labels.insert(STORE_LABEL.to_string(), resource.name_any());
    labels
}

/// User-defined annotations
pub fn standard_annotations(resource: &ObjectStore) -> BTreeMap<String, String> {
    resource.spec.gateway.annotations.clone()
}

/// Create owner reference for an ObjectStore
pub fn owner_reference(resource: &ObjectStore) -> OwnerReference {
    OwnerReference {
        api_version: ObjectStore::api_version(&()).to_string(),
        kind: ObjectStore::kind(&()).to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
