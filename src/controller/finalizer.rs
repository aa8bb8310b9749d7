//! Deletion guard on ObjectStore records.
//!
//! While the finalizer is present the API server keeps the record around after
//! deletion is requested, giving the deletion workflow a chance to release the
//! provisioned sub-resources first.

use kube::ResourceExt;
use tracing::info;

use crate::controller::error::{PhaseExt, Result};
use crate::controller::interfaces::{ObjectKey, RecordStore};
use crate::crd::ObjectStore;

/// Finalizer name for graceful deletion
pub const FINALIZER: &str = "objectstore.rgw.io/finalizer";

/// Whether `record` carries `finalizer`.
pub fn has_finalizer(record: &ObjectStore, finalizer: &str) -> bool {
    record.finalizers().iter().any(|f| f == finalizer)
}

/// Add `finalizer` to the record if it is missing.
///
/// Returns whether a write happened. The in-memory record is updated only
/// after the write succeeded.
pub async fn ensure_finalizer(
    store: &dyn RecordStore,
    record: &mut ObjectStore,
    finalizer: &str,
) -> Result<bool> {
    if has_finalizer(record, finalizer) {
        return Ok(false);
    }

    let key = key_of(record);
    let mut finalizers = record.finalizers().to_vec();
    finalizers.push(finalizer.to_string());

    info!(name = %key.name, namespace = %key.namespace, "Adding finalizer");
    store
        .write_finalizers(&key, &finalizers)
        .await
        .phase("failed to add finalizer")?;
    record.metadata.finalizers = Some(finalizers);
    Ok(true)
}

/// Remove `finalizer` from the record if it is present.
///
/// Returns whether a write happened.
pub async fn remove_finalizer(
    store: &dyn RecordStore,
    record: &mut ObjectStore,
    finalizer: &str,
) -> Result<bool> {
    if !has_finalizer(record, finalizer) {
        return Ok(false);
    }

    let key = key_of(record);
    let finalizers: Vec<String> = record
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect();

    info!(name = %key.name, namespace = %key.namespace, "Removing finalizer");
    store
        .write_finalizers(&key, &finalizers)
        .await
        .phase("failed to remove finalizer")?;
    record.metadata.finalizers = Some(finalizers);
    Ok(true)
}

fn key_of(record: &ObjectStore) -> ObjectKey {
    ObjectKey::new(record.namespace().unwrap_or_default(), record.name_any())
}
