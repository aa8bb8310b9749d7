//! Status tracking for ObjectStore records.
//!
//! This is the only place that sets `status.phase`. A status write is skipped
//! when nothing would change, so a steady-state reconciliation produces no
//! writes.

use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::error::{PhaseExt, Result};
use crate::controller::interfaces::{ObjectKey, RecordStore};
use crate::crd::{Condition, ObjectStore, ObjectStoreStatus, Phase};

/// Set the phase to `Created` if the record has never been observed.
///
/// Returns whether a write happened.
pub async fn initialize(store: &dyn RecordStore, record: &mut ObjectStore) -> Result<bool> {
    if record.status.as_ref().and_then(|s| s.phase).is_some() {
        return Ok(false);
    }
    transition(store, record, Phase::Created, None).await
}

/// Record a successful reconciliation, clearing any previous failure message.
pub async fn set_ready(store: &dyn RecordStore, record: &mut ObjectStore) -> Result<bool> {
    transition(store, record, Phase::Ready, None).await
}

/// Record a failed reconciliation with the error message.
pub async fn set_failed(
    store: &dyn RecordStore,
    record: &mut ObjectStore,
    message: &str,
) -> Result<bool> {
    transition(store, record, Phase::ReconcileFailed, Some(message.to_string())).await
}

/// Build the status for `phase` and persist it if it differs from the current one.
async fn transition(
    store: &dyn RecordStore,
    record: &mut ObjectStore,
    phase: Phase,
    message: Option<String>,
) -> Result<bool> {
    let current = record.status.clone().unwrap_or_default();
    let desired = build_status(&current, phase, message, record.metadata.generation);

    if record.status.as_ref() == Some(&desired) {
        debug!(name = %record.name_any(), phase = %phase, "Status unchanged");
        return Ok(false);
    }

    let key = ObjectKey::new(record.namespace().unwrap_or_default(), record.name_any());
    info!(
        name = %key.name,
        namespace = %key.namespace,
        from = ?current.phase,
        to = %phase,
        "Updating status"
    );
    store
        .write_status(&key, &desired)
        .await
        .phase("failed to set status")?;
    record.status = Some(desired);
    Ok(true)
}

/// Compute the status for `phase`, keeping unrelated conditions.
pub fn build_status(
    current: &ObjectStoreStatus,
    phase: Phase,
    message: Option<String>,
    generation: Option<i64>,
) -> ObjectStoreStatus {
    let ready = match phase {
        Phase::Created => Condition::ready(
            false,
            "Provisioning",
            "Object store is being provisioned",
            generation,
        ),
        Phase::Ready => {
            Condition::ready(true, "Provisioned", "Object store is ready", generation)
        }
        Phase::ReconcileFailed => Condition::ready(
            false,
            "ReconcileFailed",
            message.as_deref().unwrap_or("Reconciliation failed"),
            generation,
        ),
    };

    let mut conditions = current.conditions.clone();
    set_condition(&mut conditions, ready);

    ObjectStoreStatus {
        phase: Some(phase),
        message,
        observed_generation: generation,
        conditions,
    }
}

/// Add or replace a condition of the same type.
///
/// The transition time is kept when only the timestamp would change.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        Some(existing) if *existing == condition => {}
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .is_some_and(|c| c.status == "True")
}
