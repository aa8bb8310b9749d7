//! Deletion workflow for ObjectStores.
//!
//! ```text
//! Active --(deletion timestamp)--> PendingTeardown --(sub-resources released)-->
//!     FinalizerRemoved --(API server GC)--> Gone
//! ```
//!
//! The finalizer is removed only after teardown succeeded, so a record never
//! disappears while its sub-resources still exist.

use tracing::{Instrument, info, warn};

use crate::controller::error::{Error, Result};
use crate::controller::finalizer::remove_finalizer;
use crate::controller::interfaces::{Provisioner, RecordStore};
use crate::controller::provisioning::ProvisioningContext;
use crate::crd::ObjectStore;

/// Tear down all sub-resources, then release the finalizer.
///
/// On teardown failure the finalizer stays in place and the error is
/// returned; teardown is idempotent so the next attempt starts over safely.
pub async fn run_deletion(
    provisioner: &dyn Provisioner,
    ctx: &mut ProvisioningContext,
    finalizer: &str,
) -> Result<()> {
    let span = ctx.span.clone();
    let name = ctx.key.name.clone();

    async {
        info!("Deleting object store");
        provisioner
            .delete_all_sub_resources(ctx)
            .await
            .map_err(|e| e.in_phase(format!("failed to delete store {:?}", name)))?;

        let records = ctx.records.clone();
        remove_finalizer(records.as_ref(), &mut ctx.record, finalizer).await?;
        info!("Object store deleted");
        Ok::<(), Error>(())
    }
    .instrument(span)
    .await
}

/// Release the finalizer without touching any sub-resource.
///
/// Used when the parent cluster no longer exists: nothing can be cleaned up
/// remotely. If the cluster is later restored, sub-resources created for this
/// store are left behind and need manual cleanup.
pub async fn release_without_cleanup(
    store: &dyn RecordStore,
    record: &mut ObjectStore,
    finalizer: &str,
) -> Result<()> {
    warn!(
        name = ?record.metadata.name,
        namespace = ?record.metadata.namespace,
        "Storage cluster is gone, removing finalizer without cleanup"
    );
    remove_finalizer(store, record, finalizer).await?;
    Ok(())
}
