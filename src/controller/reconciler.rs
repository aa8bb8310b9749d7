//! Reconciliation loop for ObjectStore.
//!
//! [`Reconciler::reconcile`] is the level-triggered entry point. It keeps no
//! state between calls: readiness, cluster info and phase outcomes are derived
//! again from the record and the parent cluster on every invocation, so the
//! loop heals itself after restarts.
//!
//! [`reconcile`] and [`error_policy`] adapt it to the kube-rs controller
//! runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::{ResourceExt, runtime::controller::Action};
use tracing::{Instrument, Span, debug, error, info_span, warn};

use crate::controller::cluster_info::load_cluster_info;
use crate::controller::context::Context;
use crate::controller::deletion::{release_without_cleanup, run_deletion};
use crate::controller::error::{Error, PhaseExt, Result};
use crate::controller::finalizer::{FINALIZER, ensure_finalizer};
use crate::controller::interfaces::{ClusterQuery, ObjectKey, Provisioner, RecordStore};
use crate::controller::provisioning::{ProvisioningContext, run_provisioning};
use crate::controller::readiness::{Readiness, check_ready};
use crate::controller::status;
use crate::crd::ObjectStore;
use crate::health::Outcome;

/// Requeue delay while the parent cluster is missing or not ready.
pub const DEFAULT_NOT_READY_REQUEUE: Duration = Duration::from_secs(10);

/// What the dispatcher should do after a successful call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged. Wait for the next change.
    Done,
    /// Try again after the given delay.
    RequeueAfter(Duration),
}

/// Tunables of the reconciler.
#[derive(Clone, Debug)]
pub struct ReconcilerSettings {
    /// Requeue delay while the parent cluster is missing or not ready.
    pub not_ready_requeue: Duration,
    /// Finalizer token guarding deletion.
    pub finalizer: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            not_ready_requeue: DEFAULT_NOT_READY_REQUEUE,
            finalizer: FINALIZER.to_string(),
        }
    }
}

/// Drives one ObjectStore toward its desired state per call.
#[derive(Clone)]
pub struct Reconciler {
    records: Arc<dyn RecordStore>,
    cluster: Arc<dyn ClusterQuery>,
    provisioner: Arc<dyn Provisioner>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(
        records: Arc<dyn RecordStore>,
        cluster: Arc<dyn ClusterQuery>,
        provisioner: Arc<dyn Provisioner>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            records,
            cluster,
            provisioner,
            settings,
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Reconcile the ObjectStore at `key`.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let span = info_span!("reconcile", namespace = %key.namespace, name = %key.name);
        self.reconcile_in_span(key, span.clone())
            .instrument(span)
            .await
    }

    async fn reconcile_in_span(&self, key: &ObjectKey, span: Span) -> Result<ReconcileOutcome> {
        let records = self.records.as_ref();
        let finalizer = self.settings.finalizer.as_str();

        let Some(mut record) = records
            .read_record(key)
            .await
            .phase("failed to get object store")?
        else {
            debug!("Object store not found, ignoring since it must have been deleted");
            return Ok(ReconcileOutcome::Done);
        };

        // The record was just created
        status::initialize(records, &mut record).await?;

        let deleting = record.metadata.deletion_timestamp.is_some();

        let cluster_spec =
            match check_ready(self.cluster.as_ref(), key, self.settings.not_ready_requeue).await {
                Readiness::Ready(spec) => spec,
                Readiness::ClusterGone { .. } if deleting => {
                    // Nothing was ever provisioned remotely, or it went away with the cluster
                    release_without_cleanup(records, &mut record, finalizer).await?;
                    return Ok(ReconcileOutcome::Done);
                }
                not_ready => {
                    let delay = not_ready
                        .requeue_after()
                        .unwrap_or(self.settings.not_ready_requeue);
                    debug!(retry_in = ?delay, "Storage cluster not ready");
                    return Ok(ReconcileOutcome::RequeueAfter(delay));
                }
            };

        let cluster_info = load_cluster_info(self.cluster.as_ref(), &key.namespace).await?;

        // A record that is being deleted cannot gain new finalizers
        if !deleting {
            ensure_finalizer(records, &mut record, finalizer).await?;
        }

        let mut ctx = ProvisioningContext::new(
            self.records.clone(),
            record,
            cluster_info,
            cluster_spec,
            span,
        );

        if deleting {
            run_deletion(self.provisioner.as_ref(), &mut ctx, finalizer).await?;
            return Ok(ReconcileOutcome::Done);
        }

        match run_provisioning(self.provisioner.as_ref(), &ctx).await {
            Ok(()) => {
                status::set_ready(records, &mut ctx.record).await?;
                debug!("Done reconciling");
                Ok(ReconcileOutcome::Done)
            }
            Err(e) => Err(self.set_failed_status(&mut ctx, e).await),
        }
    }

    /// Record the failure in status and hand the original error back.
    async fn set_failed_status(&self, ctx: &mut ProvisioningContext, err: Error) -> Error {
        let message = err.to_string();
        if let Err(status_err) =
            status::set_failed(self.records.as_ref(), &mut ctx.record, &message).await
        {
            error!(error = %status_err, "Failed to set status");
        }
        err
    }
}

/// Reconcile an ObjectStore for the kube-rs controller runtime.
///
/// Runs the reconciler under the configured deadline. Dropping the future on
/// timeout is safe: every write the reconciler makes is a single request.
pub async fn reconcile(obj: Arc<ObjectStore>, ctx: Arc<Context>) -> Result<Action> {
    let start_time = Instant::now();
    let key = ObjectKey::new(obj.namespace().unwrap_or_default(), obj.name_any());
    let deadline = ctx.config.reconcile_timeout;

    let result = tokio::time::timeout(deadline, ctx.reconciler.reconcile(&key))
        .await
        .unwrap_or(Err(Error::Timeout(deadline)));
    ctx.update_phase_metrics();
    if let Some(ref health_state) = ctx.health_state {
        health_state
            .metrics
            .observe_reconcile(&key, Outcome::of(&result), start_time.elapsed());
    }

    match result {
        Ok(outcome) => Ok(outcome_to_action(outcome)),
        Err(e) => {
            if !e.is_not_found() {
                ctx.publish_warning_event(
                    &obj,
                    "ReconcileFailed",
                    "Reconciling",
                    Some(e.to_string()),
                )
                .await;
            }
            Err(e)
        }
    }
}

/// Map a reconcile outcome to a controller action.
pub fn outcome_to_action(outcome: ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::Done => Action::await_change(),
        ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
    }
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<ObjectStore>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_failure(error);
    }

    if error.is_not_found() {
        debug!(namespace = %namespace, name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(
            namespace = %namespace,
            name = %name,
            step = ?error.step(),
            error = %error,
            "Retryable error, will retry"
        );
    } else {
        error!(
            namespace = %namespace,
            name = %name,
            step = ?error.step(),
            error = %error,
            "Non-retryable error"
        );
    }
    Action::requeue(error.requeue_after())
}
