//! Multi-step scenarios for a single ObjectStore.
//!
//! Each test runs the real reconciler one or more times against the mocks
//! and checks the resulting record and provisioner state.

use std::sync::atomic::Ordering;

use objectstore_operator::controller::cluster_info::ClusterVersion;
use objectstore_operator::controller::error::Error;
use objectstore_operator::controller::readiness::IMMEDIATE_RETRY;
use objectstore_operator::controller::reconciler::ReconcileOutcome;
use objectstore_operator::crd::{HEALTH_WARN, ObjectStoreSpec, Phase, PoolSpec};

use crate::mock_state::{FSID, Harness, NOT_READY_REQUEUE, Step, key, store_spec};

const ALL_STEPS: [Step; 4] = [Step::Endpoint, Step::Pools, Step::Realm, Step::Workload];

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_create_reaches_ready() {
    let h = Harness::with_store(store_spec());

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert_eq!(h.records.phase(&key()), Some(Phase::Ready));
    assert_eq!(h.records.message(&key()), None);
    assert!(h.records.has_finalizer(&key()));
    assert_eq!(h.provisioner.calls(), ALL_STEPS.to_vec());

    let (image, fsid) = h.provisioner.last_workload.lock().unwrap().clone().unwrap();
    assert_eq!(image, "ceph/ceph:v15.2.4");
    assert_eq!(fsid, FSID);

    let status = h.records.get(&key()).unwrap().status.unwrap();
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(status.conditions.len(), 1);
    assert_eq!(status.conditions[0].status, "True");
}

#[tokio::test]
async fn test_missing_record_is_ignored() {
    let h = Harness::new();

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert!(h.provisioner.calls().is_empty());
    assert_eq!(h.records.status_writes(), 0);
}

#[tokio::test]
async fn test_read_failure_is_reported() {
    let h = Harness::with_store(store_spec());
    h.records.fail_reads.store(true, Ordering::SeqCst);

    let err = h.reconciler.reconcile(&key()).await.unwrap_err();

    assert!(err.to_string().contains("failed to get object store"));
    assert!(h.provisioner.calls().is_empty());
}

#[tokio::test]
async fn test_gateway_image_override() {
    let mut spec = store_spec();
    spec.gateway.image = Some("ceph/ceph:v15.2.5".to_string());
    let h = Harness::with_store(spec);

    h.reconciler.reconcile(&key()).await.unwrap();

    let (image, _) = h.provisioner.last_workload.lock().unwrap().clone().unwrap();
    assert_eq!(image, "ceph/ceph:v15.2.5");
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_repeated_reconcile_is_idempotent() {
    let h = Harness::with_store(store_spec());

    h.reconciler.reconcile(&key()).await.unwrap();
    let status_writes = h.records.status_writes();
    let finalizer_writes = h.records.finalizer_writes();
    let status = h.records.get(&key()).unwrap().status;

    for _ in 0..3 {
        let outcome = h.reconciler.reconcile(&key()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
    }

    assert_eq!(h.records.status_writes(), status_writes);
    assert_eq!(h.records.finalizer_writes(), finalizer_writes);
    assert_eq!(h.records.get(&key()).unwrap().status, status);
    for step in ALL_STEPS {
        assert_eq!(h.provisioner.creations(step), 1, "{:?} created again", step);
    }
}

#[tokio::test]
async fn test_spec_change_updates_observed_generation() {
    let h = Harness::with_store(store_spec());
    h.reconciler.reconcile(&key()).await.unwrap();

    h.records.update(&key(), |record| {
        record.spec.gateway.instances = 3;
        record.metadata.generation = Some(2);
    });
    h.reconciler.reconcile(&key()).await.unwrap();

    let status = h.records.get(&key()).unwrap().status.unwrap();
    assert_eq!(status.phase, Some(Phase::Ready));
    assert_eq!(status.observed_generation, Some(2));
    assert_eq!(h.provisioner.total_creations(), ALL_STEPS.len());
}

// ============================================================================
// Readiness gate
// ============================================================================

#[tokio::test]
async fn test_unhealthy_cluster_requeues_without_provisioning() {
    let h = Harness::with_store(store_spec());
    h.cluster.set_health("HEALTH_ERR");

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::RequeueAfter(NOT_READY_REQUEUE));
    assert!(h.provisioner.calls().is_empty());
    assert!(!h.records.has_finalizer(&key()));
    assert_eq!(h.records.phase(&key()), Some(Phase::Created));
}

#[tokio::test]
async fn test_missing_cluster_requeues() {
    let h = Harness::with_store(store_spec());
    h.cluster.set(None);

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::RequeueAfter(NOT_READY_REQUEUE));
    assert!(h.provisioner.calls().is_empty());
    assert!(!h.records.has_finalizer(&key()));
}

#[tokio::test]
async fn test_cluster_query_error_retries_immediately() {
    let h = Harness::with_store(store_spec());
    h.cluster.fail_queries.store(true, Ordering::SeqCst);

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::RequeueAfter(IMMEDIATE_RETRY));
    assert!(h.provisioner.calls().is_empty());
}

#[tokio::test]
async fn test_degraded_cluster_is_ready() {
    let h = Harness::with_store(store_spec());
    h.cluster.set_health(HEALTH_WARN);

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert_eq!(h.records.phase(&key()), Some(Phase::Ready));
}

#[tokio::test]
async fn test_cluster_becomes_ready_later() {
    let h = Harness::with_store(store_spec());
    h.cluster.set_health("HEALTH_ERR");
    h.reconciler.reconcile(&key()).await.unwrap();

    h.cluster.set_health("HEALTH_OK");
    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert_eq!(h.records.phase(&key()), Some(Phase::Ready));
}

#[tokio::test]
async fn test_cluster_info_failure_aborts_before_finalizer() {
    let h = Harness::with_store(store_spec());
    h.cluster.fail_info.store(true, Ordering::SeqCst);

    let err = h.reconciler.reconcile(&key()).await.unwrap_err();

    assert!(err.to_string().contains("failed to populate cluster info"));
    assert!(!h.records.has_finalizer(&key()));
    assert!(h.provisioner.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_daemon_version_is_tolerated() {
    let h = Harness::with_store(store_spec());
    h.cluster.set_mon_version(None);

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert_eq!(h.records.phase(&key()), Some(Phase::Ready));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_realm_failure_sets_failed_status() {
    let h = Harness::with_store(store_spec());
    h.provisioner.fail_on(Some(Step::Realm));

    let err = h.reconciler.reconcile(&key()).await.unwrap_err();

    assert!(matches!(err.root(), Error::Provisioning(_)));
    assert_eq!(h.records.phase(&key()), Some(Phase::ReconcileFailed));
    let message = h.records.message(&key()).unwrap();
    assert!(message.contains("failed to create object store realm"), "{}", message);
    assert!(h.records.has_finalizer(&key()));
    assert_eq!(
        h.provisioner.calls(),
        vec![Step::Endpoint, Step::Pools, Step::Realm]
    );
}

#[tokio::test]
async fn test_recovery_after_partial_failure() {
    let h = Harness::with_store(store_spec());
    h.provisioner.fail_on(Some(Step::Pools));
    h.reconciler.reconcile(&key()).await.unwrap_err();
    assert!(h.provisioner.exists(Step::Endpoint));
    assert!(!h.provisioner.exists(Step::Workload));

    h.provisioner.fail_on(None);
    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert_eq!(h.records.phase(&key()), Some(Phase::Ready));
    assert_eq!(h.records.message(&key()), None);
    for step in ALL_STEPS {
        assert_eq!(h.provisioner.creations(step), 1);
    }
}

#[tokio::test]
async fn test_invalid_spec_fails_before_provisioning() {
    let mut spec = store_spec();
    spec.gateway.port = 0;
    let h = Harness::with_store(spec);

    let err = h.reconciler.reconcile(&key()).await.unwrap_err();

    assert!(err.is_validation());
    assert!(!err.is_retryable());
    assert!(h.provisioner.calls().is_empty());
    assert_eq!(h.records.phase(&key()), Some(Phase::ReconcileFailed));
    assert!(h.records.message(&key()).unwrap().contains("invalid object store"));
}

#[tokio::test]
async fn test_conflicting_pool_settings_rejected() {
    let h = Harness::with_store(ObjectStoreSpec {
        metadata_pool: PoolSpec {
            erasure_coded: PoolSpec::erasure_coded(2, 1).erasure_coded,
            ..PoolSpec::replicated(3)
        },
        ..store_spec()
    });

    let err = h.reconciler.reconcile(&key()).await.unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("metadataPool"));
    assert!(h.provisioner.calls().is_empty());
}

#[tokio::test]
async fn test_status_write_failure_keeps_original_error() {
    let h = Harness::with_store(store_spec());
    h.reconciler.reconcile(&key()).await.unwrap();

    h.provisioner.fail_on(Some(Step::Workload));
    h.records.fail_status_writes.store(true, Ordering::SeqCst);
    let err = h.reconciler.reconcile(&key()).await.unwrap_err();

    assert!(matches!(err.root(), Error::Provisioning(_)));
    assert_eq!(h.records.phase(&key()), Some(Phase::Ready));
}

// ============================================================================
// External clusters
// ============================================================================

#[tokio::test]
async fn test_external_major_mismatch_blocks_workload() {
    let h = Harness::with_store(store_spec());
    h.cluster.update_spec(|spec| spec.external.enable = true);
    h.cluster.set_mon_version(Some(ClusterVersion::new(14, 2, 11)));

    let err = h.reconciler.reconcile(&key()).await.unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("refusing to run new object store"));
    assert_eq!(
        h.provisioner.calls(),
        vec![Step::Endpoint, Step::Pools, Step::Realm]
    );
    assert_eq!(h.records.phase(&key()), Some(Phase::ReconcileFailed));
}

#[tokio::test]
async fn test_external_minor_mismatch_is_tolerated() {
    let h = Harness::with_store(store_spec());
    h.cluster.update_spec(|spec| spec.external.enable = true);
    h.cluster.set_mon_version(Some(ClusterVersion::new(15, 1, 0)));

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert!(h.provisioner.exists(Step::Workload));
}
