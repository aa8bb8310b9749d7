//! Deletion scenarios: finalizer ordering, teardown failures and a parent
//! cluster that is already gone.

use std::sync::atomic::Ordering;

use objectstore_operator::controller::finalizer::FINALIZER;
use objectstore_operator::controller::readiness::IMMEDIATE_RETRY;
use objectstore_operator::controller::reconciler::ReconcileOutcome;

use crate::mock_state::{Harness, NOT_READY_REQUEUE, Step, key, object_store, store_spec};

const OTHER_FINALIZER: &str = "backup.example.io/protect";

/// A store that reached Ready and then got a deletion request.
async fn deleted_ready_store() -> Harness {
    let h = Harness::with_store(store_spec());
    h.reconciler.reconcile(&key()).await.unwrap();
    assert!(h.records.has_finalizer(&key()));

    h.records.request_deletion(&key());
    h.provisioner.clear_calls();
    h
}

#[tokio::test]
async fn test_delete_tears_down_then_releases() {
    let h = deleted_ready_store().await;

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert_eq!(h.provisioner.calls(), vec![Step::Teardown]);
    assert!(!h.provisioner.exists(Step::Workload));
    assert!(h.records.get(&key()).is_none());
}

#[tokio::test]
async fn test_teardown_failure_keeps_finalizer() {
    let h = deleted_ready_store().await;
    h.provisioner.fail_on(Some(Step::Teardown));

    let err = h.reconciler.reconcile(&key()).await.unwrap_err();

    assert!(err.to_string().contains("failed to delete store"));
    assert!(h.records.has_finalizer(&key()));

    h.provisioner.fail_on(None);
    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert!(h.records.get(&key()).is_none());
}

#[tokio::test]
async fn test_gone_cluster_releases_without_cleanup() {
    let h = deleted_ready_store().await;
    h.cluster.set(None);

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert!(h.provisioner.calls().is_empty());
    assert!(h.records.get(&key()).is_none());
}

#[tokio::test]
async fn test_unhealthy_cluster_delays_deletion() {
    let h = deleted_ready_store().await;
    h.cluster.set_health("HEALTH_ERR");

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::RequeueAfter(NOT_READY_REQUEUE));
    assert!(h.provisioner.calls().is_empty());
    assert!(h.records.has_finalizer(&key()));
}

#[tokio::test]
async fn test_query_error_delays_deletion() {
    let h = deleted_ready_store().await;
    h.cluster.fail_queries.store(true, Ordering::SeqCst);

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::RequeueAfter(IMMEDIATE_RETRY));
    assert!(h.records.has_finalizer(&key()));
}

#[tokio::test]
async fn test_cluster_info_failure_keeps_finalizer() {
    let h = deleted_ready_store().await;
    h.cluster.fail_info.store(true, Ordering::SeqCst);

    h.reconciler.reconcile(&key()).await.unwrap_err();

    assert!(h.provisioner.calls().is_empty());
    assert!(h.records.has_finalizer(&key()));
}

#[tokio::test]
async fn test_other_finalizers_are_preserved() {
    let mut record = object_store(store_spec());
    record.metadata.finalizers = Some(vec![OTHER_FINALIZER.to_string()]);
    let h = Harness::new();
    h.records.insert(record);
    h.reconciler.reconcile(&key()).await.unwrap();
    h.records.request_deletion(&key());

    h.reconciler.reconcile(&key()).await.unwrap();

    let record = h.records.get(&key()).unwrap();
    assert_eq!(
        record.metadata.finalizers,
        Some(vec![OTHER_FINALIZER.to_string()])
    );
}

#[tokio::test]
async fn test_no_finalizer_added_while_deleting() {
    let mut record = object_store(store_spec());
    record.metadata.finalizers = Some(vec![OTHER_FINALIZER.to_string()]);
    let h = Harness::new();
    h.records.insert(record);
    h.records.request_deletion(&key());

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert_eq!(h.records.finalizer_writes(), 0);
    let finalizers = h.records.get(&key()).unwrap().metadata.finalizers.unwrap();
    assert!(!finalizers.iter().any(|f| f == FINALIZER));
}

#[tokio::test]
async fn test_deleted_record_is_not_reprovisioned() {
    let h = deleted_ready_store().await;
    h.reconciler.reconcile(&key()).await.unwrap();
    h.provisioner.clear_calls();

    let outcome = h.reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert!(h.provisioner.calls().is_empty());
}
