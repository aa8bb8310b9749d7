// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for objectstore-operator.
//!
//! Uses proptest to generate random inputs and verify invariants.

use std::sync::Mutex;

use async_trait::async_trait;
use proptest::prelude::*;

use objectstore_operator::controller::cluster_info::{ClusterVersion, least_uptodate};
use objectstore_operator::controller::error::Error;
use objectstore_operator::controller::finalizer::{FINALIZER, ensure_finalizer, remove_finalizer};
use objectstore_operator::controller::interfaces::{ObjectKey, RecordStore};
use objectstore_operator::controller::provisioning::{
    ROOT_POOL, data_pool_name, metadata_pool_names, teardown_pools,
};
use objectstore_operator::controller::status::{build_status, is_condition_true};
use objectstore_operator::controller::validation::{
    MAX_NAME_LENGTH, VersionCompatibility, check_external_version, validate_store,
};
use objectstore_operator::crd::{ObjectStore, ObjectStoreSpec, ObjectStoreStatus, Phase, PoolSpec};
use objectstore_operator::resources::services::generate_gateway_service;

/// Strategy for generating version triples.
fn any_version() -> impl Strategy<Value = (u64, u64, u64)> {
    (0..100u64, 0..100u64, 0..1000u64)
}

/// Strategy for generating random phases.
fn any_phase() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Created),
        Just(Phase::Ready),
        Just(Phase::ReconcileFailed),
    ]
}

/// Strategy for generating valid store names.
fn valid_name() -> impl Strategy<Value = String> {
    "[a-z]([-a-z0-9]{0,40}[a-z0-9])?"
}

/// Counts finalizer writes, nothing else.
#[derive(Default)]
struct FinalizerWrites(Mutex<Vec<Vec<String>>>);

#[async_trait]
impl RecordStore for FinalizerWrites {
    async fn read_record(&self, _key: &ObjectKey) -> Result<Option<ObjectStore>, Error> {
        Ok(None)
    }

    async fn write_status(&self, _key: &ObjectKey, _status: &ObjectStoreStatus) -> Result<(), Error> {
        Ok(())
    }

    async fn write_finalizers(&self, _key: &ObjectKey, finalizers: &[String]) -> Result<(), Error> {
        self.0.lock().unwrap().push(finalizers.to_vec());
        Ok(())
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().build().unwrap()
}

fn store(name: &str, port: i32, secure_port: Option<i32>) -> ObjectStore {
    let mut spec = ObjectStoreSpec {
        metadata_pool: PoolSpec::replicated(3),
        data_pool: PoolSpec::erasure_coded(2, 1),
        ..Default::default()
    };
    spec.gateway.port = port;
    spec.gateway.secure_port = secure_port;
    if secure_port.is_some() {
        spec.gateway.ssl_certificate_ref = Some("gateway-cert".to_string());
    }
    let mut store = ObjectStore::new(name, spec);
    store.metadata.namespace = Some("storage".to_string());
    store
}

proptest! {
    /// Plain, prefixed and image-tag forms all parse to the same version.
    #[test]
    fn test_version_parse_forms((major, minor, patch) in any_version(), build in 0..99_999_999u64) {
        let expected = ClusterVersion::new(major, minor, patch);
        let plain = format!("{}.{}.{}", major, minor, patch);

        prop_assert_eq!(ClusterVersion::parse(&plain).unwrap(), expected.clone());
        prop_assert_eq!(ClusterVersion::parse(&format!("v{}", plain)).unwrap(), expected.clone());
        prop_assert_eq!(
            ClusterVersion::parse(&format!("ceph/ceph:v{}-{}", plain, build)).unwrap(),
            expected
        );
    }

    /// Version order follows the numeric triple order.
    #[test]
    fn test_version_order(a in any_version(), b in any_version()) {
        let va = ClusterVersion::new(a.0, a.1, a.2);
        let vb = ClusterVersion::new(b.0, b.1, b.2);
        prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
    }

    /// The least up-to-date version is never newer than any reported version.
    #[test]
    fn test_least_uptodate_is_minimum(versions in prop::collection::vec(any_version(), 1..10)) {
        let versions: Vec<ClusterVersion> = versions
            .into_iter()
            .map(|(a, b, c)| ClusterVersion::new(a, b, c))
            .collect();
        let oldest = least_uptodate(versions.clone()).unwrap();
        for v in &versions {
            prop_assert!(oldest <= *v);
        }
        prop_assert!(versions.contains(&oldest));
    }

    /// Any major mismatch against an external cluster is rejected.
    #[test]
    fn test_external_major_mismatch_rejected(local in any_version(), external in any_version()) {
        let lv = ClusterVersion::new(local.0, local.1, local.2);
        let ev = ClusterVersion::new(external.0, external.1, external.2);
        let result = check_external_version(Some(&lv), Some(&ev));

        if local.0 != external.0 {
            prop_assert!(result.unwrap_err().is_validation());
        } else if local.1 != external.1 {
            prop_assert_eq!(result.unwrap(), VersionCompatibility::MinorMismatch);
        } else {
            prop_assert_eq!(result.unwrap(), VersionCompatibility::Compatible);
        }
    }

    /// Rebuilding a status for the same phase changes nothing.
    #[test]
    fn test_build_status_idempotent(
        phase in any_phase(),
        message in proptest::option::of("[a-z ]{1,30}"),
        generation in 1..1000i64,
    ) {
        let first = build_status(&ObjectStoreStatus::default(), phase, message.clone(), Some(generation));
        let second = build_status(&first, phase, message, Some(generation));
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.conditions.len(), 1);
        prop_assert_eq!(is_condition_true(&first.conditions, "Ready"), phase == Phase::Ready);
    }

    /// Transitions keep exactly one Ready condition.
    #[test]
    fn test_status_transitions_keep_one_condition(phases in prop::collection::vec(any_phase(), 1..10)) {
        let mut status = ObjectStoreStatus::default();
        for phase in &phases {
            status = build_status(&status, *phase, None, Some(1));
        }
        prop_assert_eq!(status.conditions.len(), 1);
        prop_assert_eq!(status.phase, phases.last().copied());
    }

    /// Pool names are derived from the store name and never collide.
    #[test]
    fn test_pool_names_unique(name in valid_name()) {
        let mut names = metadata_pool_names(&name);
        names.push(data_pool_name(&name));
        let total = names.len();
        names.sort();
        names.dedup();
        prop_assert_eq!(names.len(), total);
        prop_assert!(data_pool_name(&name).starts_with(&name));
    }

    /// Teardown never touches the shared root pool and deletes nothing
    /// when pools are preserved.
    #[test]
    fn test_teardown_spares_root_pool(name in valid_name(), preserve in any::<bool>()) {
        let pools = teardown_pools(&name, preserve);
        prop_assert!(!pools.iter().any(|p| p == ROOT_POOL));
        prop_assert_eq!(pools.is_empty(), preserve);
        if !preserve {
            prop_assert!(pools.contains(&data_pool_name(&name)));
        }
    }

    /// Valid names with at least one valid port pass validation.
    #[test]
    fn test_valid_store_accepted(
        name in valid_name(),
        port in 1..65535i32,
        secure in proptest::option::of(1..65535i32),
    ) {
        prop_assume!(name.len() <= MAX_NAME_LENGTH);
        prop_assume!(secure != Some(port));
        prop_assert!(validate_store(&store(&name, port, secure)).is_ok());
    }

    /// Out-of-range ports are always rejected.
    #[test]
    fn test_invalid_port_rejected(name in valid_name(), port in 65536..200_000i32) {
        let err = validate_store(&store(&name, port, None)).unwrap_err();
        prop_assert!(err.is_validation());
    }

    /// The gateway Service exposes exactly the enabled ports.
    #[test]
    fn test_service_ports(
        name in valid_name(),
        port in 0..65535i32,
        secure in proptest::option::of(1..65535i32),
    ) {
        let service = generate_gateway_service(&store(&name, port, secure));
        let ports = service.spec.unwrap().ports.unwrap_or_default();
        let expected = usize::from(port > 0) + usize::from(secure.is_some());
        prop_assert_eq!(ports.len(), expected);
    }

    /// Adding or removing the finalizer twice writes once, and other
    /// finalizers are left alone.
    #[test]
    fn test_finalizer_idempotent(
        others in prop::collection::vec("[a-z]{1,8}\\.io/[a-z]{1,8}", 0..4),
        repeats in 1..4usize,
    ) {
        let writes = FinalizerWrites::default();
        let mut record = store("my-store", 80, None);
        record.metadata.finalizers = Some(others.clone());

        runtime().block_on(async {
            for _ in 0..repeats {
                ensure_finalizer(&writes, &mut record, FINALIZER).await.unwrap();
            }
        });
        prop_assert_eq!(writes.0.lock().unwrap().len(), 1);
        let finalizers = record.metadata.finalizers.clone().unwrap();
        prop_assert_eq!(finalizers.iter().filter(|f| *f == FINALIZER).count(), 1);

        runtime().block_on(async {
            for _ in 0..repeats {
                remove_finalizer(&writes, &mut record, FINALIZER).await.unwrap();
            }
        });
        prop_assert_eq!(writes.0.lock().unwrap().len(), 2);
        prop_assert_eq!(record.metadata.finalizers.clone().unwrap(), others);
    }

    /// Phases survive serialization.
    #[test]
    fn test_phase_roundtrip(phase in any_phase()) {
        let json = serde_json::to_string(&phase).unwrap();
        let deserialized: Phase = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(phase, deserialized);
    }
}
