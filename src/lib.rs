//! objectstore-operator library crate
//!
//! This module exports the controller, CRD definitions, Kubernetes backends
//! and resource generators.

pub mod backend;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use config::OperatorConfig;
pub use health::HealthState;

use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, metadata_watcher, predicates, reflector, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use controller::{context::Context, reconciler::reconcile};
use crd::ObjectStore;

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration.
///
/// `any_semantic()` gives more reliable resource discovery in test environments.
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Create a filtered stream for a resource type with standard optimizations.
///
/// This creates a reflector-backed stream that:
/// - Maintains an in-memory cache via reflector
/// - Uses automatic retry with exponential backoff on errors
/// - Converts watch events to objects (Added/Modified only)
/// - Filters out status-only updates via generation predicate
///
/// Returns the reflector store (for cache lookups) and the filtered stream.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (reader, stream)
}

/// Stores in `namespace` that serve TLS from the Secret `secret`.
///
/// The certificate Secrets belong to the user, so they are watched and
/// mapped back to the stores that reference them rather than owned.
pub fn stores_for_secret(
    stores: &[Arc<ObjectStore>],
    namespace: &str,
    secret: &str,
) -> Vec<ObjectRef<ObjectStore>> {
    stores
        .iter()
        .filter(|store| store.namespace().as_deref() == Some(namespace))
        .filter(|store| store.spec.gateway.ssl_certificate_ref.as_deref() == Some(secret))
        .map(|store| ObjectRef::from_obj(store.as_ref()))
        .collect()
}

/// Run the ObjectStore controller.
///
/// Watches ObjectStore resources in `config.watch_namespace` (or cluster-wide
/// when unset) along with the Services and Deployments they own and the
/// certificate Secrets they reference. The
/// kube-rs controller never runs two reconciliations of the same object at
/// once; different objects are reconciled concurrently.
///
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.clone();
    let namespace = namespace.as_deref();
    info!(
        "Starting controller for ObjectStore resources (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true);
    }

    let objectstores: Api<ObjectStore> = scoped_api(client.clone(), namespace);
    let deployments: Api<Deployment> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);
    let secrets: Api<Secret> = scoped_api(client.clone(), namespace);

    let watcher_config = default_watcher_config();
    let (reader, resource_stream) = create_filtered_stream(objectstores, watcher_config.clone());

    let ctx = Arc::new(
        Context::new(client.clone(), config, health_state).with_store(reader.clone()),
    );

    // Services and Secrets only need to trigger a reconcile, metadata is enough
    let secret_reader = reader.clone();
    Controller::for_stream(resource_stream, reader)
        .owns(deployments, watcher_config.clone())
        .owns_stream(metadata_watcher(services, watcher_config.clone()).touched_objects())
        .watches_stream(
            metadata_watcher(secrets, watcher_config).touched_objects(),
            move |secret| {
                let namespace = secret.namespace().unwrap_or_default();
                stores_for_secret(&secret_reader.state(), &namespace, &secret.name_any())
            },
        )
        .run(reconcile, controller::reconciler::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // ObjectNotFound/NotFound errors are expected after deletion when
                    // related watch events trigger reconciliation for a deleted object.
                    let is_not_found = match &e {
                        kube::runtime::controller::Error::ObjectNotFound(_) => true,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) => {
                            err.is_not_found()
                        }
                        _ => false,
                    };
                    if is_not_found {
                        debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    error!("Controller stream ended unexpectedly");
}
