//! Shared context for the controller.
//!
//! The Context struct holds shared state that is passed to the reconciler,
//! including the Kubernetes client, the event recorder and the reconciliation
//! core wired to its Kubernetes backends.

use std::sync::Arc;

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::runtime::reflector::Store;
use kube::{Client, Resource};

use crate::backend::{
    CliStorageAdmin, KubeClusterQuery, KubeProvisioner, KubeRecordStore, ProcessExecutor,
};
use crate::config::OperatorConfig;
use crate::controller::reconciler::Reconciler;
use crate::crd::{ObjectStore, Phase};
use crate::health::HealthState;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "objectstore-operator";

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Event reporter identity
    reporter: Reporter,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
    pub config: OperatorConfig,
    /// Reconciliation core
    pub reconciler: Reconciler,
    /// Cache of watched ObjectStores, used for per-phase metrics
    store: Option<Store<ObjectStore>>,
}

impl Context {
    /// Create a context with the Kubernetes-backed reconciler.
    pub fn new(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        let admin = Arc::new(CliStorageAdmin::new(
            config.admin_config(),
            Arc::new(ProcessExecutor),
        ));
        let reconciler = Reconciler::new(
            Arc::new(KubeRecordStore::new(client.clone())),
            Arc::new(KubeClusterQuery::new(client.clone())),
            Arc::new(KubeProvisioner::new(client.clone(), admin)),
            config.reconciler_settings(),
        );
        Self::with_reconciler(client, config, health_state, reconciler)
    }

    /// Create a context around an already wired reconciler.
    pub fn with_reconciler(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: config.pod_name.clone(),
            },
            client,
            health_state,
            config,
            reconciler,
            store: None,
        }
    }

    /// Attach the reflector cache of watched ObjectStores.
    pub fn with_store(mut self, store: Store<ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Refresh the per-phase resource gauges from the cache.
    pub fn update_phase_metrics(&self) {
        let (Some(health_state), Some(store)) = (&self.health_state, &self.store) else {
            return;
        };

        let stores = store.state();
        for phase in [Phase::Created, Phase::Ready, Phase::ReconcileFailed] {
            let count = stores
                .iter()
                .filter(|s| s.status.as_ref().and_then(|st| st.phase) == Some(phase))
                .count();
            health_state.metrics.set_stores_in_phase(phase, count);
        }
    }

    /// Create an event recorder for publishing Kubernetes events
    fn recorder(&self) -> Recorder {
        Recorder::new(self.client.clone(), self.reporter.clone())
    }

    /// Publish a warning event for a resource
    pub async fn publish_warning_event(
        &self,
        resource: &ObjectStore,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = self.recorder();
        let object_ref = resource.object_ref(&());
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_: EventType::Warning,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish warning event");
        }
    }
}
