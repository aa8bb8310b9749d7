//! Health and metrics endpoints.
//!
//! - `/healthz` answers as long as the process serves requests
//! - `/readyz` answers 200 once this replica leads and runs the controller
//! - `/metrics` exposes the reconcile metrics below in Prometheus text format
//!
//! | Metric | Labels |
//! |--------|--------|
//! | `objectstore_reconciliations_total` | namespace, name, outcome |
//! | `objectstore_reconcile_duration_seconds` | outcome |
//! | `objectstore_step_failures_total` | step |
//! | `objectstore_stores` | phase |
//! | `objectstore_cluster_not_ready_total` | namespace |

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tracing::{error, info};

use crate::controller::error::Error;
use crate::controller::interfaces::ObjectKey;
use crate::controller::reconciler::ReconcileOutcome;
use crate::crd::Phase;

/// Step label for errors raised outside any named step.
const UNNAMED_STEP: &str = "none";

/// How a reconciliation ended.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Outcome {
    /// Converged, waiting for the next change.
    Done,
    /// Deferred, usually by the readiness gate.
    Requeue,
    /// Returned an error.
    Failed,
}

impl Outcome {
    pub fn of(result: &Result<ReconcileOutcome, Error>) -> Self {
        match result {
            Ok(ReconcileOutcome::Done) => Outcome::Done,
            Ok(ReconcileOutcome::RequeueAfter(_)) => Outcome::Requeue,
            Err(_) => Outcome::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Done => "done",
            Outcome::Requeue => "requeue",
            Outcome::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct StoreOutcomeLabels {
    namespace: String,
    name: String,
    outcome: Outcome,
}

impl EncodeLabelSet for StoreOutcomeLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())
    }
}

/// A single label, e.g. `outcome="done"` or `phase="Ready"`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct SingleLabel {
    key: &'static str,
    value: String,
}

impl SingleLabel {
    fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

impl EncodeLabelSet for SingleLabel {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        (self.key, self.value.as_str()).encode(encoder.encode_label())
    }
}

/// Reconcile metrics of the operator.
pub struct Metrics {
    reconciliations: Family<StoreOutcomeLabels, Counter>,
    durations: Family<SingleLabel, Histogram>,
    step_failures: Family<SingleLabel, Counter>,
    stores: Family<SingleLabel, Gauge>,
    cluster_not_ready: Family<SingleLabel, Counter>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("objectstore");

        let reconciliations = Family::<StoreOutcomeLabels, Counter>::default();
        registry.register(
            "reconciliations",
            "Reconciliations by store and outcome",
            reconciliations.clone(),
        );

        // 5ms to ~80s: admin commands dominate slow reconciles
        let durations = Family::<SingleLabel, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.005, 2.0, 15))
        });
        registry.register(
            "reconcile_duration_seconds",
            "Reconcile duration by outcome",
            durations.clone(),
        );

        let step_failures = Family::<SingleLabel, Counter>::default();
        registry.register(
            "step_failures",
            "Failed reconciliations by the step that failed",
            step_failures.clone(),
        );

        let stores = Family::<SingleLabel, Gauge>::default();
        registry.register("stores", "Object stores by phase", stores.clone());

        let cluster_not_ready = Family::<SingleLabel, Counter>::default();
        registry.register(
            "cluster_not_ready",
            "Reconciliations deferred because the storage cluster was not ready",
            cluster_not_ready.clone(),
        );

        Self {
            reconciliations,
            durations,
            step_failures,
            stores,
            cluster_not_ready,
            registry,
        }
    }

    /// Record one finished reconciliation of `key`.
    pub fn observe_reconcile(&self, key: &ObjectKey, outcome: Outcome, elapsed: Duration) {
        self.reconciliations
            .get_or_create(&StoreOutcomeLabels {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
                outcome,
            })
            .inc();
        self.durations
            .get_or_create(&SingleLabel::new("outcome", outcome.as_str()))
            .observe(elapsed.as_secs_f64());
        if outcome == Outcome::Requeue {
            self.cluster_not_ready
                .get_or_create(&SingleLabel::new("namespace", key.namespace.as_str()))
                .inc();
        }
    }

    /// Count a failure against the step named in the error.
    pub fn record_failure(&self, error: &Error) {
        let step = error.step().unwrap_or(UNNAMED_STEP);
        self.step_failures
            .get_or_create(&SingleLabel::new("step", step))
            .inc();
    }

    /// Set the number of stores currently in `phase`.
    pub fn set_stores_in_phase(&self, phase: Phase, count: usize) {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        self.stores
            .get_or_create(&SingleLabel::new("phase", phase.to_string()))
            .set(count);
    }

    /// Render all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

/// State shared between the controller and the health server.
#[derive(Default)]
pub struct HealthState {
    ready: AtomicBool,
    pub metrics: Metrics,
}

impl HealthState {
    /// Starts not ready.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn readyz(State(state): State<Arc<HealthState>>) -> (StatusCode, &'static str) {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    const CONTENT_TYPE: (&str, &str) = ("content-type", "text/plain; version=0.0.4; charset=utf-8");
    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, [CONTENT_TYPE], body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, [CONTENT_TYPE], String::new())
        }
    }
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { (StatusCode::OK, "ok") }))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve health checks and metrics on `0.0.0.0:port` until the listener fails.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Serving health checks and metrics");
    axum::serve(listener, create_router(state)).await
}
