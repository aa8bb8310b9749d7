//! ObjectStore records stored as Kubernetes custom resources.

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::Value;
use tracing::debug;

use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::Result;
use crate::controller::interfaces::{ObjectKey, RecordStore};
use crate::crd::{ObjectStore, ObjectStoreStatus};

/// [`RecordStore`] backed by the ObjectStore API.
#[derive(Clone)]
pub struct KubeRecordStore {
    client: Client,
}

impl KubeRecordStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ObjectStore> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Merge patch body for a status write.
///
/// Fields that are unset in `status` are sent as `null` so the merge clears
/// them instead of keeping the stored value.
pub fn status_patch(status: &ObjectStoreStatus) -> Result<Value> {
    let mut value = serde_json::to_value(status)?;
    if let Some(fields) = value.as_object_mut() {
        for field in ["phase", "message", "observedGeneration"] {
            fields.entry(field).or_insert(Value::Null);
        }
    }
    Ok(serde_json::json!({ "status": value }))
}

/// Merge patch body replacing the finalizer list.
pub fn finalizers_patch(finalizers: &[String]) -> Value {
    if finalizers.is_empty() {
        serde_json::json!({ "metadata": { "finalizers": null } })
    } else {
        serde_json::json!({ "metadata": { "finalizers": finalizers } })
    }
}

#[async_trait]
impl RecordStore for KubeRecordStore {
    async fn read_record(&self, key: &ObjectKey) -> Result<Option<ObjectStore>> {
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn write_status(&self, key: &ObjectKey, status: &ObjectStoreStatus) -> Result<()> {
        let patch = status_patch(status)?;
        self.api(&key.namespace)
            .patch_status(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn write_finalizers(&self, key: &ObjectKey, finalizers: &[String]) -> Result<()> {
        let patch = finalizers_patch(finalizers);
        match self
            .api(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 && finalizers.is_empty() => {
                // Resource already deleted, nothing to do
                debug!(key = %key, "Record already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
