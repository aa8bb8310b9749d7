//! Provisioning of object store sub-resources on a live cluster.
//!
//! | Sub-resource | Managed through |
//! |--------------|-----------------|
//! | Service | server-side apply |
//! | Pools | [`StorageAdmin`] |
//! | Realm, zone group, zone | [`StorageAdmin`] |
//! | Deployment | server-side apply |
//!
//! Server-side apply makes every write idempotent: applying an unchanged
//! object is a no-op on the API server.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::backend::admin::{RealmConfig, StorageAdmin};
use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::{Error, Result};
use crate::controller::interfaces::Provisioner;
use crate::controller::provisioning::{
    GatewayEndpoint, ProvisioningContext, data_pool_name, metadata_pool_names, teardown_pools,
};
use crate::resources::common::gateway_name;
use crate::resources::deployment::{GatewayRuntime, generate_gateway_deployment};
use crate::resources::services::generate_gateway_service;

/// [`Provisioner`] that owns Kubernetes objects and drives the admin tools.
pub struct KubeProvisioner {
    client: Client,
    admin: Arc<dyn StorageAdmin>,
}

impl KubeProvisioner {
    pub fn new(client: Client, admin: Arc<dyn StorageAdmin>) -> Self {
        Self { client, admin }
    }
}

/// Endpoint for a Service address: the plain port when enabled, else the secure one.
pub fn endpoint_for(ctx: &ProvisioningContext, address: String) -> GatewayEndpoint {
    let gateway = &ctx.record.spec.gateway;
    if gateway.port > 0 {
        GatewayEndpoint {
            address,
            port: gateway.port,
            secure: false,
        }
    } else {
        GatewayEndpoint {
            address,
            port: gateway.secure_port.unwrap_or_default(),
            secure: true,
        }
    }
}

/// Refuse to roll a new image onto a gateway whose previous rollout has not
/// finished. A gateway already running `image` always passes.
pub fn check_rollout_settled(existing: &Deployment, image: &str) -> Result<()> {
    let name = existing.metadata.name.as_deref().unwrap_or_default();
    let spec = existing.spec.as_ref();
    let current_image = spec
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
        .and_then(|c| c.image.as_deref());
    if current_image == Some(image) {
        return Ok(());
    }

    let desired = spec.and_then(|s| s.replicas).unwrap_or(1);
    let status = existing.status.clone().unwrap_or_default();
    let updated = status.updated_replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);
    let observed = status.observed_generation.unwrap_or(0);
    let generation = existing.metadata.generation.unwrap_or(0);

    if observed < generation || updated < desired || available < desired {
        return Err(Error::Provisioning(format!(
            "gateway {:?} is still rolling out ({}/{} updated, {}/{} available), not upgrading to {:?}",
            name, updated, desired, available, desired, image
        )));
    }
    Ok(())
}

/// Delete an object, treating "not found" as already deleted.
async fn delete_ignoring_missing<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: kube::Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => {
            debug!(name = %name, "Deleted");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Provisioner for KubeProvisioner {
    async fn reconcile_endpoint(&self, ctx: &ProvisioningContext) -> Result<GatewayEndpoint> {
        let service = generate_gateway_service(&ctx.record);
        let name = gateway_name(&ctx.record);
        let api: Api<Service> = Api::namespaced(self.client.clone(), &ctx.key.namespace);

        let applied = api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&service),
            )
            .await?;

        let address = applied
            .spec
            .and_then(|s| s.cluster_ip)
            .filter(|ip| !ip.is_empty() && ip != "None")
            .ok_or_else(|| {
                Error::Provisioning(format!("service {:?} has no cluster IP yet", name))
            })?;

        Ok(endpoint_for(ctx, address))
    }

    async fn reconcile_pools(&self, ctx: &ProvisioningContext) -> Result<()> {
        let namespace = &ctx.key.namespace;
        let spec = &ctx.record.spec;

        for pool in metadata_pool_names(&ctx.key.name) {
            self.admin
                .ensure_pool(namespace, &pool, &spec.metadata_pool)
                .await?;
        }
        self.admin
            .ensure_pool(namespace, &data_pool_name(&ctx.key.name), &spec.data_pool)
            .await
    }

    async fn reconcile_realm(
        &self,
        ctx: &ProvisioningContext,
        endpoint: &GatewayEndpoint,
    ) -> Result<()> {
        let realm = RealmConfig {
            name: ctx.key.name.clone(),
            endpoint: endpoint.url(),
        };
        self.admin.ensure_realm(&ctx.key.namespace, &realm).await?;
        Ok(())
    }

    async fn reconcile_workload(&self, ctx: &ProvisioningContext) -> Result<()> {
        let deployment = generate_gateway_deployment(
            &ctx.record,
            GatewayRuntime {
                image: ctx.gateway_image(),
                fsid: &ctx.cluster_info.fsid,
                paths: &ctx.data_path_map,
            },
        );
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &ctx.key.namespace);
        let name = gateway_name(&ctx.record);

        if ctx.cluster_spec.skip_upgrade_checks {
            debug!(store = %ctx.key, "Skipping upgrade checks");
        } else if let Some(existing) = api.get_opt(&name).await? {
            check_rollout_settled(&existing, ctx.gateway_image())?;
        }

        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&deployment),
        )
        .await?;
        Ok(())
    }

    async fn delete_all_sub_resources(&self, ctx: &ProvisioningContext) -> Result<()> {
        let namespace = &ctx.key.namespace;
        let name = gateway_name(&ctx.record);

        // Stop the gateway before pulling its configuration away
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        delete_ignoring_missing(&deployments, &name).await?;
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        delete_ignoring_missing(&services, &name).await?;

        self.admin.delete_realm(namespace, &ctx.key.name).await?;

        let preserve = ctx.record.spec.preserve_pools_on_delete;
        if preserve {
            info!(store = %ctx.key, "Preserving pools");
        }
        for pool in teardown_pools(&ctx.key.name, preserve) {
            self.admin.delete_pool(namespace, &pool).await?;
        }
        Ok(())
    }
}
