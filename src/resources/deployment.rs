//! Deployment generation for object store gateways.
//!
//! The gateway is stateless: every pod serves the same realm, zone group and
//! zone, so a Deployment with `instances` replicas is enough.
//! - Beast frontend on the plain and/or secure port
//! - TLS certificate mounted from the referenced Secret
//! - Logs written to the cluster's host log directory when one is configured

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, HostPathVolumeSource, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, SecretVolumeSource, TCPSocketAction, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::controller::provisioning::DataPathMap;
use crate::crd::ObjectStore;
use crate::resources::common::{
    gateway_name, owner_reference, pod_selector_labels, standard_annotations, standard_labels,
};
use crate::resources::services::{HTTP_PORT_NAME, HTTPS_PORT_NAME};

/// Directory the TLS Secret is mounted at
pub const SSL_CERT_DIR: &str = "/etc/ceph/private";
/// Key of the certificate inside the TLS Secret
pub const SSL_CERT_KEY: &str = "cert";

const DATA_VOLUME: &str = "rgw-data";
const LOG_VOLUME: &str = "rgw-log";
const SSL_VOLUME: &str = "rgw-ssl";

/// Inputs that come from the parent cluster rather than the ObjectStore.
#[derive(Clone, Copy, Debug)]
pub struct GatewayRuntime<'a> {
    pub image: &'a str,
    pub fsid: &'a str,
    pub paths: &'a DataPathMap,
}

/// Generate the gateway Deployment for an ObjectStore.
pub fn generate_gateway_deployment(resource: &ObjectStore, runtime: GatewayRuntime<'_>) -> Deployment {
    let labels = standard_labels(resource);
    let annotations = standard_annotations(resource);
    let annotations = if annotations.is_empty() {
        None
    } else {
        Some(annotations)
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(gateway_name(resource)),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            annotations: annotations.clone(),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(resource.spec.gateway.instances),
            selector: LabelSelector {
                match_labels: Some(pod_selector_labels(resource)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations,
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![generate_gateway_container(resource, runtime)],
                    volumes: Some(generate_volumes(resource, runtime.paths)),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn generate_gateway_container(resource: &ObjectStore, runtime: GatewayRuntime<'_>) -> Container {
    let ports = container_ports(resource);
    let probe_port = ports
        .first()
        .and_then(|p| p.name.clone())
        .unwrap_or_else(|| HTTP_PORT_NAME.to_string());

    Container {
        name: "rgw".to_string(),
        image: Some(runtime.image.to_string()),
        command: Some(vec!["radosgw".to_string()]),
        args: Some(gateway_args(resource, runtime)),
        ports: Some(ports),
        resources: generate_resource_requirements(resource),
        volume_mounts: Some(generate_volume_mounts(resource, runtime.paths)),
        readiness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::String(probe_port.clone()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(10),
            period_seconds: Some(10),
            ..Default::default()
        }),
        liveness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::String(probe_port),
                ..Default::default()
            }),
            initial_delay_seconds: Some(30),
            period_seconds: Some(10),
            failure_threshold: Some(6),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Command line arguments for the gateway daemon.
pub fn gateway_args(resource: &ObjectStore, runtime: GatewayRuntime<'_>) -> Vec<String> {
    let name = resource.name_any();
    vec![
        "--foreground".to_string(),
        format!("--fsid={}", runtime.fsid),
        format!("--id=rgw.{}", name),
        format!("--rgw-realm={}", name),
        format!("--rgw-zonegroup={}", name),
        format!("--rgw-zone={}", name),
        format!("--rgw-frontends={}", frontend_config(resource)),
        format!("--rgw-data={}", runtime.paths.container_data_dir),
        format!(
            "--log-file={}/ceph-client.rgw.{}.log",
            runtime.paths.container_log_dir, name
        ),
    ]
}

/// Beast frontend settings for the configured ports.
pub fn frontend_config(resource: &ObjectStore) -> String {
    let gateway = &resource.spec.gateway;
    let mut parts = vec!["beast".to_string()];
    if gateway.port > 0 {
        parts.push(format!("port={}", gateway.port));
    }
    if let Some(secure_port) = gateway.secure_port.filter(|p| *p > 0) {
        parts.push(format!("ssl_port={}", secure_port));
        parts.push(format!("ssl_certificate={}/{}", SSL_CERT_DIR, SSL_CERT_KEY));
    }
    parts.join(" ")
}

fn container_ports(resource: &ObjectStore) -> Vec<ContainerPort> {
    let gateway = &resource.spec.gateway;
    let mut ports = Vec::new();
    if gateway.port > 0 {
        ports.push(ContainerPort {
            container_port: gateway.port,
            name: Some(HTTP_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        });
    }
    if let Some(secure_port) = gateway.secure_port.filter(|p| *p > 0) {
        ports.push(ContainerPort {
            container_port: secure_port,
            name: Some(HTTPS_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        });
    }
    ports
}

fn generate_resource_requirements(resource: &ObjectStore) -> Option<ResourceRequirements> {
    let spec = &resource.spec.gateway.resources;
    if spec.requests.is_empty() && spec.limits.is_empty() {
        return None;
    }

    let to_quantities = |values: &BTreeMap<String, String>| {
        if values.is_empty() {
            None
        } else {
            Some(
                values
                    .iter()
                    .map(|(k, v)| (k.clone(), Quantity(v.clone())))
                    .collect::<BTreeMap<_, _>>(),
            )
        }
    };

    Some(ResourceRequirements {
        requests: to_quantities(&spec.requests),
        limits: to_quantities(&spec.limits),
        ..Default::default()
    })
}

fn generate_volumes(resource: &ObjectStore, paths: &DataPathMap) -> Vec<Volume> {
    let mut volumes = vec![
        // Stateless daemon, data never leaves the pod
        Volume {
            name: DATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
        match &paths.host_log_dir {
            Some(host_log_dir) => Volume {
                name: LOG_VOLUME.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: host_log_dir.clone(),
                    type_: Some("DirectoryOrCreate".to_string()),
                }),
                ..Default::default()
            },
            None => Volume {
                name: LOG_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
        },
    ];

    if let Some(secret_name) = tls_secret(resource) {
        volumes.push(Volume {
            name: SSL_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret_name.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    volumes
}

fn generate_volume_mounts(resource: &ObjectStore, paths: &DataPathMap) -> Vec<VolumeMount> {
    let mut mounts = vec![
        VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: paths.container_data_dir.clone(),
            ..Default::default()
        },
        VolumeMount {
            name: LOG_VOLUME.to_string(),
            mount_path: paths.container_log_dir.clone(),
            ..Default::default()
        },
    ];

    if tls_secret(resource).is_some() {
        mounts.push(VolumeMount {
            name: SSL_VOLUME.to_string(),
            mount_path: SSL_CERT_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    mounts
}

/// The TLS Secret to mount, if the secure port is enabled.
fn tls_secret(resource: &ObjectStore) -> Option<&str> {
    let gateway = &resource.spec.gateway;
    gateway
        .secure_port
        .filter(|p| *p > 0)
        .and(gateway.ssl_certificate_ref.as_deref())
        .filter(|s| !s.is_empty())
}
