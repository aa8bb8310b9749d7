//! Service generation for object store gateways.
//!
//! A single ClusterIP Service gives the gateway a stable address. The address
//! is what the realm advertises as the zone endpoint.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::ObjectStore;
use crate::resources::common::{
    gateway_name, owner_reference, pod_selector_labels, standard_annotations, standard_labels,
};

/// Name of the plain HTTP port
pub const HTTP_PORT_NAME: &str = "http";
/// Name of the HTTPS port
pub const HTTPS_PORT_NAME: &str = "https";

/// Generate the gateway Service.
///
/// Exposes the plain port when it is non-zero and the secure port when set.
pub fn generate_gateway_service(resource: &ObjectStore) -> Service {
    let annotations = standard_annotations(resource);

    Service {
        metadata: ObjectMeta {
            name: Some(gateway_name(resource)),
            namespace: resource.namespace(),
            labels: Some(standard_labels(resource)),
            annotations: if annotations.is_empty() {
                None
            } else {
                Some(annotations)
            },
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(pod_selector_labels(resource)),
            ports: Some(service_ports(resource)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_ports(resource: &ObjectStore) -> Vec<ServicePort> {
    let gateway = &resource.spec.gateway;
    let mut ports = Vec::new();

    if gateway.port > 0 {
        ports.push(ServicePort {
            port: gateway.port,
            target_port: Some(IntOrString::String(HTTP_PORT_NAME.to_string())),
            name: Some(HTTP_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        });
    }

    if let Some(secure_port) = gateway.secure_port.filter(|p| *p > 0) {
        ports.push(ServicePort {
            port: secure_port,
            target_port: Some(IntOrString::String(HTTPS_PORT_NAME.to_string())),
            name: Some(HTTPS_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        });
    }

    ports
}
