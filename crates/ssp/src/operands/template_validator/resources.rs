use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        admissionregistration::v1::{
            RuleWithOperations, ServiceReference, ValidatingWebhook, ValidatingWebhookConfiguration,
            WebhookClientConfig,
        },
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Container, ContainerPort, HTTPGetAction, PodAffinityTerm, PodAntiAffinity, PodSpec,
            PodTemplateSpec, Probe, SecretVolumeSource, Service, ServiceAccount, ServicePort, ServiceSpec,
            Volume, VolumeMount, WeightedPodAffinityTerm,
        },
        rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject},
    },
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, ObjectMeta},
        util::intstr::IntOrString,
    },
};

use crate::{api::v1beta1::ssp::NodePlacement, common::common_labels};

pub const CLUSTER_ROLE_NAME: &str = "template-validator";
pub const CLUSTER_ROLE_BINDING_NAME: &str = "template-validator";
pub const SERVICE_ACCOUNT_NAME: &str = "template-validator";
pub const SERVICE_NAME: &str = "virt-template-validator";
pub const DEPLOYMENT_NAME: &str = "virt-template-validator";
pub const WEBHOOK_CONFIG_NAME: &str = "virt-template-validator";
pub const CERT_SECRET_NAME: &str = "virt-template-validator-certs";
pub const WEBHOOK_NAME: &str = "virtualmachine-admission.ssp.kubevirt.io";
pub const WEBHOOK_PATH: &str = "/virtualmachine-admission";

pub const KUBEVIRT_LABEL: &str = "kubevirt.io";
pub const COMPONENT: &str = "template-validator";
pub const CONTAINER_PORT: i32 = 8443;
pub const CERT_MOUNT_PATH: &str = "/etc/webhook/certs";

const SERVING_CERT_ANNOTATION: &str = "service.beta.openshift.io/serving-cert-secret-name";
const INJECT_CA_ANNOTATION: &str = "service.beta.openshift.io/inject-cabundle";

fn labels(name: &str) -> BTreeMap<String, String> {
    common_labels(name, COMPONENT)
}

fn pod_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(KUBEVIRT_LABEL.to_string(), DEPLOYMENT_NAME.to_string())])
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn new_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(CLUSTER_ROLE_NAME.to_string()),
            labels: Some(labels(CLUSTER_ROLE_NAME)),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(strings(&["template.openshift.io"])),
                resources: Some(strings(&["templates"])),
                verbs: strings(&["get", "list", "watch"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(strings(&["kubevirt.io"])),
                resources: Some(strings(&["virtualmachines"])),
                verbs: strings(&["get", "list", "watch"]),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

pub fn new_service_account(namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(SERVICE_ACCOUNT_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(SERVICE_ACCOUNT_NAME)),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn new_cluster_role_binding(namespace: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(CLUSTER_ROLE_BINDING_NAME.to_string()),
            labels: Some(labels(CLUSTER_ROLE_BINDING_NAME)),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: CLUSTER_ROLE_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: SERVICE_ACCOUNT_NAME.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

pub fn new_service(namespace: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(SERVICE_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(SERVICE_NAME)),
            annotations: Some(BTreeMap::from([(
                SERVING_CERT_ANNOTATION.to_string(),
                CERT_SECRET_NAME.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(pod_labels()),
            ports: Some(vec![ServicePort {
                name: Some("webhook".to_string()),
                port: 443,
                target_port: Some(IntOrString::Int(CONTAINER_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn new_deployment(
    namespace: &str,
    replicas: i32,
    image: &str,
    placement: Option<&NodePlacement>,
) -> Deployment {
    let mut template_labels = labels(DEPLOYMENT_NAME);
    template_labels.extend(pod_labels());

    // spread validator pods over nodes when possible
    let anti_affinity = PodAntiAffinity {
        preferred_during_scheduling_ignored_during_execution: Some(vec![WeightedPodAffinityTerm {
            weight: 1,
            pod_affinity_term: PodAffinityTerm {
                label_selector: Some(LabelSelector {
                    match_labels: Some(pod_labels()),
                    ..Default::default()
                }),
                topology_key: "kubernetes.io/hostname".to_string(),
                ..Default::default()
            },
        }]),
        ..Default::default()
    };

    let mut affinity = placement
        .and_then(|p| p.affinity.clone())
        .unwrap_or_default();
    if affinity.pod_anti_affinity.is_none() {
        affinity.pod_anti_affinity = Some(anti_affinity);
    }

    Deployment {
        metadata: ObjectMeta {
            name: Some(DEPLOYMENT_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(DEPLOYMENT_NAME)),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(pod_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(DEPLOYMENT_NAME.to_string()),
                    labels: Some(template_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(SERVICE_ACCOUNT_NAME.to_string()),
                    containers: vec![Container {
                        name: "webhook".to_string(),
                        image: Some(image.to_string()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        args: Some(vec![
                            format!("--port={CONTAINER_PORT}"),
                            format!("--cert-dir={CERT_MOUNT_PATH}"),
                            "-v=2".to_string(),
                        ]),
                        ports: Some(vec![ContainerPort {
                            name: Some("webhook".to_string()),
                            container_port: CONTAINER_PORT,
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        readiness_probe: Some(Probe {
                            http_get: Some(HTTPGetAction {
                                path: Some("/readyz".to_string()),
                                port: IntOrString::Int(CONTAINER_PORT),
                                scheme: Some("HTTPS".to_string()),
                                ..Default::default()
                            }),
                            initial_delay_seconds: Some(15),
                            timeout_seconds: Some(10),
                            ..Default::default()
                        }),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "tls".to_string(),
                            mount_path: CERT_MOUNT_PATH.to_string(),
                            read_only: Some(true),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: "tls".to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(CERT_SECRET_NAME.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    node_selector: placement.and_then(|p| p.node_selector.clone()),
                    tolerations: placement.and_then(|p| p.tolerations.clone()),
                    affinity: Some(affinity),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

pub fn new_validating_webhook(namespace: &str) -> ValidatingWebhookConfiguration {
    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(WEBHOOK_CONFIG_NAME.to_string()),
            labels: Some(labels(WEBHOOK_CONFIG_NAME)),
            annotations: Some(BTreeMap::from([(
                INJECT_CA_ANNOTATION.to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        },
        webhooks: Some(vec![ValidatingWebhook {
            name: WEBHOOK_NAME.to_string(),
            admission_review_versions: strings(&["v1", "v1beta1"]),
            client_config: WebhookClientConfig {
                service: Some(ServiceReference {
                    name: SERVICE_NAME.to_string(),
                    namespace: namespace.to_string(),
                    path: Some(WEBHOOK_PATH.to_string()),
                    port: Some(443),
                }),
                ..Default::default()
            },
            failure_policy: Some("Fail".to_string()),
            side_effects: "None".to_string(),
            rules: Some(vec![RuleWithOperations {
                api_groups: Some(strings(&["kubevirt.io"])),
                api_versions: Some(strings(&["v1alpha3", "v1"])),
                operations: Some(strings(&["CREATE", "UPDATE"])),
                resources: Some(strings(&["virtualmachines"])),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
    }
}
