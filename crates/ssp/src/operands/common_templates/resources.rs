use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        core::v1::Namespace,
        rbac::v1::{ClusterRole, PolicyRule, Role, RoleBinding, RoleRef, Subject},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

use crate::common::common_labels;

pub const GOLDEN_IMAGES_NAMESPACE: &str = "kubevirt-os-images";
pub const VIEW_ROLE_NAME: &str = "os-images.kubevirt.io:view";
pub const EDIT_CLUSTER_ROLE_NAME: &str = "os-images.kubevirt.io:edit";
pub const COMPONENT: &str = "templating";

const AUTHENTICATED_GROUP: &str = "system:authenticated";
const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

fn labels(name: &str) -> BTreeMap<String, String> {
    common_labels(name, COMPONENT)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn view_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            api_groups: Some(strings(&["cdi.kubevirt.io"])),
            resources: Some(strings(&["datavolumes"])),
            verbs: strings(&["get", "list", "watch"]),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(strings(&["cdi.kubevirt.io"])),
            resources: Some(strings(&["datavolumes/source"])),
            verbs: strings(&["create"]),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(strings(&[""])),
            resources: Some(strings(&["persistentvolumeclaims"])),
            verbs: strings(&["get", "list", "watch"]),
            ..Default::default()
        },
    ]
}

pub fn new_golden_images_namespace() -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(GOLDEN_IMAGES_NAMESPACE.to_string()),
            labels: Some(labels(GOLDEN_IMAGES_NAMESPACE)),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn new_view_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(VIEW_ROLE_NAME.to_string()),
            labels: Some(labels(VIEW_ROLE_NAME)),
            ..Default::default()
        },
        rules: Some(view_rules()),
        ..Default::default()
    }
}

/// Read access for every authenticated user, limited to the golden images namespace.
pub fn new_view_role() -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(VIEW_ROLE_NAME.to_string()),
            namespace: Some(GOLDEN_IMAGES_NAMESPACE.to_string()),
            labels: Some(labels(VIEW_ROLE_NAME)),
            ..Default::default()
        },
        rules: Some(view_rules()),
    }
}

pub fn new_view_role_binding() -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(VIEW_ROLE_NAME.to_string()),
            namespace: Some(GOLDEN_IMAGES_NAMESPACE.to_string()),
            labels: Some(labels(VIEW_ROLE_NAME)),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: VIEW_ROLE_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            api_group: Some(RBAC_GROUP.to_string()),
            kind: "Group".to_string(),
            name: AUTHENTICATED_GROUP.to_string(),
            ..Default::default()
        }]),
    }
}

pub fn new_edit_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(EDIT_CLUSTER_ROLE_NAME.to_string()),
            labels: Some(labels(EDIT_CLUSTER_ROLE_NAME)),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(strings(&["cdi.kubevirt.io"])),
                resources: Some(strings(&["datavolumes"])),
                verbs: strings(&["get", "list", "watch", "create", "update", "patch", "delete"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(strings(&["cdi.kubevirt.io"])),
                resources: Some(strings(&["datavolumes/source"])),
                verbs: strings(&["create"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(strings(&[""])),
                resources: Some(strings(&["persistentvolumeclaims"])),
                verbs: strings(&["get", "list", "watch", "create", "update", "patch", "delete"]),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}
