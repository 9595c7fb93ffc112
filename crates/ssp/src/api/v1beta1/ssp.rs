use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Affinity, Toleration};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::api::v1beta1::{conditions_schema, preserve_unknown_array_schema, preserve_unknown_object_schema};

pub static SSP_FINALIZER: &str = "finalize.ssp.kubevirt.io";

/// Generate the Kubernetes wrapper struct `Ssp` from our Spec and Status struct
///
/// This provides a hook for generating the CRD yaml (in crdgen)
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "SSP",
    root = "Ssp",
    group = "ssp.kubevirt.io",
    version = "v1beta1",
    namespaced
)]
#[kube(status = "SspStatus", shortname = "ssp")]
#[serde(rename_all = "camelCase")]
pub struct SspSpec {
    #[serde(default)]
    pub template_validator: TemplateValidator,
    pub common_templates: CommonTemplates,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateValidator {
    /// Number of template validator pods
    #[serde(default = "default_validator_replicas")]
    pub replicas: Option<i32>,
    /// Scheduling constraints copied into the template validator pods
    pub placement: Option<NodePlacement>,
}

impl Default for TemplateValidator {
    fn default() -> Self {
        Self {
            replicas: default_validator_replicas(),
            placement: None,
        }
    }
}

fn default_validator_replicas() -> Option<i32> {
    Some(2)
}

impl TemplateValidator {
    pub fn replicas(&self) -> i32 {
        self.replicas.unwrap_or(2)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonTemplates {
    /// Namespace the common templates are deployed to
    pub namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodePlacement {
    pub node_selector: Option<BTreeMap<String, String>>,
    #[schemars(schema_with = "preserve_unknown_object_schema")]
    pub affinity: Option<Affinity>,
    #[schemars(schema_with = "preserve_unknown_array_schema")]
    pub tolerations: Option<Vec<Toleration>>,
}

/// The status object of `Ssp`
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SspStatus {
    #[serde(default)]
    #[schemars(schema_with = "conditions_schema")]
    pub conditions: Vec<Condition>,
    pub phase: Option<String>,
    pub observed_generation: Option<i64>,
    pub operator_version: Option<String>,
    pub target_version: Option<String>,
    pub observed_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn crd_is_namespaced_with_status() {
        let crd = Ssp::crd();
        assert_eq!(crd.spec.group, "ssp.kubevirt.io");
        assert_eq!(crd.spec.names.kind, "SSP");
        assert_eq!(crd.spec.scope, "Namespaced");
        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1beta1");
        assert!(version.subresources.as_ref().unwrap().status.is_some());
    }

    #[test]
    fn replicas_default_to_two() {
        let spec: SspSpec = serde_json::from_value(serde_json::json!({
            "commonTemplates": { "namespace": "kubevirt-templates" }
        }))
        .unwrap();
        assert_eq!(spec.template_validator.replicas(), 2);
        assert_eq!(spec.common_templates.namespace, "kubevirt-templates");
    }
}
