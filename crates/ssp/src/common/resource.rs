//! Generic create-or-update and delete of operand resources.

use std::fmt::Debug;

use k8s_openapi::api::{
    admissionregistration::v1::ValidatingWebhookConfiguration,
    apps::v1::Deployment,
    core::v1::{Namespace, ObjectReference, Service, ServiceAccount},
    rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, DeleteParams, DynamicObject, PostParams},
    Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::{
    common::{
        request::Request,
        resource_status::{deployment_status, ResourceStatus},
    },
    util::errors::{Error, Result, StdError},
};

pub const OWNER_ANNOTATION: &str = "ssp.kubevirt.io/primary-resource";
pub const OWNER_TYPE_ANNOTATION: &str = "ssp.kubevirt.io/primary-resource-type";
pub const OWNER_TYPE: &str = "SSP.ssp.kubevirt.io";

/// How a resource is tied to the SSP that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Controller owner reference; garbage collected with the SSP.
    Owned,
    /// Owner annotations only; removed by the operand's cleanup.
    Cluster,
}

/// A resource kind the operator manages.
///
/// Kinds override `preserve_fields` when parts of the live object are written
/// by someone else, and `resource_status` when they report runtime health.
pub trait ManagedResource:
    Resource + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Copies fields owned by the platform or other controllers from the live
    /// object onto the desired one.
    fn preserve_fields(&mut self, _existing: &Self) {}

    fn resource_status(&self, resource: ObjectReference) -> ResourceStatus {
        ResourceStatus::healthy(resource)
    }
}

impl ManagedResource for ClusterRole {}
impl ManagedResource for ClusterRoleBinding {}
impl ManagedResource for Role {}
impl ManagedResource for RoleBinding {}
impl ManagedResource for ServiceAccount {}
impl ManagedResource for Namespace {}
impl ManagedResource for DynamicObject {}

impl ManagedResource for Service {
    fn preserve_fields(&mut self, existing: &Self) {
        let Some(found) = existing.spec.as_ref() else {
            return;
        };
        let spec = self.spec.get_or_insert_with(Default::default);
        // assigned by the platform on creation and immutable afterwards
        spec.cluster_ip = found.cluster_ip.clone();
        spec.cluster_ips = found.cluster_ips.clone();
    }
}

impl ManagedResource for ValidatingWebhookConfiguration {
    fn preserve_fields(&mut self, existing: &Self) {
        let (Some(webhooks), Some(found_webhooks)) = (self.webhooks.as_mut(), existing.webhooks.as_ref())
        else {
            return;
        };

        for webhook in webhooks.iter_mut() {
            let Some(found) = found_webhooks.iter().find(|found| found.name == webhook.name) else {
                continue;
            };
            if webhook.client_config.ca_bundle.is_none() && found.client_config.ca_bundle.is_some() {
                webhook.client_config.ca_bundle = found.client_config.ca_bundle.clone();
            }
        }
    }
}

impl ManagedResource for Deployment {
    fn resource_status(&self, resource: ObjectReference) -> ResourceStatus {
        deployment_status(self, resource)
    }
}

/// Statuses and errors collected by one operand during a pass.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub statuses: Vec<ResourceStatus>,
    pub errors: Vec<Error>,
}

impl ReconcileOutcome {
    pub fn record(&mut self, result: Result<ResourceStatus>) {
        match result {
            Ok(status) => self.statuses.push(status),
            Err(e) => self.errors.push(e),
        }
    }

    pub fn extend(&mut self, other: ReconcileOutcome) {
        self.statuses.extend(other.statuses);
        self.errors.extend(other.errors);
    }
}

fn resource_name<K: Resource>(obj: &K, dt: &K::DynamicType) -> Result<String> {
    obj.meta().name.clone().ok_or_else(|| {
        Error::StdError(StdError::MetadataMissing(format!(
            "desired {} has no name",
            K::kind(dt)
        )))
    })
}

fn set_ownership<K: Resource>(request: &Request<'_>, obj: &mut K, ownership: Ownership) -> Result<()> {
    match ownership {
        Ownership::Owned => {
            let oref = request.owner_reference()?;
            obj.meta_mut().owner_references = Some(vec![oref]);
        }
        Ownership::Cluster => {
            let annotations = obj.meta_mut().annotations.get_or_insert_with(Default::default);
            annotations.insert(OWNER_ANNOTATION.to_string(), request.instance_key());
            annotations.insert(OWNER_TYPE_ANNOTATION.to_string(), OWNER_TYPE.to_string());
        }
    }
    Ok(())
}

/// Carries server and third party metadata of the live object onto the desired one.
fn merge_metadata(desired: &mut ObjectMeta, found: &ObjectMeta) {
    desired.resource_version = found.resource_version.clone();
    desired.finalizers = found.finalizers.clone();

    if let Some(found_labels) = &found.labels {
        let mut labels = found_labels.clone();
        labels.extend(desired.labels.take().unwrap_or_default());
        desired.labels = Some(labels);
    }
    if let Some(found_annotations) = &found.annotations {
        let mut annotations = found_annotations.clone();
        annotations.extend(desired.annotations.take().unwrap_or_default());
        desired.annotations = Some(annotations);
    }
    if desired.owner_references.is_none() {
        desired.owner_references = found.owner_references.clone();
    }
}

/// Converges one resource towards `desired`.
///
/// The live object is left alone when the version cache already knows it;
/// otherwise fields owned by others are preserved and the object replaced.
/// The cache is only updated from objects returned by the API server.
pub async fn create_or_update<K>(
    request: &Request<'_>,
    api: &Api<K>,
    dt: &K::DynamicType,
    mut desired: K,
    ownership: Ownership,
) -> Result<ResourceStatus>
where
    K: ManagedResource,
{
    let kind = K::kind(dt).into_owned();
    let name = resource_name(&desired, dt)?;
    set_ownership(request, &mut desired, ownership)?;

    let Some(found) = request.call(api.get_opt(&name)).await? else {
        info!("Creating {} '{}'", kind, name);
        let created = request.call(api.create(&PostParams::default(), &desired)).await?;
        request.version_cache.add_with(&created, dt);
        return Ok(created.resource_status(created.object_ref(dt)));
    };

    if found.meta().deletion_timestamp.is_some() {
        debug!("{} '{}' is being deleted, leaving it alone", kind, name);
        return Ok(found.resource_status(found.object_ref(dt)));
    }

    if request.version_cache.contains_with(&found, dt) {
        debug!("{} '{}' is up to date", kind, name);
        return Ok(found.resource_status(found.object_ref(dt)));
    }

    desired.preserve_fields(&found);
    merge_metadata(desired.meta_mut(), found.meta());

    info!("Updating {} '{}'", kind, name);
    let updated = request
        .call(api.replace(&name, &PostParams::default(), &desired))
        .await?;
    request.version_cache.add_with(&updated, dt);
    Ok(updated.resource_status(updated.object_ref(dt)))
}

/// Deletes one resource; a resource that is already gone counts as deleted.
pub async fn delete_resource<K>(request: &Request<'_>, api: &Api<K>, dt: &K::DynamicType, obj: &K) -> Result<()>
where
    K: ManagedResource,
{
    let name = resource_name(obj, dt)?;
    match request.call(api.delete(&name, &DeleteParams::default())).await {
        Ok(_) => info!("Deleted {} '{}'", K::kind(dt), name),
        Err(e) if e.is_not_found() => debug!("{} '{}' already deleted", K::kind(dt), name),
        Err(e) => return Err(e),
    }
    request.version_cache.remove_with(obj, dt);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::admissionregistration::v1::{ValidatingWebhook, WebhookClientConfig};
    use k8s_openapi::api::core::v1::ServiceSpec;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn webhook(name: &str, ca_bundle: Option<&str>) -> ValidatingWebhook {
        ValidatingWebhook {
            name: name.to_string(),
            client_config: WebhookClientConfig {
                ca_bundle: ca_bundle.map(|ca| ByteString(ca.as_bytes().to_vec())),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn webhook_ca_bundle_is_preserved_by_name() {
        let existing = ValidatingWebhookConfiguration {
            webhooks: Some(vec![webhook("a", Some("ca-a")), webhook("b", Some("ca-b"))]),
            ..Default::default()
        };
        let mut desired = ValidatingWebhookConfiguration {
            webhooks: Some(vec![webhook("b", None), webhook("c", None)]),
            ..Default::default()
        };

        desired.preserve_fields(&existing);

        let webhooks = desired.webhooks.unwrap();
        assert_eq!(webhooks[0].client_config.ca_bundle, Some(ByteString(b"ca-b".to_vec())));
        assert_eq!(webhooks[1].client_config.ca_bundle, None);
    }

    #[test]
    fn desired_webhook_ca_bundle_wins() {
        let existing = ValidatingWebhookConfiguration {
            webhooks: Some(vec![webhook("a", Some("old"))]),
            ..Default::default()
        };
        let mut desired = ValidatingWebhookConfiguration {
            webhooks: Some(vec![webhook("a", Some("new"))]),
            ..Default::default()
        };

        desired.preserve_fields(&existing);
        assert_eq!(
            desired.webhooks.unwrap()[0].client_config.ca_bundle,
            Some(ByteString(b"new".to_vec()))
        );
    }

    #[test]
    fn service_cluster_ip_is_preserved() {
        let existing = Service {
            spec: Some(ServiceSpec {
                cluster_ip: Some("10.0.0.12".to_string()),
                cluster_ips: Some(vec!["10.0.0.12".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut desired = Service::default();

        desired.preserve_fields(&existing);

        let spec = desired.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.12"));
        assert_eq!(spec.cluster_ips, Some(vec!["10.0.0.12".to_string()]));
    }

    #[test]
    fn metadata_merge_keeps_foreign_labels() {
        let found = ObjectMeta {
            resource_version: Some("42".to_string()),
            labels: Some(BTreeMap::from([
                ("foreign".to_string(), "kept".to_string()),
                ("app".to_string(), "old".to_string()),
            ])),
            finalizers: Some(vec!["someone/else".to_string()]),
            ..Default::default()
        };
        let mut desired = ObjectMeta {
            labels: Some(BTreeMap::from([("app".to_string(), "new".to_string())])),
            ..Default::default()
        };

        merge_metadata(&mut desired, &found);

        let labels = desired.labels.unwrap();
        assert_eq!(labels["foreign"], "kept");
        assert_eq!(labels["app"], "new");
        assert_eq!(desired.resource_version.as_deref(), Some("42"));
        assert_eq!(desired.finalizers, Some(vec!["someone/else".to_string()]));
    }
}
