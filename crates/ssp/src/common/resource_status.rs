use k8s_openapi::api::{apps::v1::Deployment, core::v1::ObjectReference};

/// Health of one managed resource after a reconciliation pass.
///
/// Each signal is either set with a reason or absent. Kinds that do not
/// report runtime health never set any of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceStatus {
    pub resource: ObjectReference,
    pub not_available: Option<String>,
    pub progressing: Option<String>,
    pub degraded: Option<String>,
}

impl ResourceStatus {
    pub fn healthy(resource: ObjectReference) -> Self {
        Self {
            resource,
            ..Default::default()
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.not_available.is_none() && self.progressing.is_none() && self.degraded.is_none()
    }

    /// `<Kind> <namespace>/<name>` for cluster status messages
    pub fn describe_resource(&self) -> String {
        let kind = self.resource.kind.as_deref().unwrap_or_default();
        let name = self.resource.name.as_deref().unwrap_or_default();
        match self.resource.namespace.as_deref() {
            Some(namespace) if !namespace.is_empty() => format!("{kind} {namespace}/{name}"),
            _ => format!("{kind} {name}"),
        }
    }
}

/// Derives the three health signals from a deployment's replica counts.
pub fn deployment_status(deployment: &Deployment, resource: ObjectReference) -> ResourceStatus {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = deployment.status.clone().unwrap_or_default();
    let ready = status.ready_replicas.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);
    let unavailable = status.unavailable_replicas.unwrap_or(0);

    ResourceStatus {
        resource,
        not_available: (ready < desired)
            .then(|| format!("Not all pods are ready. Expected: {desired}, ready: {ready}")),
        progressing: (updated < desired)
            .then(|| format!("Rollout in progress. Expected: {desired}, updated: {updated}")),
        degraded: (unavailable > 0).then(|| format!("{unavailable} pods are unavailable")),
    }
}
