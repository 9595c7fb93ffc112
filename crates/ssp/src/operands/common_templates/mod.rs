//! Common templates: the bundled VM templates and access to the golden images namespace.

pub mod bundle;
pub mod resources;

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::{
    core::v1::Namespace,
    rbac::v1::{ClusterRole, Role, RoleBinding},
};
use kube::{
    api::{ApiResource, DynamicObject},
    Api,
};
use tracing::info;

use crate::{
    common::{create_or_update, delete_resource, Operand, Ownership, ReconcileOutcome, Request, ResourceStatus},
    util::errors::{Error, Result},
};

use self::{bundle::template_api_resource, resources::*};

pub const TEMPLATE_VERSION_LABEL: &str = "template.kubevirt.io/version";
pub const TEMPLATE_TYPE_LABEL: &str = "template.kubevirt.io/type";

pub struct CommonTemplates {
    templates: Vec<DynamicObject>,
    api_resource: ApiResource,
    version: String,
}

impl CommonTemplates {
    pub fn new(templates: Vec<DynamicObject>, version: impl Into<String>) -> Self {
        Self {
            templates,
            api_resource: template_api_resource(),
            version: version.into(),
        }
    }

    pub fn from_bundle_dir(dir: &Path, version: impl Into<String>) -> Result<Self> {
        let templates = bundle::load_bundle(dir)?;
        info!("Loaded {} common templates from {}", templates.len(), dir.display());
        Ok(Self::new(templates, version))
    }

    /// Bundled templates as they are deployed to `namespace`.
    fn desired_templates(&self, namespace: &str) -> Vec<DynamicObject> {
        self.templates
            .iter()
            .map(|template| {
                let mut template = template.clone();
                template.metadata.namespace = Some(namespace.to_string());
                template
                    .metadata
                    .labels
                    .get_or_insert_with(Default::default)
                    .insert(TEMPLATE_VERSION_LABEL.to_string(), self.version.clone());
                template
            })
            .collect()
    }

    fn templates_api(&self, request: &Request<'_>) -> Api<DynamicObject> {
        let namespace = &request.instance.spec.common_templates.namespace;
        Api::namespaced_with(request.client.clone(), namespace, &self.api_resource)
    }

    async fn reconcile_namespace(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let api: Api<Namespace> = Api::all(request.client.clone());
        create_or_update(request, &api, &(), new_golden_images_namespace(), Ownership::Cluster).await
    }

    async fn reconcile_view_cluster_role(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let api: Api<ClusterRole> = Api::all(request.client.clone());
        create_or_update(request, &api, &(), new_view_cluster_role(), Ownership::Cluster).await
    }

    async fn reconcile_view_role(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let api: Api<Role> = Api::namespaced(request.client.clone(), GOLDEN_IMAGES_NAMESPACE);
        create_or_update(request, &api, &(), new_view_role(), Ownership::Cluster).await
    }

    async fn reconcile_view_role_binding(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let api: Api<RoleBinding> = Api::namespaced(request.client.clone(), GOLDEN_IMAGES_NAMESPACE);
        create_or_update(request, &api, &(), new_view_role_binding(), Ownership::Cluster).await
    }

    async fn reconcile_edit_cluster_role(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let api: Api<ClusterRole> = Api::all(request.client.clone());
        create_or_update(request, &api, &(), new_edit_cluster_role(), Ownership::Cluster).await
    }
}

#[async_trait]
impl Operand for CommonTemplates {
    fn name(&self) -> &'static str {
        "common-templates"
    }

    async fn reconcile(&self, request: &Request<'_>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        outcome.record(self.reconcile_namespace(request).await);
        outcome.record(self.reconcile_view_cluster_role(request).await);
        outcome.record(self.reconcile_view_role(request).await);
        outcome.record(self.reconcile_view_role_binding(request).await);
        outcome.record(self.reconcile_edit_cluster_role(request).await);

        let api = self.templates_api(request);
        let namespace = &request.instance.spec.common_templates.namespace;
        for template in self.desired_templates(namespace) {
            outcome.record(create_or_update(request, &api, &self.api_resource, template, Ownership::Cluster).await);
        }
        outcome
    }

    async fn cleanup(&self, request: &Request<'_>) -> Result<()> {
        let mut errors = Vec::new();

        let api = self.templates_api(request);
        let namespace = &request.instance.spec.common_templates.namespace;
        for template in self.desired_templates(namespace) {
            if let Err(e) = delete_resource(request, &api, &self.api_resource, &template).await {
                errors.push(e);
            }
        }

        let bindings: Api<RoleBinding> = Api::namespaced(request.client.clone(), GOLDEN_IMAGES_NAMESPACE);
        if let Err(e) = delete_resource(request, &bindings, &(), &new_view_role_binding()).await {
            errors.push(e);
        }
        let roles: Api<Role> = Api::namespaced(request.client.clone(), GOLDEN_IMAGES_NAMESPACE);
        if let Err(e) = delete_resource(request, &roles, &(), &new_view_role()).await {
            errors.push(e);
        }

        let cluster_roles: Api<ClusterRole> = Api::all(request.client.clone());
        for role in [new_view_cluster_role(), new_edit_cluster_role()] {
            if let Err(e) = delete_resource(request, &cluster_roles, &(), &role).await {
                errors.push(e);
            }
        }

        let namespaces: Api<Namespace> = Api::all(request.client.clone());
        if let Err(e) = delete_resource(request, &namespaces, &(), &new_golden_images_namespace()).await {
            errors.push(e);
        }

        Error::from_many(errors)
    }
}
