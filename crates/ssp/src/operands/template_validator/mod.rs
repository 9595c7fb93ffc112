//! Template validator: admission webhook rejecting VMs that violate their template's rules.

pub mod resources;

use async_trait::async_trait;
use k8s_openapi::api::{
    admissionregistration::v1::ValidatingWebhookConfiguration,
    apps::v1::Deployment,
    core::v1::{Service, ServiceAccount},
    rbac::v1::{ClusterRole, ClusterRoleBinding},
};
use kube::Api;

use crate::{
    common::{create_or_update, delete_resource, Operand, Ownership, ReconcileOutcome, Request, ResourceStatus},
    util::errors::{Error, Result},
};

use self::resources::*;

pub struct TemplateValidator {
    image: String,
}

impl TemplateValidator {
    pub fn new(image: impl Into<String>) -> Self {
        Self { image: image.into() }
    }

    async fn reconcile_cluster_role(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let api: Api<ClusterRole> = Api::all(request.client.clone());
        create_or_update(request, &api, &(), new_cluster_role(), Ownership::Cluster).await
    }

    async fn reconcile_service_account(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let namespace = request.namespace()?;
        let api: Api<ServiceAccount> = Api::namespaced(request.client.clone(), &namespace);
        create_or_update(request, &api, &(), new_service_account(&namespace), Ownership::Owned).await
    }

    async fn reconcile_cluster_role_binding(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let namespace = request.namespace()?;
        let api: Api<ClusterRoleBinding> = Api::all(request.client.clone());
        create_or_update(
            request,
            &api,
            &(),
            new_cluster_role_binding(&namespace),
            Ownership::Cluster,
        )
        .await
    }

    async fn reconcile_service(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let namespace = request.namespace()?;
        let api: Api<Service> = Api::namespaced(request.client.clone(), &namespace);
        create_or_update(request, &api, &(), new_service(&namespace), Ownership::Owned).await
    }

    async fn reconcile_deployment(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let namespace = request.namespace()?;
        let validator = &request.instance.spec.template_validator;
        let desired = new_deployment(
            &namespace,
            validator.replicas(),
            &self.image,
            validator.placement.as_ref(),
        );
        let api: Api<Deployment> = Api::namespaced(request.client.clone(), &namespace);
        create_or_update(request, &api, &(), desired, Ownership::Owned).await
    }

    async fn reconcile_validating_webhook(&self, request: &Request<'_>) -> Result<ResourceStatus> {
        let namespace = request.namespace()?;
        let api: Api<ValidatingWebhookConfiguration> = Api::all(request.client.clone());
        create_or_update(
            request,
            &api,
            &(),
            new_validating_webhook(&namespace),
            Ownership::Cluster,
        )
        .await
    }
}

#[async_trait]
impl Operand for TemplateValidator {
    fn name(&self) -> &'static str {
        "template-validator"
    }

    async fn reconcile(&self, request: &Request<'_>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        outcome.record(self.reconcile_cluster_role(request).await);
        outcome.record(self.reconcile_service_account(request).await);
        outcome.record(self.reconcile_cluster_role_binding(request).await);
        outcome.record(self.reconcile_service(request).await);
        outcome.record(self.reconcile_deployment(request).await);
        outcome.record(self.reconcile_validating_webhook(request).await);
        outcome
    }

    async fn cleanup(&self, request: &Request<'_>) -> Result<()> {
        let namespace = request.namespace()?;
        let mut errors = Vec::new();

        let cluster_roles: Api<ClusterRole> = Api::all(request.client.clone());
        if let Err(e) = delete_resource(request, &cluster_roles, &(), &new_cluster_role()).await {
            errors.push(e);
        }

        let bindings: Api<ClusterRoleBinding> = Api::all(request.client.clone());
        if let Err(e) = delete_resource(request, &bindings, &(), &new_cluster_role_binding(&namespace)).await {
            errors.push(e);
        }

        let webhooks: Api<ValidatingWebhookConfiguration> = Api::all(request.client.clone());
        if let Err(e) = delete_resource(request, &webhooks, &(), &new_validating_webhook(&namespace)).await {
            errors.push(e);
        }

        Error::from_many(errors)
    }
}
