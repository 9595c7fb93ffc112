use std::future::Future;

use kube::{Client, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::{
    api::v1beta1::ssp::Ssp,
    common::version_cache::VersionCache,
    util::errors::{Error, Result, StdError},
};

/// Everything an operand needs for one reconciliation pass.
///
/// Borrowed from the orchestrator for the duration of the pass; operands must
/// not keep any part of it around.
pub struct Request<'a> {
    pub instance: &'a Ssp,
    pub client: Client,
    pub version_cache: &'a VersionCache,
    pub cancel: CancellationToken,
    pub span: Span,
}

impl<'a> Request<'a> {
    pub fn new(
        instance: &'a Ssp,
        client: Client,
        version_cache: &'a VersionCache,
        cancel: CancellationToken,
    ) -> Self {
        let span = tracing::info_span!(
            "reconcile",
            ssp = %instance.name_any(),
            namespace = %instance.namespace().unwrap_or_default(),
        );
        Self {
            instance,
            client,
            version_cache,
            cancel,
            span,
        }
    }

    /// Namespace of the SSP, where namespaced operands live.
    pub fn namespace(&self) -> Result<String> {
        self.instance.namespace().ok_or_else(|| {
            Error::StdError(StdError::MetadataMissing(
                "namespace should always be set on an SSP".to_string(),
            ))
        })
    }

    /// `namespace/name` of the SSP
    pub fn instance_key(&self) -> String {
        format!(
            "{}/{}",
            self.instance.namespace().unwrap_or_default(),
            self.instance.name_any()
        )
    }

    pub fn owner_reference(
        &self,
    ) -> Result<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference> {
        self.instance.controller_owner_ref(&()).ok_or_else(|| {
            Error::StdError(StdError::MetadataMissing(
                "SSP has no uid to reference as owner".to_string(),
            ))
        })
    }

    /// Runs one cluster API call, giving up as soon as the pass is cancelled.
    pub async fn call<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = kube::Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::StdError(StdError::Cancelled(
                format!("reconciliation of {} was cancelled", self.instance_key()),
            ))),
            result = call => result.map_err(|e| Error::StdError(StdError::KubeError(e))),
        }
    }
}
