use crate::api::v1beta1::ssp::{Ssp, SSP_FINALIZER};
use crate::common::{
    resource::{OWNER_ANNOTATION, OWNER_TYPE, OWNER_TYPE_ANNOTATION},
    Operand, ReconcileOutcome, Request, VersionCache, APP_MANAGED_BY_LABEL, MANAGED_BY,
};
use crate::operands;
use crate::util::config::OperatorConfig;
use crate::util::ssp_status::{SspPhase, SspStatusManager, StatusAggregator};
use crate::util::{errors, errors::Result, metrics};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::{
    admissionregistration::v1::ValidatingWebhookConfiguration,
    apps::v1::Deployment,
    core::v1::{Namespace, Service, ServiceAccount},
    rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
};
use kube::{
    api::{Api, ListParams, ResourceExt},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        events::{Event, EventType, Recorder, Reporter},
        finalizer::{finalizer, Event as Finalizer},
        reflector::ObjectRef,
        watcher::{self, Config},
    },
    Resource,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::RwLock, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::*;

const REQUEUE_AFTER_ERROR: Duration = Duration::from_secs(30);
const REQUEUE_AFTER_SUCCESS: Duration = Duration::from_secs(5 * 60);

impl Ssp {
    /// Spec generation was bumped since the last status write
    fn spec_changed(&self) -> bool {
        let observed = self.status.as_ref().and_then(|status| status.observed_generation);
        observed != self.metadata.generation
    }

    // Reconcile (for non-finalizer related changes)
    pub async fn reconcile(&self, ctx: Arc<Context>) -> Result<Action> {
        if self.spec_changed() {
            // cache hits would hide the new desired state
            debug!("SSP {} generation changed, invalidating version cache", self.name_any());
            ctx.version_cache.clear();
        }

        let request = Request::new(
            self,
            ctx.client.clone(),
            &ctx.version_cache,
            ctx.shutdown.child_token(),
        );

        let mut outcome = ReconcileOutcome::default();
        for operand in ctx.operands.iter() {
            let result = operand.reconcile(&request).instrument(request.span.clone()).await;
            for e in &result.errors {
                warn!(operand = operand.name(), "failed to reconcile resource: {}", e);
                ctx.metrics.operand_error(operand.name(), e);
            }
            outcome.extend(result);
        }

        if request.cancel.is_cancelled() {
            info!("Reconciliation of SSP {} interrupted by shutdown", self.name_any());
            return Ok(Action::await_change());
        }

        let aggregator = StatusAggregator::from_outcome(&outcome);
        SspStatusManager::new(&ctx.client, self)
            .update(&aggregator, &ctx.config.operator_version)
            .await?;

        if !outcome.errors.is_empty() {
            return Ok(Action::requeue(REQUEUE_AFTER_ERROR));
        }
        Ok(Action::requeue(REQUEUE_AFTER_SUCCESS))
    }

    // Finalizer cleanup (the object was deleted, ensure nothing is orphaned)
    pub async fn cleanup(&self, ctx: Arc<Context>) -> Result<Action> {
        let recorder = ctx.diagnostics.read().await.recorder(ctx.client.clone());
        let event = Event {
            type_: EventType::Normal,
            reason: "DeleteRequested".into(),
            note: Some(format!("Delete `{}`", self.name_any())),
            action: "Deleting".into(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(&event, &self.object_ref(&())).await {
            warn!("failed to publish event for SSP {}: {}", self.name_any(), e);
        }

        let status_manager = SspStatusManager::new(&ctx.client, self);
        status_manager.update_phase(SspPhase::Deleting).await?;

        let request = Request::new(
            self,
            ctx.client.clone(),
            &ctx.version_cache,
            ctx.shutdown.child_token(),
        );
        let mut errors = Vec::new();
        for operand in ctx.operands.iter() {
            if let Err(e) = operand.cleanup(&request).instrument(request.span.clone()).await {
                warn!(operand = operand.name(), "failed to clean up: {}", e);
                ctx.metrics.operand_error(operand.name(), &e);
                errors.push(e);
            }
        }
        errors::Error::from_many(errors)?;

        status_manager.update_phase(SspPhase::Deleted).await?;
        Ok(Action::await_change())
    }
}

/// State shared between the controller and the web server
#[derive(Clone)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
    config: OperatorConfig,
    /// Cancels in-flight cluster calls on shutdown
    shutdown: CancellationToken,
}

/// State wrapper around the controller outputs for the web server
impl State {
    pub fn new(config: OperatorConfig) -> Self {
        Self {
            diagnostics: Default::default(),
            registry: Default::default(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    // Create a Controller Context that can update State
    pub fn to_context(&self, client: Client) -> Result<Arc<Context>> {
        let metrics = metrics::Metrics::default()
            .register(&self.registry)
            .map_err(|e| errors::Error::StdError(errors::StdError::InvalidArgument(e.to_string())))?;
        Ok(Arc::new(Context {
            client,
            diagnostics: self.diagnostics.clone(),
            metrics,
            version_cache: Arc::new(VersionCache::new()),
            operands: Arc::new(operands::all(&self.config)?),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        }))
    }
}

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: metrics::Metrics,
    /// Versions of every managed resource, shared by all SSPs
    pub version_cache: Arc<VersionCache>,
    /// Operands in reconciliation order
    pub operands: Arc<Vec<Box<dyn Operand>>>,
    pub config: OperatorConfig,
    pub shutdown: CancellationToken,
}

pub async fn reconcile(ssp: Arc<Ssp>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = ctx.metrics.count_and_measure(&ssp.name_any());
    ctx.diagnostics.write().await.last_event = Utc::now();

    let ns = ssp.namespace().ok_or_else(|| {
        errors::Error::StdError(errors::StdError::MetadataMissing(
            "namespace should always be set on an SSP".to_string(),
        ))
    })?;
    let ssps: Api<Ssp> = Api::namespaced(ctx.client.clone(), &ns);

    info!("Reconciling SSP \"{}\" in {}", ssp.name_any(), ns);
    finalizer(&ssps, SSP_FINALIZER, ssp, |event| async {
        match event {
            Finalizer::Apply(ssp) => ssp.reconcile(ctx.clone()).await,
            Finalizer::Cleanup(ssp) => ssp.cleanup(ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| errors::Error::StdError(errors::StdError::FinalizerError(Box::new(e))))
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "ssp-operator".into(),
        }
    }
}
impl Diagnostics {
    fn recorder(&self, client: Client) -> Recorder {
        Recorder::new(client, self.reporter.clone())
    }
}

fn error_policy(ssp: Arc<Ssp>, error: &errors::Error, ctx: Arc<Context>) -> Action {
    ctx.metrics.reconcile_failure(&ssp, error);
    Action::requeue(REQUEUE_AFTER_ERROR)
}

/// Maps a cluster scoped resource back to the SSP named in its owner annotations.
fn owner_from_annotations<K: Resource>(obj: K) -> Option<ObjectRef<Ssp>> {
    let annotations = obj.annotations();
    if annotations.get(OWNER_TYPE_ANNOTATION).map(String::as_str) != Some(OWNER_TYPE) {
        return None;
    }
    let (namespace, name) = annotations.get(OWNER_ANNOTATION)?.split_once('/')?;
    Some(ObjectRef::new(name).within(namespace))
}

/// Initialize the controller and shared state (given the crd is installed)
pub async fn run(state: State) -> Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| errors::Error::StdError(errors::StdError::KubeError(e)))?;

    let ssps = Api::<Ssp>::all(client.clone());
    if let Err(e) = ssps.list(&ListParams::default().limit(1)).await {
        error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        return Err(errors::Error::StdError(errors::StdError::KubeError(e)));
    }

    let selector = format!("{APP_MANAGED_BY_LABEL}={MANAGED_BY}");
    let managed = || watcher::Config::default().labels(&selector);

    Controller::new(ssps, Config::default().any_semantic())
        .owns(Api::<Deployment>::all(client.clone()), managed())
        .owns(Api::<Service>::all(client.clone()), managed())
        .owns(Api::<ServiceAccount>::all(client.clone()), managed())
        .watches(
            Api::<ClusterRole>::all(client.clone()),
            managed(),
            owner_from_annotations::<ClusterRole>,
        )
        .watches(
            Api::<ClusterRoleBinding>::all(client.clone()),
            managed(),
            owner_from_annotations::<ClusterRoleBinding>,
        )
        .watches(
            Api::<ValidatingWebhookConfiguration>::all(client.clone()),
            managed(),
            owner_from_annotations::<ValidatingWebhookConfiguration>,
        )
        .watches(
            Api::<Namespace>::all(client.clone()),
            managed(),
            owner_from_annotations::<Namespace>,
        )
        .watches(
            Api::<Role>::all(client.clone()),
            managed(),
            owner_from_annotations::<Role>,
        )
        .watches(
            Api::<RoleBinding>::all(client.clone()),
            managed(),
            owner_from_annotations::<RoleBinding>,
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, state.to_context(client)?)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("reconciled {}", obj),
                Err(e) => warn!("reconcile failed: {}", e),
            }
        })
        .await;

    Ok(())
}
