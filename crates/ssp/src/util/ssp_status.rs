use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, info};

use crate::api::v1beta1::ssp::{Ssp, SspStatus};
use crate::common::{ReconcileOutcome, ResourceStatus};
use crate::util::errors::{Error, Result, StdError};
use crate::util::status::{
    new_condition, set_status_condition, CONDITION_AVAILABLE, CONDITION_DEGRADED, CONDITION_PROGRESSING,
};

// Field manager for status updates
pub const STATUS_FIELD_MANAGER: &str = "ssp-status-manager";

pub const REASON_AVAILABLE: &str = "Available";
pub const REASON_PROGRESSING: &str = "Progressing";
pub const REASON_DEGRADED: &str = "Degraded";
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";

// Phase represents the high-level status of an SSP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SspPhase {
    Deploying,
    Deployed,
    Deleting,
    Deleted,
}

impl fmt::Display for SspPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SspPhase::Deploying => write!(f, "Deploying"),
            SspPhase::Deployed => write!(f, "Deployed"),
            SspPhase::Deleting => write!(f, "Deleting"),
            SspPhase::Deleted => write!(f, "Deleted"),
        }
    }
}

/// Reduces the resource statuses and errors of one pass into SSP conditions.
///
/// A condition is raised when any resource raises the matching signal. Each
/// offending resource contributes one `<resource>: <reason>` line to the
/// condition message.
#[derive(Debug, Default)]
pub struct StatusAggregator {
    not_available: Vec<String>,
    progressing: Vec<String>,
    degraded: Vec<String>,
    errors: Vec<String>,
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_outcome(outcome: &ReconcileOutcome) -> Self {
        let mut aggregator = Self::new();
        outcome.statuses.iter().for_each(|status| aggregator.add_status(status));
        outcome.errors.iter().for_each(|error| aggregator.add_error(error));
        aggregator
    }

    pub fn add_status(&mut self, status: &ResourceStatus) {
        let resource = status.describe_resource();
        if let Some(reason) = &status.not_available {
            self.not_available.push(format!("{resource}: {reason}"));
        }
        if let Some(reason) = &status.progressing {
            self.progressing.push(format!("{resource}: {reason}"));
        }
        if let Some(reason) = &status.degraded {
            self.degraded.push(format!("{resource}: {reason}"));
        }
    }

    pub fn add_error(&mut self, error: &Error) {
        self.errors.push(error.to_string());
    }

    pub fn is_available(&self) -> bool {
        self.not_available.is_empty()
    }

    pub fn is_progressing(&self) -> bool {
        !self.progressing.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty() || !self.errors.is_empty()
    }

    pub fn phase(&self) -> SspPhase {
        if self.is_available() && !self.is_progressing() && !self.is_degraded() {
            SspPhase::Deployed
        } else {
            SspPhase::Deploying
        }
    }

    pub fn conditions(&self, generation: Option<i64>) -> Vec<Condition> {
        let available = if self.is_available() {
            new_condition(
                CONDITION_AVAILABLE,
                true,
                REASON_AVAILABLE,
                "All SSP resources are available",
                generation,
            )
        } else {
            new_condition(
                CONDITION_AVAILABLE,
                false,
                REASON_AVAILABLE,
                self.not_available.join("\n"),
                generation,
            )
        };

        let progressing = if self.is_progressing() {
            new_condition(
                CONDITION_PROGRESSING,
                true,
                REASON_PROGRESSING,
                self.progressing.join("\n"),
                generation,
            )
        } else {
            new_condition(
                CONDITION_PROGRESSING,
                false,
                REASON_PROGRESSING,
                "No SSP resources are progressing",
                generation,
            )
        };

        let degraded = if !self.errors.is_empty() {
            let lines: Vec<&str> = self
                .errors
                .iter()
                .chain(self.degraded.iter())
                .map(String::as_str)
                .collect();
            new_condition(
                CONDITION_DEGRADED,
                true,
                REASON_RECONCILE_FAILED,
                lines.join("\n"),
                generation,
            )
        } else if !self.degraded.is_empty() {
            new_condition(
                CONDITION_DEGRADED,
                true,
                REASON_DEGRADED,
                self.degraded.join("\n"),
                generation,
            )
        } else {
            new_condition(
                CONDITION_DEGRADED,
                false,
                REASON_DEGRADED,
                "No SSP resources are degraded",
                generation,
            )
        };

        vec![available, progressing, degraded]
    }
}

/// Computes the next SSP status from the aggregated pass.
///
/// Conditions whose status does not flip keep their transition time.
pub fn next_status(ssp: &Ssp, aggregator: &StatusAggregator, operator_version: &str) -> SspStatus {
    let current = ssp.status.clone().unwrap_or_default();
    let generation = ssp.metadata.generation;

    let conditions = aggregator
        .conditions(generation)
        .into_iter()
        .fold(current.conditions, |conditions: Vec<Condition>, condition| {
            set_status_condition(&conditions, condition).0
        });

    let phase = aggregator.phase();
    let observed_version = if phase == SspPhase::Deployed {
        Some(operator_version.to_string())
    } else {
        current.observed_version
    };

    SspStatus {
        conditions,
        phase: Some(phase.to_string()),
        observed_generation: generation,
        operator_version: Some(operator_version.to_string()),
        target_version: Some(operator_version.to_string()),
        observed_version,
    }
}

pub struct SspStatusManager<'a> {
    ssp: &'a Ssp,
    client: kube::Client,
}

impl<'a> SspStatusManager<'a> {
    pub fn new(client: &kube::Client, ssp: &'a Ssp) -> Self {
        Self {
            ssp,
            client: client.clone(),
        }
    }

    fn api(&self) -> Result<Api<Ssp>> {
        let namespace = self.ssp.namespace().ok_or_else(|| {
            Error::StdError(StdError::MetadataMissing(
                "namespace should always be set on an SSP".to_string(),
            ))
        })?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }

    async fn apply(&self, status: &SspStatus) -> Result<()> {
        let name = self.ssp.name_any();
        let status =
            serde_json::to_value(status).map_err(|e| Error::StdError(StdError::SerializationError(e)))?;
        let patch = Patch::Apply(json!({
            "apiVersion": "ssp.kubevirt.io/v1beta1",
            "kind": "SSP",
            "metadata": {
                "name": name,
                "namespace": self.ssp.namespace(),
            },
            "status": status,
        }));

        self.api()?
            .patch_status(&name, &PatchParams::apply(STATUS_FIELD_MANAGER).force(), &patch)
            .await
            .map_err(|e| Error::StdError(StdError::KubeError(e)))?;
        Ok(())
    }

    /// Writes the conditions and phase of a finished reconciliation pass.
    pub async fn update(&self, aggregator: &StatusAggregator, operator_version: &str) -> Result<SspStatus> {
        let status = next_status(self.ssp, aggregator, operator_version);
        self.apply(&status).await?;
        debug!(
            "Updated SSP {} status: phase {:?}, degraded {}",
            self.ssp.name_any(),
            status.phase,
            aggregator.is_degraded()
        );
        Ok(status)
    }

    /// Updates the phase only, keeping every other status field.
    pub async fn update_phase(&self, phase: SspPhase) -> Result<()> {
        let mut status = self.ssp.status.clone().unwrap_or_default();
        status.phase = Some(phase.to_string());
        self.apply(&status).await?;
        info!("Updated SSP {} phase to {}", self.ssp.name_any(), phase);
        Ok(())
    }
}
