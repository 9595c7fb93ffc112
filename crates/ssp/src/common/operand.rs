use async_trait::async_trait;

use crate::{
    common::{request::Request, resource::ReconcileOutcome},
    util::errors::Result,
};

/// A group of related resources reconciled together.
#[async_trait]
pub trait Operand: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Converges every resource of the operand. A failing resource never
    /// stops the remaining ones; its error is returned in the outcome.
    async fn reconcile(&self, request: &Request<'_>) -> ReconcileOutcome;

    /// Deletes the resources that are not garbage collected together with the SSP.
    async fn cleanup(&self, request: &Request<'_>) -> Result<()>;
}
