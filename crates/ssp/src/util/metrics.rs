use crate::api::v1beta1::ssp::Ssp;
use crate::util::errors::Error;
use kube::ResourceExt;
use prometheus::{histogram_opts, opts, HistogramVec, IntCounter, IntCounterVec, Registry};
use tokio::time::Instant;
use tracing::warn;

#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: IntCounter,
    pub failures: IntCounterVec,
    pub operand_errors: IntCounterVec,
    pub reconcile_duration: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        let reconcile_duration = HistogramVec::new(
            histogram_opts!(
                "ssp_reconcile_duration_seconds",
                "The duration of reconcile to complete in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]),
            &["instance"],
        )
        .expect("valid histogram options");
        let failures = IntCounterVec::new(
            opts!("ssp_reconciliation_errors_total", "reconciliation errors",),
            &["instance", "error"],
        )
        .expect("valid counter options");
        let operand_errors = IntCounterVec::new(
            opts!("ssp_operand_errors_total", "resource errors reported by operands",),
            &["operand", "error"],
        )
        .expect("valid counter options");
        let reconciliations = IntCounter::new("ssp_reconciliations_total", "reconciliations")
            .expect("valid counter options");
        Metrics {
            reconciliations,
            failures,
            operand_errors,
            reconcile_duration,
        }
    }
}

impl Metrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.operand_errors.clone()))?;
        registry.register(Box::new(self.reconciliations.clone()))?;
        Ok(self)
    }

    pub fn reconcile_failure(&self, ssp: &Ssp, e: &Error) {
        warn!("reconcile failed: {:?}", &[ssp.name_any(), e.metric_label()]);
        self.failures
            .with_label_values(&[ssp.name_any().as_ref(), e.metric_label().as_ref()])
            .inc()
    }

    pub fn operand_error(&self, operand: &str, e: &Error) {
        self.operand_errors
            .with_label_values(&[operand, e.metric_label().as_ref()])
            .inc()
    }

    pub fn count_and_measure(&self, instance: &str) -> ReconcileMeasurer {
        self.reconciliations.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.reconcile_duration.clone(),
            instance: instance.to_string(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    metric: HistogramVec,
    instance: String,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric
            .with_label_values(&[self.instance.as_str()])
            .observe(duration);
    }
}
