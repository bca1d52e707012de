use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the collections ledger.
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn record_payment_registered(&self, currency: &str) {
        counter!("ledger_payments_registered_total", "currency" => currency.to_string())
            .increment(1);
    }

    pub fn record_payment_failed(&self, reason: &str) {
        counter!("ledger_payments_failed_total", "reason" => reason.to_string()).increment(1);
    }

    /// `kind` is one of `revert`, `reset`, `edit`.
    pub fn record_payment_reversed(&self, kind: &str) {
        counter!("ledger_payments_reversed_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn record_waterfall_latency(&self, duration_ms: f64) {
        histogram!("ledger_waterfall_duration_ms").record(duration_ms);
    }

    pub fn record_waterfall_touched(&self, installment_count: u64) {
        histogram!("ledger_waterfall_installments_touched").record(installment_count as f64);
    }

    pub fn record_wallet_operation(&self, ledger: &str, operation: &str) {
        counter!("ledger_wallet_operations_total", "ledger" => ledger.to_string(), "operation" => operation.to_string())
            .increment(1);
    }
}

/// Installs the Prometheus recorder. Call once at startup; later calls are
/// no-ops.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    if METRICS_HANDLE.get().is_none() {
        if let Ok(handle) = PrometheusBuilder::new().install_recorder() {
            let _ = METRICS_HANDLE.set(handle);
        }
    }
    METRICS_HANDLE.get()
}

/// Returns the process-wide metrics collector. Safe to call before
/// [`init_metrics`]; recordings are dropped until a recorder is installed.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}
