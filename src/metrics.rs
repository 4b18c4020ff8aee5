//! Query metrics and tracing spans.
//!
//! With feature `metrics`, [`METRICS`] records statement counts, failures and
//! durations through the OpenTelemetry global meter; the application installs
//! whatever meter provider and exporter it wants. With feature `tracing`,
//! [`tracing_helpers`] builds the spans drivers enter around each statement.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<LucidMetrics> = Lazy::new(LucidMetrics::init);

#[cfg(feature = "metrics")]
pub struct LucidMetrics {
    pub queries_total: Counter<u64>,
    pub query_errors_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl LucidMetrics {
    pub fn init() -> Self {
        let meter = global::meter("lucid");

        let queries_total = meter
            .u64_counter("lucid_queries_total")
            .with_description("Total statements executed")
            .build();

        let query_errors_total = meter
            .u64_counter("lucid_query_errors_total")
            .with_description("Statements that failed in the driver")
            .build();

        let query_duration = meter
            .f64_histogram("lucid_query_duration_seconds")
            .with_description("Duration of statements")
            .build();

        Self {
            queries_total,
            query_errors_total,
            query_duration,
        }
    }

    pub fn record_query_duration(&self, elapsed: std::time::Duration) {
        self.queries_total.add(1, &[]);
        self.query_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_query_error(&self) {
        self.query_errors_total.add(1, &[]);
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    /// Span around one statement; the SQL is recorded, bindings are not
    pub fn execute_query_span(sql: &str) -> Span {
        tracing::debug_span!("lucid.query", sql = %sql)
    }

    /// Span around one batched relation fetch
    pub fn eager_load_span(model: &str, relation: &str) -> Span {
        tracing::debug_span!("lucid.eager_load", model = %model, relation = %relation)
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record_without_provider() {
        // The noop global meter accepts every measurement
        METRICS.record_query_duration(std::time::Duration::from_millis(3));
        METRICS.record_query_error();
    }
}
