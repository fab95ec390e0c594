use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref JOB_NOTIFICATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "gitops_job_notifications_total",
            "Total number of Job watch notifications handled."
        ),
        &["kind"]
    )
    .expect("valid metric definition");
    pub static ref COMPLETION_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "gitops_job_completion_events_total",
            "Total number of Job completion events published."
        ),
        &["reason"]
    )
    .expect("valid metric definition");
    pub static ref OWNER_LOOKUP_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "gitops_job_owner_lookup_failures_total",
        "Total number of failed Job owner lookups."
    )
    .expect("valid metric definition");
    pub static ref EVENT_PUBLISH_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "gitops_job_event_publish_failures_total",
        "Total number of completion events that could not be published."
    )
    .expect("valid metric definition");
    pub static ref WATCH_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "gitops_job_watch_errors_total",
        "Total number of errors reported by the Job watch."
    )
    .expect("valid metric definition");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(JOB_NOTIFICATIONS_TOTAL.clone()),
            Box::new(COMPLETION_EVENTS_TOTAL.clone()),
            Box::new(OWNER_LOOKUP_FAILURES_TOTAL.clone()),
            Box::new(EVENT_PUBLISH_FAILURES_TOTAL.clone()),
            Box::new(WATCH_ERRORS_TOTAL.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .expect("metric registered once");
        }
        registry
    };
}

// Renders every registered metric in the Prometheus text format
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("Metrics output is not UTF-8: {}", e);
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathered_output_lists_pipeline_counters() {
        JOB_NOTIFICATIONS_TOTAL.with_label_values(&["Updated"]).inc();
        COMPLETION_EVENTS_TOTAL.with_label_values(&["JobSuccessful"]).inc();

        let output = gather_metrics();
        assert!(output.contains("gitops_job_notifications_total{kind=\"Updated\"}"));
        assert!(output.contains("gitops_job_completion_events_total{reason=\"JobSuccessful\"}"));
        assert!(output.contains("gitops_job_owner_lookup_failures_total"));
        assert!(output.contains("gitops_job_watch_errors_total"));
    }
}
