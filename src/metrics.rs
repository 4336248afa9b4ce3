//! Prometheus metrics exposed on `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticket_http_requests_total", "Total HTTP requests"),
        &["method", "route", "status"],
    )
    .expect("valid metric definition")
});

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ticket_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "route", "status"],
    )
    .expect("valid metric definition")
});

pub static TICKETS_ISSUED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("ticket_tickets_issued_total", "Tickets issued across all queues")
        .expect("valid metric definition")
});

pub static QUEUE_RESETS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("ticket_queue_resets_total", "Queue resets")
        .expect("valid metric definition")
});

pub static QUEUE_DELETES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("ticket_queue_deletes_total", "Queues deleted")
        .expect("valid metric definition")
});

pub static STORAGE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "ticket_storage_errors_total",
        "Requests that failed because the counter store was unavailable",
    )
    .expect("valid metric definition")
});

fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(TICKETS_ISSUED_TOTAL.clone()),
        Box::new(QUEUE_RESETS_TOTAL.clone()),
        Box::new(QUEUE_DELETES_TOTAL.clone()),
        Box::new(STORAGE_ERRORS_TOTAL.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            tracing::warn!(error = %e, "failed to register metric");
        }
    }

    #[cfg(target_os = "linux")]
    if let Err(e) = registry.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    )) {
        tracing::warn!(error = %e, "failed to register process collector");
    }
}

pub fn record_http_request(method: &str, route: &str, status: u16, elapsed: Duration) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, route, &status])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method, route, &status])
        .observe(elapsed.as_secs_f64());
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_recorded_metrics() {
        TICKETS_ISSUED_TOTAL.inc();
        record_http_request(
            "POST",
            "/api/queues/{queue_id}/tickets",
            200,
            Duration::from_millis(3),
        );

        let text = gather().unwrap();
        assert!(text.contains("ticket_tickets_issued_total"));
        assert!(text.contains("ticket_http_requests_total"));
        assert!(text.contains("route=\"/api/queues/{queue_id}/tickets\""));
    }
}
