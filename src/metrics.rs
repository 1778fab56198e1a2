//! Prometheus metrics surface (§4.6), grounded in
//! `orchestrator/metrics.py` and installed the way the teacher installs
//! its own metrics backends — one process-wide recorder, one exporter
//! bound at startup.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use crate::error::DropReason;

const LATENCY_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0];

/// Installs the Prometheus recorder and binds its HTTP exposition
/// endpoint. Call once, before any connector or worker starts emitting
/// metrics.
pub fn install(port: u16) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full("eig_pipeline_latency_ms".to_string()), LATENCY_BUCKETS)?
        .install()?;

    metrics::describe_counter!("eig_pipeline_ingress_total", Unit::Count, "Number of messages entering each pipeline");
    metrics::describe_counter!("eig_pipeline_dropped_total", Unit::Count, "Messages dropped due to deadline or errors");
    metrics::describe_histogram!("eig_pipeline_latency_ms", Unit::Milliseconds, "End-to-end latency observed by pipeline agents");
    metrics::describe_gauge!("eig_pipeline_queue_depth", Unit::Count, "Messages waiting for pipeline processing");
    Ok(())
}

pub fn ingress(pipeline: &str) {
    counter!("eig_pipeline_ingress_total", "pipeline" => pipeline.to_string()).increment(1);
}

pub fn dropped(pipeline: &str, reason: DropReason) {
    counter!(
        "eig_pipeline_dropped_total",
        "pipeline" => pipeline.to_string(),
        "reason" => reason.as_str(),
    )
    .increment(1);
}

pub fn latency_ms(pipeline: &str, value: f64) {
    histogram!("eig_pipeline_latency_ms", "pipeline" => pipeline.to_string()).record(value);
}

pub fn queue_depth(depth: usize) {
    gauge!("eig_pipeline_queue_depth").set(depth as f64);
}
