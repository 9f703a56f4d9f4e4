//! Prometheus metrics instrumentation for isoprep.
//!
//! All metrics are conditionally compiled behind the `metrics` feature flag.
//!
//! # Metrics
//!
//! ## Counters
//! - `isoprep_jobs_submitted_total` - Preparation jobs handed to the pool
//! - `isoprep_jobs_finished_total` - Preparation jobs that reached a terminal state
//!
//! ## Gauges
//! - `isoprep_pool_threads` - Size of the current preparation pool
//!
//! ## Histograms
//! - `isoprep_job_duration_seconds` - Preparation job run time in seconds
#![cfg(feature = "metrics")]

use prometheus::{exponential_buckets, CounterVec, Gauge, HistogramVec, Opts, Registry};
use std::sync::LazyLock;

/// Global Prometheus registry for isoprep metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Labels: `job_name`.
pub static JOBS_SUBMITTED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "isoprep_jobs_submitted_total",
        "Total number of preparation jobs submitted",
    );
    CounterVec::new(opts, &["job_name"])
        .expect("isoprep_jobs_submitted_total metric creation failed")
});

/// Labels: `job_name`, `status` (completed, failed, cancelled).
pub static JOBS_FINISHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "isoprep_jobs_finished_total",
        "Total number of preparation jobs that finished",
    );
    CounterVec::new(opts, &["job_name", "status"])
        .expect("isoprep_jobs_finished_total metric creation failed")
});

pub static POOL_THREADS: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("isoprep_pool_threads", "Size of the preparation worker pool")
        .expect("isoprep_pool_threads metric creation failed")
});

/// Partitioning runs take minutes, so buckets start at one second.
pub static JOB_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(1.0, 2.0, 14).expect("bucket creation failed");
    let opts = prometheus::HistogramOpts::new(
        "isoprep_job_duration_seconds",
        "Preparation job duration in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["job_name", "status"])
        .expect("isoprep_job_duration_seconds metric creation failed")
});

/// Register every metric with [`REGISTRY`]. Safe to call repeatedly.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(JOBS_SUBMITTED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(JOBS_FINISHED_TOTAL.clone()),
        Box::new(POOL_THREADS.clone()),
        Box::new(JOB_DURATION_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            if !matches!(e, prometheus::Error::AlreadyReg) {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

pub fn record_job_submitted(job_name: &str) {
    JOBS_SUBMITTED_TOTAL.with_label_values(&[job_name]).inc();
}

pub fn record_job_finished(job_name: &str, status: &str) {
    JOBS_FINISHED_TOTAL
        .with_label_values(&[job_name, status])
        .inc();
}

pub fn set_pool_threads(threads: f64) {
    POOL_THREADS.set(threads);
}

pub fn observe_job_duration(job_name: &str, status: &str, duration_secs: f64) {
    JOB_DURATION_SECONDS
        .with_label_values(&[job_name, status])
        .observe(duration_secs);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init_metrics().expect("metrics initialization should succeed");
        init_metrics().expect("repeated initialization should succeed");
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().expect("metrics initialization should succeed");

        record_job_submitted("PreparePartition");
        record_job_finished("PreparePartition", "completed");
        observe_job_duration("PreparePartition", "completed", 3.5);
        set_pool_threads(2.0);

        let output = gather_metrics().expect("gather should succeed");
        assert!(output.contains("isoprep_jobs_submitted_total"));
        assert!(output.contains("isoprep_jobs_finished_total"));
        assert!(output.contains("isoprep_pool_threads"));
    }
}
