//! Tracing and telemetry instrumentation for isoprep.
//!
//! Helpers for creating tracing spans and recording metrics during the
//! preparation lifecycle. All functions work both with and without the
//! `metrics` feature flag; without it they only log.
//!
//! # Example
//!
//! ```ignore
//! use isoprep::telemetry::{job_span, record_job_start, record_job_end};
//!
//! let handle = record_job_start("PreparePartition");
//! // ... partitioning
//! record_job_end(handle, "completed");
//! ```

use std::future::Future;
use tracing::{info_span, Instrument, Span};

/// Create a span covering one `prepare()` call.
#[must_use]
pub fn prepare_span(run_id: impl AsRef<str>, job_count: usize, threads: usize) -> Span {
    info_span!(
        "isoprep.prepare",
        run_id = %run_id.as_ref(),
        job_count = job_count,
        threads = threads,
    )
}

/// Create a span covering the execution of a single preparation job.
///
/// The job name plays the role of a worker thread name.
#[must_use]
pub fn job_span(job_id: impl AsRef<str>, job_name: impl AsRef<str>) -> Span {
    info_span!(
        "isoprep.job",
        job_id = %job_id.as_ref(),
        job_name = %job_name.as_ref(),
    )
}

/// Create a span for handing a job to the worker pool.
#[must_use]
pub fn submit_span(job_name: impl AsRef<str>, threads: usize) -> Span {
    info_span!(
        "isoprep.submit",
        job_name = %job_name.as_ref(),
        threads = threads,
    )
}

/// Attach a job span to a future.
pub fn instrument_job<F>(
    job_id: impl AsRef<str>,
    job_name: impl AsRef<str>,
    future: F,
) -> impl Future<Output = F::Output>
where
    F: Future,
{
    future.instrument(job_span(job_id, job_name))
}

/// Record that a job was handed to the worker pool.
pub fn record_job_submitted(job_name: impl AsRef<str>) {
    tracing::debug!(job_name = %job_name.as_ref(), "preparation job submitted");

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_submitted(job_name.as_ref());
}

/// Record the terminal state of a job.
///
/// `status` is one of `completed`, `failed` or `cancelled`.
pub fn record_job_finished(job_name: impl AsRef<str>, status: impl AsRef<str>) {
    tracing::info!(
        job_name = %job_name.as_ref(),
        status = %status.as_ref(),
        "preparation job finished"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_finished(job_name.as_ref(), status.as_ref());
}

/// Update the worker pool size gauge.
pub fn set_pool_threads(threads: usize) {
    tracing::debug!(threads = threads, "preparation pool size updated");

    #[cfg(feature = "metrics")]
    crate::metrics::set_pool_threads(threads as f64);
}

/// Observe how long a job ran.
pub fn observe_job_duration(
    job_name: impl AsRef<str>,
    status: impl AsRef<str>,
    duration_secs: f64,
) {
    tracing::info!(
        job_name = %job_name.as_ref(),
        status = %status.as_ref(),
        duration_secs = duration_secs,
        "preparation job duration observed"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::observe_job_duration(job_name.as_ref(), status.as_ref(), duration_secs);
}

/// Start timing a job. Pass the handle to [`record_job_end`].
pub fn record_job_start(job_name: impl AsRef<str>) -> JobTimingHandle {
    JobTimingHandle {
        job_name: job_name.as_ref().to_string(),
        start: std::time::Instant::now(),
    }
}

/// Stop timing a job and report the duration.
pub fn record_job_end(handle: JobTimingHandle, status: impl AsRef<str>) {
    let duration_secs = handle.start.elapsed().as_secs_f64();
    observe_job_duration(&handle.job_name, status, duration_secs);
}

/// Opaque handle returned by [`record_job_start`].
#[derive(Debug)]
pub struct JobTimingHandle {
    job_name: String,
    start: std::time::Instant,
}

impl JobTimingHandle {
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_subscriber<T>(f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    #[test]
    fn test_prepare_span() {
        with_subscriber(|| {
            let span = prepare_span("run-1", 1, 2);
            assert_eq!(span.metadata().unwrap().name(), "isoprep.prepare");
        });
    }

    #[test]
    fn test_job_span() {
        with_subscriber(|| {
            let span = job_span("job-123", "PreparePartition");
            assert_eq!(span.metadata().unwrap().name(), "isoprep.job");
        });
    }

    #[test]
    fn test_submit_span() {
        with_subscriber(|| {
            let span = submit_span("PreparePartition", 4);
            assert_eq!(span.metadata().unwrap().name(), "isoprep.submit");
        });
    }

    #[test]
    fn test_timing_handle() {
        let handle = record_job_start("PreparePartition");
        assert_eq!(handle.job_name(), "PreparePartition");

        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(handle.elapsed().as_nanos() > 0);

        record_job_end(handle, "completed");
    }
}
