//! Metric instrument factories for homefin-dispatch.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider the instruments are no-ops, so the dispatch core
//! records unconditionally.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};

/// Returns the shared meter for homefin-dispatch instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("homefin-dispatch")
}

/// Counter: work items admitted to the queue.
/// Labels: `job_tag`.
pub fn dispatch_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.enqueued")
        .with_description("Number of work items admitted to the dispatch queue")
        .build()
}

/// Counter: enqueue attempts rejected because the queue was full.
/// Labels: `job_tag`.
pub fn dispatch_rejected() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.rejected")
        .with_description("Number of enqueue attempts rejected by backpressure")
        .build()
}

/// Counter: dequeued work items by outcome.
/// Labels: `job_tag`, `outcome` ("succeeded" | "construction_failed" | "failed" | "cancelled" | "interrupted").
pub fn dispatch_jobs() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.jobs")
        .with_description("Number of dispatched jobs by outcome")
        .build()
}

/// Histogram: job run time in milliseconds.
/// Labels: `job_tag`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("dispatch.job.duration_ms")
        .with_description("Job execution duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Gauge: pending work items, sampled by the worker loop.
pub fn queue_depth() -> Gauge<u64> {
    meter()
        .u64_gauge("dispatch.queue.depth")
        .with_description("Pending work items in the dispatch queue")
        .build()
}
