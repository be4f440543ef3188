//! Metric instrument factories for workq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"workq"` meter; without a
//! provider they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for workq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("workq")
}

/// Counter: jobs dispatched.
/// Labels: `job_name`, `result` ("ok" | "error").
pub fn jobs_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("workq.job.dispatched")
        .with_description("Number of jobs dispatched")
        .build()
}

/// Counter: how a claimed job left the worker.
/// Labels: `outcome` ("deferred" | "unroutable" | "succeeded" | "exhausted"
/// | "retrying" | "dead_lettered").
pub fn job_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("workq.job.outcomes")
        .with_description("Number of claimed jobs by outcome")
        .build()
}

/// Counter: lifecycle notifications seen by the tracing observer.
/// Labels: `event`, `job_name`.
pub fn job_events() -> Counter<u64> {
    meter()
        .u64_counter("workq.job.events")
        .with_description("Number of job lifecycle events")
        .build()
}

/// Counter: observer hooks that returned an error or panicked.
/// Labels: `event`.
pub fn observer_failures() -> Counter<u64> {
    meter()
        .u64_counter("workq.observer.failures")
        .with_description("Number of failed observer deliveries")
        .build()
}

/// Counter: storage port calls.
/// Labels: `backend`, `operation`.
pub fn storage_operations() -> Counter<u64> {
    meter()
        .u64_counter("workq.storage.operations")
        .with_description("Number of storage operations")
        .build()
}

/// Histogram: handler execution duration in milliseconds.
/// Labels: `job_name`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("workq.job.duration_ms")
        .with_description("Handler execution duration in milliseconds")
        .with_unit("ms")
        .build()
}
