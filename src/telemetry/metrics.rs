//! Metric instruments for joblock.
//!
//! Created from the `"joblock"` meter on the globally registered
//! `MeterProvider`. Without a provider these are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("joblock")
}

/// Counter: execution lock attempts.
/// Labels: `job_type`, `result` ("acquired" | "denied").
pub fn lock_attempts() -> Counter<u64> {
    meter()
        .u64_counter("joblock.lock.attempts")
        .with_description("Execution lock acquire attempts")
        .build()
}

/// Counter: execution lock outcomes after the job body.
/// Labels: `job_type`, `result` ("released" | "expired").
pub fn lock_releases() -> Counter<u64> {
    meter()
        .u64_counter("joblock.lock.releases")
        .with_description("Execution lock release decisions")
        .build()
}

/// Counter: singleton admission attempts.
/// Labels: `job_type`, `result` ("admitted" | "denied").
pub fn admission_attempts() -> Counter<u64> {
    meter()
        .u64_counter("joblock.admission.attempts")
        .with_description("Singleton admission attempts")
        .build()
}

/// Counter: store primitive calls.
/// Labels: `operation`.
pub fn store_operations() -> Counter<u64> {
    meter()
        .u64_counter("joblock.store.operations")
        .with_description("Store primitive calls")
        .build()
}

/// Histogram: how long the execution lock was held, in milliseconds.
/// Labels: `job_type`.
pub fn lock_held_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("joblock.lock.held_ms")
        .with_description("Execution lock hold time in milliseconds")
        .with_unit("ms")
        .build()
}
