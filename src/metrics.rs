//! Lightweight metrics helpers for fnly.
//!
//! Thin wrappers over the `metrics` crate macros plus RAII timers. No
//! exporter is installed here; an embedding application may install any
//! compatible recorder. Without one every call is a no-op.
//!
//! Provided metrics:
//! * `fnly_requests_total` (counter; path, method, status)
//! * `fnly_request_duration_seconds` (histogram; path, method)
//! * `fnly_route_rebuilds_total` (counter; outcome)
//! * `fnly_route_table_size` (gauge)
//! * `fnly_builds_total` (counter; outcome)
//! * `fnly_build_duration_seconds` (histogram)
use std::time::{Duration, Instant};

use ::metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

pub const FNLY_REQUESTS_TOTAL: &str = "fnly_requests_total";
pub const FNLY_REQUEST_DURATION_SECONDS: &str = "fnly_request_duration_seconds";
pub const FNLY_ROUTE_REBUILDS_TOTAL: &str = "fnly_route_rebuilds_total";
pub const FNLY_ROUTE_TABLE_SIZE: &str = "fnly_route_table_size";
pub const FNLY_BUILDS_TOTAL: &str = "fnly_builds_total";
pub const FNLY_BUILD_DURATION_SECONDS: &str = "fnly_build_duration_seconds";

/// Outcome label for rebuilds and builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        FNLY_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests served by the dev server."
    );
    describe_histogram!(
        FNLY_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of requests served by the dev server, including handler execution."
    );
    describe_counter!(
        FNLY_ROUTE_REBUILDS_TOTAL,
        Unit::Count,
        "Route table rebuilds triggered by file changes (by outcome)."
    );
    describe_gauge!(FNLY_ROUTE_TABLE_SIZE, "Number of routes in the installed table.");
    describe_counter!(FNLY_BUILDS_TOTAL, Unit::Count, "Production builds (by outcome).");
    describe_histogram!(
        FNLY_BUILD_DURATION_SECONDS,
        Unit::Seconds,
        "Wall time of production builds."
    );
});

/// Register metric descriptions (idempotent).
pub fn init_metrics() {
    Lazy::force(&DESCRIPTIONS);
    tracing::debug!("fnly metrics described");
}

pub fn increment_request_total(path: &str, method: &str, status: u16) {
    counter!(
        FNLY_REQUESTS_TOTAL,
        "path" => path.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_request_duration(path: &str, method: &str, duration: Duration) {
    histogram!(
        FNLY_REQUEST_DURATION_SECONDS,
        "path" => path.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn increment_route_rebuild(outcome: Outcome) {
    counter!(FNLY_ROUTE_REBUILDS_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

pub fn set_route_table_size(size: usize) {
    gauge!(FNLY_ROUTE_TABLE_SIZE).set(size as f64);
}

pub fn increment_build_total(outcome: Outcome) {
    counter!(FNLY_BUILDS_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

/// RAII helper measuring dev request duration.
///
/// The path label is the matched route pattern, not the raw request path,
/// to keep label cardinality bounded.
pub struct RequestTimer {
    start: Instant,
    path: String,
    method: String,
}

impl RequestTimer {
    pub fn new(path: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            path: path.to_string(),
            method: method.to_string(),
        }
    }

    pub fn set_path(&mut self, path: &str) {
        self.path = path.to_string();
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.path, &self.method, self.start.elapsed());
    }
}

/// RAII helper measuring a production build.
pub struct BuildTimer {
    start: Instant,
}

impl BuildTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for BuildTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BuildTimer {
    fn drop(&mut self) {
        histogram!(FNLY_BUILD_DURATION_SECONDS).record(self.start.elapsed().as_secs_f64());
    }
}
