//! Metrics emitted by the renderer and the sweeper.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const GENERATIONS_TOTAL: &str = "vgen_generations_total";
    pub const FFMPEG_DURATION_SECONDS: &str = "vgen_ffmpeg_duration_seconds";
    pub const SWEEP_RUNS_TOTAL: &str = "vgen_sweep_runs_total";
    pub const ARTIFACTS_DELETED_TOTAL: &str = "vgen_artifacts_deleted_total";
    pub const SWEEP_ERRORS_TOTAL: &str = "vgen_sweep_errors_total";
}

/// Record one finished generation.
pub fn record_generation(outcome: &'static str, duration_secs: f64) {
    counter!(names::GENERATIONS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::FFMPEG_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

/// Record one sweep run.
pub fn record_sweep(completed: bool, deleted: u64, errors: u64) {
    let status = if completed { "completed" } else { "skipped" };
    counter!(names::SWEEP_RUNS_TOTAL, "status" => status).increment(1);
    counter!(names::ARTIFACTS_DELETED_TOTAL).increment(deleted);
    counter!(names::SWEEP_ERRORS_TOTAL).increment(errors);
}
