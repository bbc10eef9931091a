use tracing::info;

use crate::app::ports::{UseCaseLogPort, UseCaseTiming};

/// Reports use case timings as tracing events and duration metrics.
pub struct TracingUseCaseLogger;

impl UseCaseLogPort for TracingUseCaseLogger {
    fn log_use_case_time(&self, timing: &UseCaseTiming) {
        info!(
            use_case = timing.use_case,
            runtime_in_ms = timing.runtime_in_ms,
            is_success = timing.is_success,
            "{} took +{:.3} ms to execute!",
            timing.use_case,
            timing.runtime_in_ms
        );
        crate::metrics::use_case::duration(timing.use_case, timing.runtime_in_ms, timing.is_success);
    }
}
