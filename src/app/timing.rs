use std::future::Future;
use std::time::Instant;

use crate::app::ports::{UseCaseLogPort, UseCaseTiming};

/// Runs `operation`, then reports how long it took and whether it
/// succeeded. The result is handed back untouched.
pub async fn timed<T, E, F>(use_case: &'static str, logger: &dyn UseCaseLogPort, operation: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = operation.await;
    let runtime_in_ms = start.elapsed().as_secs_f64() * 1000.0;
    logger.log_use_case_time(&UseCaseTiming {
        use_case,
        runtime_in_ms,
        is_success: result.is_ok(),
    });
    result
}
