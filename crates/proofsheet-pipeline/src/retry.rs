//! Bounded retry with exponential backoff.
//!
//! Only errors that report themselves recoverable (transient upload failures)
//! are retried. Quota rejections, permanent upload errors and cancellation
//! return immediately. Backoff sleeps race the cancellation token.

use std::future::Future;

use proofsheet_core::{BackoffPolicy, ErrorMetadata, PipelineError};
use tokio_util::sync::CancellationToken;

/// Run `op` until it succeeds, fails permanently, exhausts
/// `policy.max_attempts` or `cancel` fires. `op` receives the 0-based attempt.
pub async fn with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
    operation: &'static str,
    mut op: F,
) -> Result<T, PipelineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(operation, attempts = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_recoverable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation,
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, backing off"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => {
                if e.is_recoverable() {
                    tracing::error!(
                        operation,
                        error = %e,
                        attempts = attempt + 1,
                        "Giving up after maximum attempts"
                    );
                }
                return Err(e);
            }
        }
    }
}
