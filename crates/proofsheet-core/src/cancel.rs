use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Drive `fut` until it completes or `cancel` fires, whichever comes first.
///
/// A cancelled future is dropped at its current await point; work it handed to
/// other tasks (e.g. an in-flight HTTP request) is not awaited any further.
pub async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn returns_result_when_not_cancelled() {
        let token = CancellationToken::new();
        let out = until_cancelled(&token, async { Ok::<_, PipelineError>(7) }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_pending_future() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });
        let out: Result<(), _> = until_cancelled(&token, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;
        assert_eq!(out, Err(PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let out = until_cancelled(&token, async { Ok::<_, PipelineError>(1) }).await;
        assert_eq!(out, Err(PipelineError::Cancelled));
    }
}
