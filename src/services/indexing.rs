//! 索引等待
//!
//! 把"轮询直到完成"表达为一个带显式间隔与总超时的阻塞调用。

use std::future::Future;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{PhaseError, PhaseResult};
use crate::services::provider::PollOptions;

/// 反复调用 `check`，直到返回 `true`
///
/// - `check` 返回错误时立即向上传播
/// - 超过 `poll.timeout` 仍未完成时返回可重试的 `IndexingTimeout`
pub async fn poll_until<F, Fut>(container_tag: &str, poll: &PollOptions, mut check: F) -> PhaseResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PhaseResult<bool>>,
{
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;
        if check().await? {
            debug!(
                "[{}] 索引完成，轮询 {} 次，耗时 {}ms",
                container_tag,
                polls,
                started.elapsed().as_millis()
            );
            return Ok(());
        }

        let elapsed = started.elapsed();
        if elapsed >= poll.timeout {
            return Err(PhaseError::IndexingTimeout {
                container_tag: container_tag.to_string(),
                waited_ms: elapsed.as_millis() as u64,
            });
        }

        sleep(poll.interval.min(poll.timeout - elapsed)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn poll(interval_ms: u64, timeout_ms: u64) -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_ready() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        poll_until("tag", &poll(100, 10_000), move || async move {
            Ok(counter.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_times_out() {
        let err = poll_until("tag", &poll(100, 350), || async { Ok(false) })
            .await
            .unwrap_err();
        match err {
            PhaseError::IndexingTimeout {
                container_tag,
                waited_ms,
            } => {
                assert_eq!(container_tag, "tag");
                assert!(waited_ms >= 350);
            }
            other => panic!("期望 IndexingTimeout，实际为 {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_propagates_errors() {
        let err = poll_until("tag", &poll(100, 1000), || async {
            Err(PhaseError::NotFound("task".to_string()))
        })
        .await
        .unwrap_err();
        assert_eq!(err, PhaseError::NotFound("task".to_string()));
    }
}
