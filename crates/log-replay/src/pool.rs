//! 고정 크기 blocking 워커 풀
//!
//! 파일 I/O 작업(통계, 빌드, 탐색)을 `workers`개의 blocking 스레드로 나누어 실행합니다.
//! 작업 항목은 공유 큐에서 하나씩 꺼내며, 각 워커는 결과를 모아 반환합니다.
//! 결과 순서는 보장하지 않으므로 호출자가 키로 재배치합니다.

use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::trace;

use crate::error::LogReplayError;

/// 항목마다 `job`을 실행하고 모든 결과를 반환합니다.
///
/// 워커 수는 1 이상, 항목 수 이하로 조정됩니다.
/// 워커 태스크가 panic 하면 [`LogReplayError::Worker`]를 반환합니다.
pub(crate) async fn run_blocking<T, R, F>(
    items: Vec<T>,
    workers: usize,
    job: F,
) -> Result<Vec<R>, LogReplayError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let total = items.len();
    let workers = workers.clamp(1, total);
    let queue = Arc::new(Mutex::new(items.into_iter()));
    let job = Arc::new(job);
    let mut set = JoinSet::new();

    for worker in 0..workers {
        let queue = Arc::clone(&queue);
        let job = Arc::clone(&job);
        set.spawn_blocking(move || {
            trace!(worker, "spawning worker");
            let mut results = Vec::new();
            loop {
                let next = match queue.lock() {
                    Ok(mut guard) => guard.next(),
                    Err(poisoned) => poisoned.into_inner().next(),
                };
                let Some(item) = next else {
                    break;
                };
                results.push(job(item));
            }
            trace!(worker, processed = results.len(), "worker exited");
            results
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = set.join_next().await {
        let batch = joined.map_err(|e| LogReplayError::Worker(format!("worker task failed: {e}")))?;
        results.extend(batch);
    }
    Ok(results)
}
