use std::sync::Arc;

use tracing::info;

use dtf_core::{keys, models::SubtaskResult, unix_now, SchedulerResult, StoreBatch};
use dtf_infrastructure::{OwnershipArbiter, TaskStore};

/// 每轮扫描的运行中子任务数
pub const SUBTASK_TIMEOUT_SCAN_COUNT: usize = 100;

/// 子任务超时监控
///
/// 认领运行中集合里截止时间已过的子任务，标记为超时并移入已完成集合。
pub struct SubtaskTimeoutMonitor {
    tasks: TaskStore,
    arbiter: Arc<OwnershipArbiter>,
}

impl SubtaskTimeoutMonitor {
    pub fn new(tasks: TaskStore, arbiter: Arc<OwnershipArbiter>) -> Self {
        Self { tasks, arbiter }
    }

    /// 返回本轮处理的超时子任务数
    pub async fn check(&self) -> SchedulerResult<usize> {
        let candidates = self
            .arbiter
            .get_timeout_elements(keys::RUNNING_SUBTASK_ZSET, SUBTASK_TIMEOUT_SCAN_COUNT)
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let owned = self
            .arbiter
            .try_to_own_elements(keys::RUNNING_SUBTASK_ZSET, &candidates)
            .await?;
        if owned.is_empty() {
            return Ok(0);
        }

        let now = unix_now();
        let mut batch = StoreBatch::atomic();
        for subtask_id in &owned {
            TaskStore::stage_subtask_result(&mut batch, *subtask_id, SubtaskResult::Timeout, now);
        }
        batch.zadd_all(
            keys::COMPLETED_SUBTASK_ZSET,
            owned.iter().map(|id| (now as f64, id.to_string())).collect(),
        );
        self.tasks.store().exec(batch).await?;

        metrics::counter!("dtf_timeout_subtasks_total").increment(owned.len() as u64);
        info!("处理超时的子任务: {}", owned.len());
        Ok(owned.len())
    }
}
