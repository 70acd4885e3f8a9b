use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use dtf_core::{keys, models::TaskId, SchedulerResult, StoreBatch};
use dtf_infrastructure::{OwnershipArbiter, TaskStore};

/// 每轮清理的已结束任务数
pub const TASK_CLEANUP_SCAN_COUNT: usize = 5;
/// 已结束任务的子任务集合和生成进度保留时间
pub const FINISHED_TASK_RETENTION: Duration = Duration::from_secs(3600);

/// 已结束任务清理
///
/// 认领已完成任务集合里的任务，从超时、生成中、运行中和待生成集合中移除，
/// 删除剩余的生成队列。任务信息保留到自身过期。
pub struct TaskCleanupMonitor {
    tasks: TaskStore,
    arbiter: Arc<OwnershipArbiter>,
}

impl TaskCleanupMonitor {
    pub fn new(tasks: TaskStore, arbiter: Arc<OwnershipArbiter>) -> Self {
        Self { tasks, arbiter }
    }

    /// 返回本轮清理的任务数
    pub async fn check(&self) -> SchedulerResult<usize> {
        let candidates = self
            .arbiter
            .get_timeout_elements(keys::COMPLETED_TASK_ZSET, TASK_CLEANUP_SCAN_COUNT)
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let owned = self
            .arbiter
            .try_to_own_elements(keys::COMPLETED_TASK_ZSET, &candidates)
            .await?;
        if owned.is_empty() {
            return Ok(0);
        }

        let mut batch = StoreBatch::atomic();
        for task_id in &owned {
            Self::stage_cleanup(&mut batch, *task_id);
        }
        self.tasks.store().exec(batch).await?;

        info!("清理已结束的任务: {:?}", owned);
        Ok(owned.len())
    }

    fn stage_cleanup(batch: &mut StoreBatch, task_id: TaskId) {
        let member = task_id.to_string();
        batch
            .zrem(keys::TASK_TIMEOUT_ZSET, member.clone())
            .zrem(keys::GENERATING_TASK_ZSET, member.clone())
            .zrem(keys::RUNNING_TASK_ZSET, member.clone())
            .zrem(keys::TO_GENERATE_TASK_ZSET, member)
            .del(keys::generation_queue_key(task_id))
            .expire(keys::task_subtask_set_key(task_id), FINISHED_TASK_RETENTION)
            .expire(keys::generation_progress_key(task_id), FINISHED_TASK_RETENTION);
    }
}
