use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use dtf_core::{
    keys,
    models::{TaskId, TaskStatus},
    unix_now, SchedulerResult, StoreBatch,
};
use dtf_infrastructure::{GenerationQueue, OwnershipArbiter, TaskStore};

use super::random_window;

/// 每轮检查的运行中任务数
pub const TASK_COMPLETE_SCAN_COUNT: usize = 10;
/// 任务的最长存活时间，超过后直接结束
pub const TASK_MAX_LIFETIME: Duration = Duration::from_secs(24 * 3600);

/// 任务完成监控
///
/// 生成已完成、子任务集合和生成队列都为空的任务，或者存在超过最长存活时间的任务，
/// 认领后移入已完成任务集合并标记为已完成。
pub struct TaskCompleteMonitor {
    tasks: TaskStore,
    generation: GenerationQueue,
    arbiter: Arc<OwnershipArbiter>,
}

impl TaskCompleteMonitor {
    pub fn new(tasks: TaskStore, arbiter: Arc<OwnershipArbiter>) -> Self {
        Self {
            generation: GenerationQueue::new(tasks.store().clone()),
            tasks,
            arbiter,
        }
    }

    pub async fn is_task_completed(&self, task_id: TaskId) -> SchedulerResult<bool> {
        match self.tasks.get_create_time(task_id).await? {
            Some(create_time) if unix_now() - create_time <= TASK_MAX_LIFETIME.as_secs() as i64 => {}
            Some(_) => {
                warn!("任务超过最长存活时间: {}", task_id);
                return Ok(true);
            }
            None => {
                warn!("任务没有创建时间: {}", task_id);
                return Ok(true);
            }
        }

        Ok(self.tasks.is_generation_completed(task_id).await?
            && self.tasks.task_subtask_count(task_id).await? == 0
            && self.generation.is_empty(task_id).await?)
    }

    /// 返回本轮完成的任务数
    pub async fn check(&self) -> SchedulerResult<usize> {
        let candidates = random_window(
            self.tasks.store().as_ref(),
            keys::RUNNING_TASK_ZSET,
            TASK_COMPLETE_SCAN_COUNT,
        )
        .await?;

        let mut completed = 0;
        for task_id in candidates {
            if !self.is_task_completed(task_id).await? {
                continue;
            }
            if !self
                .arbiter
                .try_to_own_element(keys::RUNNING_TASK_ZSET, task_id)
                .await?
            {
                continue;
            }

            let mut batch = StoreBatch::atomic();
            batch.zadd(keys::COMPLETED_TASK_ZSET, unix_now() as f64, task_id.to_string());
            TaskStore::stage_task_status(&mut batch, task_id, TaskStatus::Completed);
            self.tasks.store().exec(batch).await?;

            let counters = self.tasks.get_counters(task_id).await?;
            info!(
                "任务完成: {}, 子任务总数 {}, 完成 {}, 超时 {}",
                task_id, counters.total, counters.completed, counters.timeout
            );
            completed += 1;
        }
        Ok(completed)
    }
}
