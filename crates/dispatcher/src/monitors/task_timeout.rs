use std::sync::Arc;

use tracing::{debug, info};

use dtf_core::{
    keys,
    models::{TaskId, TaskStatus},
    unix_now, SchedulerResult, StoreBatch,
};
use dtf_infrastructure::{OwnershipArbiter, TaskStore};

/// 每轮处理的超时任务数
pub const TASK_TIMEOUT_SCAN_COUNT: usize = 5;

/// 任务超时监控
///
/// 认领超时集合里截止时间已过的任务，移入已完成任务集合并标记为异常结束。
/// 已经正常结束的任务只移除超时记录。
pub struct TaskTimeoutMonitor {
    tasks: TaskStore,
    arbiter: Arc<OwnershipArbiter>,
}

impl TaskTimeoutMonitor {
    pub fn new(tasks: TaskStore, arbiter: Arc<OwnershipArbiter>) -> Self {
        Self { tasks, arbiter }
    }

    /// 返回本轮标记为超时的任务数
    pub async fn check(&self) -> SchedulerResult<usize> {
        let candidates = self
            .arbiter
            .get_timeout_elements(keys::TASK_TIMEOUT_ZSET, TASK_TIMEOUT_SCAN_COUNT)
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let owned = self
            .arbiter
            .try_to_own_elements(keys::TASK_TIMEOUT_ZSET, &candidates)
            .await?;

        let mut expired = 0;
        for task_id in owned {
            if self.expire_task(task_id).await? {
                expired += 1;
            }
        }
        if expired > 0 {
            metrics::counter!("dtf_timeout_tasks_total").increment(expired as u64);
        }
        Ok(expired)
    }

    async fn expire_task(&self, task_id: TaskId) -> SchedulerResult<bool> {
        // 与任务完成监控竞争运行中集合里的成员，只有一方能结束任务
        let was_running = self
            .arbiter
            .try_to_own_element(keys::RUNNING_TASK_ZSET, task_id)
            .await?;
        if !was_running {
            match self.tasks.get_task_status(task_id).await? {
                Some(status) if !status.is_terminal() => {}
                status => {
                    debug!("任务已结束, 忽略超时: {}, {:?}", task_id, status);
                    return Ok(false);
                }
            }
        }

        let mut batch = StoreBatch::atomic();
        batch.zadd(keys::COMPLETED_TASK_ZSET, unix_now() as f64, task_id.to_string());
        TaskStore::stage_task_status(&mut batch, task_id, TaskStatus::Exceptional);
        self.tasks.store().exec(batch).await?;

        let counters = self.tasks.get_counters(task_id).await?;
        info!(
            "任务超时: {}, 子任务总数 {}, 完成 {}, 超时 {}",
            task_id, counters.total, counters.completed, counters.timeout
        );
        Ok(true)
    }
}
