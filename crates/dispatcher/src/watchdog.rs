//! 调度中任务的看门狗
//!
//! 任务从调度队列弹出后登记到全局的"当前任务"有序集合，分数为截止时间；
//! 调度结束、任务放回队列时移除。节点在两者之间崩溃时，任务既不在任何队列中，
//! 也不会被移出看门狗集合，丢失任务监控在截止时间过后认领并把任务放回原队列。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use dtf_core::{keys, models::TaskId, unix_now, SchedulerResult, StoreBatch};
use dtf_infrastructure::{OwnershipArbiter, TaskStore};

/// 看门狗集合的读写
#[derive(Debug, Clone, Copy)]
pub struct CurrentTaskWatchdog {
    timeout: Duration,
}

impl CurrentTaskWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn deadline(&self) -> f64 {
        (unix_now() + self.timeout.as_secs() as i64) as f64
    }

    pub fn stage_register(&self, batch: &mut StoreBatch, task_id: TaskId) {
        batch.zadd(keys::CURRENT_TASK_ZSET, self.deadline(), task_id.to_string());
    }

    pub fn stage_register_all(&self, batch: &mut StoreBatch, task_ids: &[TaskId]) {
        if task_ids.is_empty() {
            return;
        }
        let deadline = self.deadline();
        let members = task_ids
            .iter()
            .map(|task_id| (deadline, task_id.to_string()))
            .collect();
        batch.zadd_all(keys::CURRENT_TASK_ZSET, members);
    }

    pub fn stage_release(&self, batch: &mut StoreBatch, task_id: TaskId) {
        batch.zrem(keys::CURRENT_TASK_ZSET, task_id.to_string());
    }
}

/// 丢失任务监控
pub struct LostTaskMonitor {
    tasks: TaskStore,
    arbiter: Arc<OwnershipArbiter>,
    scan_count: usize,
}

impl LostTaskMonitor {
    pub fn new(tasks: TaskStore, arbiter: Arc<OwnershipArbiter>, scan_count: usize) -> Self {
        Self {
            tasks,
            arbiter,
            scan_count,
        }
    }

    /// 认领超时的当前任务并放回其最后所在的队列，返回恢复的任务数
    pub async fn recover_lost_tasks(&self) -> SchedulerResult<usize> {
        let candidates = self
            .arbiter
            .get_timeout_elements(keys::CURRENT_TASK_ZSET, self.scan_count)
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let owned = self
            .arbiter
            .try_to_own_elements(keys::CURRENT_TASK_ZSET, &candidates)
            .await?;

        let mut batch = StoreBatch::new();
        let mut recovered = 0;
        for task_id in owned {
            match self.tasks.get_schedule_data(task_id).await {
                Ok(Some(data)) => {
                    debug!("放回丢失的任务: {} -> {}", task_id, data.current_queue_key_name);
                    batch.rpush(data.current_queue_key_name, task_id.to_string());
                    recovered += 1;
                }
                Ok(None) => warn!("丢失的任务没有调度数据, 放弃恢复: {}", task_id),
                Err(e) => warn!("读取丢失任务的调度数据失败: {}, {}", task_id, e),
            }
        }

        if batch.is_empty() {
            return Ok(0);
        }
        self.tasks.store().exec(batch).await?;

        metrics::counter!("dtf_recovered_tasks_total").increment(recovered as u64);
        info!("恢复丢失的调度任务: {}", recovered);
        Ok(recovered)
    }
}
