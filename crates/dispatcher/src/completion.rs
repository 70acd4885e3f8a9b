use std::sync::Arc;

use tracing::debug;

use dtf_core::{
    keys,
    models::{SubtaskId, SubtaskResult},
    unix_now, SchedulerResult, StoreBatch,
};
use dtf_infrastructure::{OwnershipArbiter, TaskStore};

/// 子任务结果上报
///
/// 从运行中集合认领子任务后写入结果并加入已完成集合。
/// 超时监控已经认领的子任务，迟到的上报不会产生任何修改。
pub struct SubtaskCompletion {
    tasks: TaskStore,
    arbiter: Arc<OwnershipArbiter>,
}

impl SubtaskCompletion {
    pub fn new(tasks: TaskStore, arbiter: Arc<OwnershipArbiter>) -> Self {
        Self { tasks, arbiter }
    }

    /// 上报子任务结果，子任务已不在运行中时返回 false
    pub async fn report(&self, subtask_id: SubtaskId, result: SubtaskResult) -> SchedulerResult<bool> {
        if !self
            .arbiter
            .try_to_own_element(keys::RUNNING_SUBTASK_ZSET, subtask_id)
            .await?
        {
            debug!("子任务已不在运行中, 忽略结果: {}, {:?}", subtask_id, result);
            return Ok(false);
        }

        let now = unix_now();
        let mut batch = StoreBatch::atomic();
        TaskStore::stage_subtask_result(&mut batch, subtask_id, result, now);
        batch.zadd(keys::COMPLETED_SUBTASK_ZSET, now as f64, subtask_id.to_string());
        self.tasks.store().exec(batch).await?;

        debug!("子任务完成: {}, {:?}", subtask_id, result);
        Ok(true)
    }
}
