use std::sync::Arc;

use tracing::{debug, error, warn};

use dtf_core::{
    keys,
    models::{SubtaskId, SubtaskResult},
    unix_now, SchedulerResult, StoreBatch,
};
use dtf_infrastructure::{OwnershipArbiter, TaskStore};

/// 每轮处理的已完成子任务数
pub const SUBTASK_COMPLETE_SCAN_COUNT: usize = 100;

/// 子任务完成监控
///
/// 认领已完成集合中的子任务，从任务的子任务集合中移除并累加任务的完成计数。
pub struct SubtaskCompleteMonitor {
    tasks: TaskStore,
    arbiter: Arc<OwnershipArbiter>,
}

impl SubtaskCompleteMonitor {
    pub fn new(tasks: TaskStore, arbiter: Arc<OwnershipArbiter>) -> Self {
        Self { tasks, arbiter }
    }

    /// 返回本轮收尾的子任务数
    ///
    /// 先读取子任务信息再逐个认领，读取失败的子任务留在已完成集合中等下一轮，
    /// 不影响同一轮的其他子任务。
    pub async fn check(&self) -> SchedulerResult<usize> {
        let candidates = self
            .arbiter
            .get_elements(keys::COMPLETED_SUBTASK_ZSET, SUBTASK_COMPLETE_SCAN_COUNT)
            .await?;

        let mut finalized = 0;
        for subtask_id in candidates {
            match self.finalize(subtask_id).await {
                Ok(true) => finalized += 1,
                Ok(false) => {}
                Err(e) => warn!("收尾已完成的子任务失败: {}, {}", subtask_id, e),
            }
        }

        if finalized > 0 {
            debug!("收尾已完成的子任务: {}", finalized);
        }
        Ok(finalized)
    }

    async fn finalize(&self, subtask_id: SubtaskId) -> SchedulerResult<bool> {
        let task_id = self.tasks.get_subtask_task_id(subtask_id).await?;
        let result = self.tasks.get_subtask_result(subtask_id).await?;

        if !self
            .arbiter
            .try_to_own_element(keys::COMPLETED_SUBTASK_ZSET, subtask_id)
            .await?
        {
            return Ok(false);
        }

        // 子任务信息已过期，任务的子任务集合由任务完成监控的强制完成兜底
        let Some(task_id) = task_id else {
            warn!("已完成的子任务没有子任务信息, 丢弃: {}", subtask_id);
            return Ok(false);
        };

        let info_key = keys::task_info_key(task_id);
        let mut batch = StoreBatch::atomic();
        batch
            .zrem(keys::task_subtask_set_key(task_id), subtask_id.to_string())
            .hincr_by(info_key.clone(), keys::TASK_FIELD_COMPLETED, 1);
        if result == Some(SubtaskResult::Timeout) {
            batch.hincr_by(info_key, keys::TASK_FIELD_TIMEOUT, 1);
        }

        if let Err(e) = self.tasks.store().exec(batch).await {
            // 放回已完成集合，下一轮重新认领
            let score = unix_now() as f64;
            if let Err(restore_err) = self
                .tasks
                .store()
                .zadd(keys::COMPLETED_SUBTASK_ZSET, score, &subtask_id.to_string())
                .await
            {
                error!("子任务放回已完成集合失败: {}, {}", subtask_id, restore_err);
            }
            return Err(e);
        }
        Ok(true)
    }
}
