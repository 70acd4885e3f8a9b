use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use dtf_core::{
    keys,
    models::{SubtaskData, TaskId},
    CoordinationStore, SchedulerResult, StoreBatch,
};

/// 生成队列的存活时间
pub const GENERATION_QUEUE_TTL: Duration = Duration::from_secs(8 * 3600);

/// 任务的子任务生成队列
///
/// 生成器产生的子任务从队尾推入，调度时从队头取出，保证单个任务的子任务按生成顺序分发。
#[derive(Clone)]
pub struct GenerationQueue {
    store: Arc<dyn CoordinationStore>,
}

impl GenerationQueue {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// 推入新生成的子任务，同时累加任务的子任务总数
    pub async fn push(&self, subtask: &SubtaskData) -> SchedulerResult<()> {
        let key = keys::generation_queue_key(subtask.task_id);
        let mut batch = StoreBatch::atomic();
        batch
            .rpush(key.clone(), serde_json::to_string(subtask)?)
            .expire(key, GENERATION_QUEUE_TTL)
            .hincr_by(keys::task_info_key(subtask.task_id), keys::TASK_FIELD_TOTAL, 1);
        self.store.exec(batch).await?;
        Ok(())
    }

    /// 将未能分发的子任务放回生成队列的队头，保持原有的分发顺序
    pub async fn push_back(&self, subtasks: &[SubtaskData]) -> SchedulerResult<()> {
        if subtasks.is_empty() {
            return Ok(());
        }

        let mut batch = StoreBatch::new();
        // 逆序从队头推入，放回后第一个子任务位于队头
        for subtask in subtasks.iter().rev() {
            let key = keys::generation_queue_key(subtask.task_id);
            match serde_json::to_string(subtask) {
                Ok(json) => {
                    batch.lpush(key.clone(), json).expire(key, GENERATION_QUEUE_TTL);
                }
                Err(e) => warn!("序列化子任务失败: {}, {}", subtask.subtask_id, e),
            }
        }
        self.store.exec(batch).await?;
        debug!("放回生成队列的子任务数量: {}", subtasks.len());
        Ok(())
    }

    /// 从队头取出一个子任务，无法解析的数据会被丢弃
    pub async fn pop(&self, task_id: TaskId) -> SchedulerResult<Option<SubtaskData>> {
        let key = keys::generation_queue_key(task_id);
        loop {
            let Some(json) = self.store.lpop(&key).await? else {
                return Ok(None);
            };
            match serde_json::from_str::<SubtaskData>(&json) {
                Ok(subtask) => return Ok(Some(subtask)),
                Err(e) => warn!("丢弃无法解析的子任务数据: {}, {}", task_id, e),
            }
        }
    }

    pub async fn len(&self, task_id: TaskId) -> SchedulerResult<i64> {
        self.store.llen(&keys::generation_queue_key(task_id)).await
    }

    pub async fn is_empty(&self, task_id: TaskId) -> SchedulerResult<bool> {
        Ok(self.len(task_id).await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_store::InMemoryCoordinationStore;

    #[tokio::test]
    async fn test_fifo_order_and_total_counter() {
        let memory = InMemoryCoordinationStore::new();
        let queue = GenerationQueue::new(Arc::new(memory.clone()));

        for id in 1..=3 {
            queue.push(&SubtaskData::new(id, 7, 1)).await.unwrap();
        }
        assert_eq!(queue.len(7).await.unwrap(), 3);
        assert_eq!(
            memory
                .hget(&keys::task_info_key(7), keys::TASK_FIELD_TOTAL)
                .await
                .unwrap()
                .as_deref(),
            Some("3")
        );

        assert_eq!(queue.pop(7).await.unwrap().unwrap().subtask_id, 1);
        assert_eq!(queue.pop(7).await.unwrap().unwrap().subtask_id, 2);

        // 放回的子任务按原顺序回到队头，且不重复计数
        queue
            .push_back(&[SubtaskData::new(1, 7, 1), SubtaskData::new(2, 7, 1)])
            .await
            .unwrap();
        assert_eq!(queue.pop(7).await.unwrap().unwrap().subtask_id, 1);
        assert_eq!(queue.pop(7).await.unwrap().unwrap().subtask_id, 2);
        assert_eq!(queue.pop(7).await.unwrap().unwrap().subtask_id, 3);
        assert!(queue.pop(7).await.unwrap().is_none());
        assert!(queue.is_empty(7).await.unwrap());
    }

    #[tokio::test]
    async fn test_pop_skips_corrupt_entries() {
        let memory = InMemoryCoordinationStore::new();
        let queue = GenerationQueue::new(Arc::new(memory.clone()));
        memory
            .rpush(&keys::generation_queue_key(1), "not json")
            .await
            .unwrap();
        queue.push(&SubtaskData::new(5, 1, 1)).await.unwrap();

        assert_eq!(queue.pop(1).await.unwrap().unwrap().subtask_id, 5);
    }
}
