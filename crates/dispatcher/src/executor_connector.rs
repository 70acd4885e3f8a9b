//! 执行器连接
//!
//! 分批推送子任务给执行器，推送失败的子任务进入重试列表，由重试例程定期重推，
//! 超过自身有效期的子任务直接丢弃。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use dtf_core::{
    config::ExecutorConfig, keys, models::SubtaskData, unix_now, CoordinationStore,
    ExecutorInvoker, SchedulerResult, StoreBatch,
};

/// 重试列表中的子任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySubtaskData {
    #[serde(flatten)]
    pub subtask: SubtaskData,
    /// 过期时间（Unix 秒），过期后不再重试
    pub expired_at: i64,
}

impl RetrySubtaskData {
    pub fn new(subtask: SubtaskData) -> Self {
        let expired_at = subtask.expires_at().timestamp();
        Self {
            subtask,
            expired_at,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expired_at <= now
    }
}

pub struct ExecutorConnector {
    store: Arc<dyn CoordinationStore>,
    invoker: Arc<dyn ExecutorInvoker>,
    config: ExecutorConfig,
}

impl ExecutorConnector {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        invoker: Arc<dyn ExecutorInvoker>,
        config: Option<ExecutorConfig>,
    ) -> Self {
        Self {
            store,
            invoker,
            config: config.unwrap_or_default(),
        }
    }

    /// 分批推送子任务，失败的批次进入重试列表，返回直接推送成功的数量
    ///
    /// 调用前子任务已进入运行集合，加入重试列表失败时只记录错误并继续推送后续批次，
    /// 这部分子任务由子任务超时监控处理。
    pub async fn push_subtasks(&self, subtasks: &[SubtaskData]) -> usize {
        let mut delivered = 0;
        for (index, chunk) in subtasks.chunks(self.config.max_push_batch).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.push_interval()).await;
            }

            match self.invoker.invoke(chunk).await {
                Ok(()) => {
                    debug!("推送子任务到执行器: {}", chunk.len());
                    delivered += chunk.len();
                }
                Err(e) => {
                    warn!("推送子任务到执行器失败, 加入重试列表: {}, {}", chunk.len(), e);
                    metrics::counter!("dtf_executor_push_failures_total").increment(1);
                    if let Err(e) = self.add_to_retry_list(chunk).await {
                        error!("子任务加入重试列表失败, 等待超时处理: {}, {}", chunk.len(), e);
                        metrics::counter!("dtf_retry_dropped_subtasks_total")
                            .increment(chunk.len() as u64);
                    }
                }
            }
        }
        delivered
    }

    /// 将子任务加入重试列表，即将过期的子任务直接丢弃，返回加入的数量
    pub async fn add_to_retry_list(&self, subtasks: &[SubtaskData]) -> SchedulerResult<usize> {
        let deadline = unix_now() + self.config.retry_expiry_margin_seconds as i64;
        let mut values = Vec::with_capacity(subtasks.len());
        for subtask in subtasks {
            let data = RetrySubtaskData::new(subtask.clone());
            if data.is_expired(deadline) {
                debug!("子任务即将过期, 不再重试: {}", subtask.subtask_id);
                metrics::counter!("dtf_retry_dropped_subtasks_total").increment(1);
                continue;
            }
            values.push(serde_json::to_string(&data)?);
        }

        if values.is_empty() {
            return Ok(0);
        }

        let count = values.len();
        let mut batch = StoreBatch::atomic();
        batch
            .rpush_all(keys::RETRY_PUSH_LIST, values)
            .expire(keys::RETRY_PUSH_LIST, self.config.retry_list_ttl());
        self.store.exec(batch).await?;
        Ok(count)
    }

    /// 从重试列表取出一批子任务重新推送，返回推送成功的数量
    pub async fn retry_push(&self) -> SchedulerResult<usize> {
        let mut batch = StoreBatch::new();
        for _ in 0..self.config.retry_batch {
            batch.lpop(keys::RETRY_PUSH_LIST);
        }
        let replies = self.store.exec(batch).await?;

        let now = unix_now();
        let mut subtasks = Vec::new();
        for reply in replies {
            let Some(json) = reply.into_value()? else {
                break;
            };
            match serde_json::from_str::<RetrySubtaskData>(&json) {
                Ok(data) if data.is_expired(now) => {
                    debug!("丢弃过期的重试子任务: {}", data.subtask.subtask_id);
                    metrics::counter!("dtf_retry_dropped_subtasks_total").increment(1);
                }
                Ok(data) => subtasks.push(data.subtask),
                Err(e) => warn!("丢弃无法解析的重试子任务: {}", e),
            }
        }

        if subtasks.is_empty() {
            return Ok(0);
        }

        match self.invoker.invoke(&subtasks).await {
            Ok(()) => {
                info!("重新推送子任务成功: {}", subtasks.len());
                Ok(subtasks.len())
            }
            Err(e) => {
                warn!("重新推送子任务失败: {}, {}", subtasks.len(), e);
                metrics::counter!("dtf_executor_push_failures_total").increment(1);
                self.add_to_retry_list(&subtasks).await?;
                Ok(0)
            }
        }
    }
}
