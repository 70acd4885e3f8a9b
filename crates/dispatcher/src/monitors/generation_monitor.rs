use std::sync::Arc;

use tracing::{debug, warn};

use dtf_core::{keys, unix_now, SchedulerResult};
use dtf_infrastructure::TaskStore;

use super::random_window;
use crate::generation::GenerationFlow;

/// 每轮检查的生成中任务数
pub const GENERATION_MONITOR_SCAN_COUNT: usize = 10;

/// 生成监控
///
/// 生成中任务的下次检查时间缺失或已过，说明负责生成的节点已经停止刷新，
/// 获取任务锁后以恢复模式重新开始生成。
pub struct GenerationMonitor {
    tasks: TaskStore,
    flow: Arc<GenerationFlow>,
}

impl GenerationMonitor {
    pub fn new(tasks: TaskStore, flow: Arc<GenerationFlow>) -> Self {
        Self { tasks, flow }
    }

    /// 返回本轮恢复的任务数
    pub async fn check(&self) -> SchedulerResult<usize> {
        let candidates = random_window(
            self.tasks.store().as_ref(),
            keys::GENERATING_TASK_ZSET,
            GENERATION_MONITOR_SCAN_COUNT,
        )
        .await?;

        let now = unix_now();
        let mut recovered = 0;
        for task_id in candidates {
            let next_check_time = self
                .tasks
                .store()
                .hget(
                    &keys::generation_progress_key(task_id),
                    keys::PROGRESS_FIELD_NEXT_CHECK_TIME,
                )
                .await?
                .and_then(|value| value.parse::<i64>().ok());

            if matches!(next_check_time, Some(time) if time > now) {
                continue;
            }

            warn!("生成中的任务未按时刷新: {}, {:?}", task_id, next_check_time);
            if self.flow.recover_task(task_id).await? {
                recovered += 1;
            } else {
                debug!("任务正在由其他节点生成: {}", task_id);
            }
        }
        Ok(recovered)
    }
}
