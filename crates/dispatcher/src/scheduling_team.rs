//! 调度队列组
//!
//! 一个资源组的全部调度队列：若干级优先级队列按级别串联，最后一级接到轮转队列。
//! 新任务总是进入第 0 级；时间片用完的任务降到下一级；轮转队列是终点。
//! 后台的优先级提升例程定期把低级别队列队头的任务提回第 0 级，避免饥饿。

use std::sync::Arc;

use tracing::{debug, info, warn};

use dtf_core::{
    config::QueueConfig,
    models::{SubtaskData, TaskId, TaskPriority},
    SchedulerResult, StoreBatch,
};

use crate::routine::RoutineRunner;
use crate::scheduling_queue::{QueueSchedule, SchedulingContext, SchedulingQueue};

/// 一次调度选出的任务及其子任务
#[derive(Debug, Clone)]
pub struct ScheduledBatch {
    pub task_id: TaskId,
    pub subtasks: Vec<SubtaskData>,
    /// 任务已离开调度队列
    pub finished: bool,
}

impl From<QueueSchedule> for ScheduledBatch {
    fn from(outcome: QueueSchedule) -> Self {
        Self {
            task_id: outcome.task_id,
            subtasks: outcome.subtasks,
            finished: outcome.finished,
        }
    }
}

pub struct SchedulingTeam {
    name: String,
    priority_queues: Vec<SchedulingQueue>,
    rr_queue: SchedulingQueue,
    config: QueueConfig,
    ctx: SchedulingContext,
}

impl SchedulingTeam {
    pub fn new(name: &str, ctx: SchedulingContext, config: Option<QueueConfig>) -> Self {
        let config = config.unwrap_or_default();
        let priority_queues = (0..config.priority_queue_count.max(1))
            .map(|level| SchedulingQueue::priority(name, level, &config, ctx.clone()))
            .collect();
        let rr_queue = SchedulingQueue::round_robin(name, &config, ctx.clone());

        info!("创建调度队列组: {}, 优先级队列数: {}", name, config.priority_queue_count);
        Self {
            name: name.to_string(),
            priority_queues,
            rr_queue,
            config,
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority_queues(&self) -> &[SchedulingQueue] {
        &self.priority_queues
    }

    pub fn rr_queue(&self) -> &SchedulingQueue {
        &self.rr_queue
    }

    /// 启动优先级提升和剩余时间加速例程
    pub fn start(self: &Arc<Self>, runner: &RoutineRunner) {
        for level in 1..self.priority_queues.len() {
            let team = self.clone();
            runner.spawn("priority_boost", 1, self.config.priority_boost_interval(), move || {
                let team = team.clone();
                async move { team.trigger_priority_boost(level).await.map(|_| ()) }
            });
        }

        let team = self.clone();
        runner.spawn("rr_priority_boost", 1, self.config.rr_priority_boost_interval(), move || {
            let team = team.clone();
            async move { team.trigger_rr_priority_boost().await.map(|_| ()) }
        });

        let team = self.clone();
        runner.spawn(
            "remain_acceleration",
            1,
            self.config.remain_acceleration_interval(),
            move || {
                let team = team.clone();
                async move { team.trigger_remain_acceleration().await }
            },
        );
    }

    /// 新任务加入第 0 级优先级队列
    pub async fn add_task(&self, task_id: TaskId, priority: TaskPriority) -> SchedulerResult<()> {
        self.priority_queues[0].append_task(task_id, priority).await
    }

    /// 各级队列中的任务总数
    pub async fn get_task_count(&self) -> SchedulerResult<u64> {
        let mut count = self.rr_queue.task_count().await?;
        for queue in &self.priority_queues {
            count += queue.task_count().await?;
        }
        Ok(count)
    }

    /// 选出一个任务并取出其子任务
    ///
    /// 按级别依次尝试优先级队列，第一个取到子任务的结果立即返回；
    /// 所有优先级队列都没有结果时调度轮转队列。
    pub async fn schedule(&self) -> SchedulerResult<Option<ScheduledBatch>> {
        for (level, queue) in self.priority_queues.iter().enumerate() {
            let outcome = match queue.schedule().await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => continue,
                Err(e) => {
                    warn!("调度队列 {} 失败: {}", queue.key_name(), e);
                    continue;
                }
            };

            if outcome.exhausted {
                info!("任务在 {} 的时间片已用完: {}", queue.key_name(), outcome.task_id);
                if let Err(e) = self.append_to_next_queue(level, outcome.task_id).await {
                    warn!("任务移到下一级队列失败: {}, {}", outcome.task_id, e);
                }
            }

            if !outcome.subtasks.is_empty() {
                debug!(
                    "从 {} 调度任务 {}, 子任务数: {}",
                    queue.key_name(),
                    outcome.task_id,
                    outcome.subtasks.len()
                );
                return Ok(Some(outcome.into()));
            }
        }

        let Some(outcome) = self.rr_queue.schedule().await? else {
            return Ok(None);
        };
        if outcome.exhausted {
            // 轮转队列没有下一级，重新授予时间片
            let priority = self.task_priority(outcome.task_id).await;
            if let Err(e) = self.rr_queue.append_task(outcome.task_id, priority).await {
                warn!("任务重新加入轮转队列失败: {}, {}", outcome.task_id, e);
            }
        }
        if outcome.subtasks.is_empty() {
            return Ok(None);
        }
        debug!(
            "从轮转队列调度任务 {}, 子任务数: {}",
            outcome.task_id,
            outcome.subtasks.len()
        );
        Ok(Some(outcome.into()))
    }

    async fn task_priority(&self, task_id: TaskId) -> TaskPriority {
        match self.ctx.tasks.get_create_param(task_id).await {
            Ok(Some(param)) => param.priority,
            Ok(None) => {
                warn!("任务没有创建参数, 按最低优先级处理: {}", task_id);
                TaskPriority::Low
            }
            Err(e) => {
                warn!("读取任务创建参数失败: {}, {}", task_id, e);
                TaskPriority::Low
            }
        }
    }

    /// 将任务移到第 `level` 级的下一级队列，并按原始优先级重新授予时间片
    async fn append_to_next_queue(&self, level: usize, task_id: TaskId) -> SchedulerResult<()> {
        let next = self
            .priority_queues
            .get(level + 1)
            .unwrap_or(&self.rr_queue);
        let priority = self.task_priority(task_id).await;
        next.append_task(task_id, priority).await?;

        info!(
            "任务移到下一级队列: {}, {} -> {}",
            task_id,
            self.priority_queues[level].key_name(),
            next.key_name()
        );
        Ok(())
    }

    /// 对第 `level` 级优先级队列执行优先级提升
    pub async fn trigger_priority_boost(&self, level: usize) -> SchedulerResult<usize> {
        let Some(queue) = self.priority_queues.get(level) else {
            warn!("优先级队列序号越界: {}", level);
            return Ok(0);
        };
        if level == 0 {
            return Ok(0);
        }
        self.priority_boost_on_queue(queue).await
    }

    /// 对轮转队列执行优先级提升
    pub async fn trigger_rr_priority_boost(&self) -> SchedulerResult<usize> {
        self.priority_boost_on_queue(&self.rr_queue).await
    }

    async fn priority_boost_on_queue(&self, queue: &SchedulingQueue) -> SchedulerResult<usize> {
        let task_ids = queue
            .pop_boost_tasks(self.config.priority_boost_max_tasks)
            .await?;
        if task_ids.is_empty() {
            debug!("队列 {} 没有需要提升的任务", queue.key_name());
            return Ok(0);
        }

        // 移动期间登记到看门狗，中途失败时由丢失任务监控放回原队列
        let mut batch = StoreBatch::new();
        self.ctx.watchdog.stage_register_all(&mut batch, &task_ids);
        self.ctx.store().exec(batch).await?;

        self.priority_queues[0].append_boost_tasks(&task_ids).await?;
        info!(
            "队列 {} 的任务提升到 {}: {}",
            queue.key_name(),
            self.priority_queues[0].key_name(),
            task_ids.len()
        );
        Ok(task_ids.len())
    }

    /// 剩余时间加速策略的扩展点，目前没有加速算法
    pub async fn trigger_remain_acceleration(&self) -> SchedulerResult<()> {
        debug!("资源组 {} 执行剩余时间加速检查", self.name);
        Ok(())
    }
}
