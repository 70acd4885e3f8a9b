//! 调度队列
//!
//! 每个资源组有若干级优先级队列和一个轮转队列。队列本身是协调存储中的任务 ID 列表，
//! 队头出队调度，时间片未用完的任务回到队尾。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use dtf_core::{
    config::QueueConfig,
    keys,
    models::{SubtaskData, TaskId, TaskPriority, TaskScheduleData},
    unix_now, CoordinationStore, SchedulerResult, StoreBatch,
};
use dtf_infrastructure::{GenerationQueue, TaskStore};

use crate::watchdog::CurrentTaskWatchdog;

/// 轮转队列在调度数据中的序号
pub const RR_QUEUE_INDEX: u32 = 1_000_000;

/// 调度队列共用的存储访问
#[derive(Clone)]
pub struct SchedulingContext {
    pub tasks: TaskStore,
    pub generation: GenerationQueue,
    pub watchdog: CurrentTaskWatchdog,
}

impl SchedulingContext {
    pub fn new(store: Arc<dyn CoordinationStore>, config: &QueueConfig) -> Self {
        Self {
            tasks: TaskStore::new(store.clone()),
            generation: GenerationQueue::new(store),
            watchdog: CurrentTaskWatchdog::new(config.current_task_timeout()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        self.tasks.store()
    }
}

/// 队列一次调度的结果
#[derive(Debug, Clone)]
pub struct QueueSchedule {
    pub task_id: TaskId,
    pub subtasks: Vec<SubtaskData>,
    /// 任务的子任务已全部生成并取完，任务已离开队列
    pub finished: bool,
    /// 任务在本队列的时间片已用完，需要由调用方移到下一级队列
    pub exhausted: bool,
}

struct PickResult {
    subtasks: Vec<SubtaskData>,
    finished: bool,
    quiet: bool,
}

pub struct SchedulingQueue {
    group_name: String,
    index: u32,
    key_name: String,
    time_slice: Duration,
    base_slice: u32,
    quiet_max_interval: Duration,
    ctx: SchedulingContext,
}

impl SchedulingQueue {
    /// 第 `level` 级优先级队列
    pub fn priority(group_name: &str, level: usize, config: &QueueConfig, ctx: SchedulingContext) -> Self {
        Self {
            group_name: group_name.to_string(),
            index: level as u32,
            key_name: keys::priority_queue_key(group_name, level),
            time_slice: config.time_slice_for_level(level),
            base_slice: config.base_slice_count,
            quiet_max_interval: config.quiet_task_max_interval(),
            ctx,
        }
    }

    /// 轮转队列
    pub fn round_robin(group_name: &str, config: &QueueConfig, ctx: SchedulingContext) -> Self {
        Self {
            group_name: group_name.to_string(),
            index: RR_QUEUE_INDEX,
            key_name: keys::rr_queue_key(group_name),
            time_slice: config.rr_time_slice(),
            base_slice: config.rr_base_slice_count,
            quiet_max_interval: config.quiet_task_max_interval(),
            ctx,
        }
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_round_robin(&self) -> bool {
        self.index == RR_QUEUE_INDEX
    }

    pub fn time_slice(&self) -> Duration {
        self.time_slice
    }

    /// 按优先级计算任务在本队列的初始时间片数量
    pub fn calc_task_slice_count(&self, priority: TaskPriority) -> u32 {
        priority.slice_bonus().saturating_mul(self.base_slice)
    }

    fn grant(&self, priority: TaskPriority) -> TaskScheduleData {
        let slice = self.calc_task_slice_count(priority);
        TaskScheduleData {
            resource_group_name: self.group_name.clone(),
            current_queue: self.index,
            current_queue_key_name: self.key_name.clone(),
            initial_queue_slice: slice,
            queue_slice: slice,
            quiet_start_time: 0,
        }
    }

    /// 将任务加入队尾，并按优先级授予本队列的时间片
    pub async fn append_task(&self, task_id: TaskId, priority: TaskPriority) -> SchedulerResult<()> {
        let mut batch = StoreBatch::atomic();
        TaskStore::stage_schedule_data(&mut batch, task_id, &self.grant(priority))?;
        batch.rpush(self.key_name.as_str(), task_id.to_string());
        self.ctx.watchdog.stage_release(&mut batch, task_id);
        self.ctx.store().exec(batch).await?;

        info!("任务加入调度队列: {}, {}", task_id, self.key_name);
        Ok(())
    }

    /// 批量加入提升上来的任务，统一按最低优先级授予时间片
    pub async fn append_boost_tasks(&self, task_ids: &[TaskId]) -> SchedulerResult<()> {
        if task_ids.is_empty() {
            return Ok(());
        }

        let data = self.grant(TaskPriority::Low);
        let mut batch = StoreBatch::atomic();
        for task_id in task_ids {
            TaskStore::stage_schedule_data(&mut batch, *task_id, &data)?;
        }
        batch.rpush_all(
            self.key_name.as_str(),
            task_ids.iter().map(|id| id.to_string()).collect(),
        );
        for task_id in task_ids {
            self.ctx.watchdog.stage_release(&mut batch, *task_id);
        }
        self.ctx.store().exec(batch).await?;

        info!("提升的任务加入调度队列: {}, {:?}", self.key_name, task_ids);
        Ok(())
    }

    /// 从队头取出最多 `max` 个任务
    pub async fn pop_boost_tasks(&self, max: usize) -> SchedulerResult<Vec<TaskId>> {
        let mut batch = StoreBatch::new();
        for _ in 0..max {
            batch.lpop(self.key_name.as_str());
        }
        let replies = self.ctx.store().exec(batch).await?;

        let mut task_ids = Vec::new();
        for reply in replies {
            let Some(value) = reply.into_value()? else {
                break;
            };
            match value.parse::<TaskId>() {
                Ok(task_id) => task_ids.push(task_id),
                Err(_) => warn!("丢弃队列 {} 中无效的任务ID: {}", self.key_name, value),
            }
        }
        Ok(task_ids)
    }

    /// 队列中的任务数
    pub async fn task_count(&self) -> SchedulerResult<u64> {
        Ok(self.ctx.store().llen(&self.key_name).await?.max(0) as u64)
    }

    /// 调度队头的任务，队列为空时返回 None
    pub async fn schedule(&self) -> SchedulerResult<Option<QueueSchedule>> {
        let Some(value) = self.ctx.store().lpop(&self.key_name).await? else {
            return Ok(None);
        };
        let task_id = match value.parse::<TaskId>() {
            Ok(task_id) => task_id,
            Err(_) => {
                warn!("丢弃队列 {} 中无效的任务ID: {}", self.key_name, value);
                return Ok(None);
            }
        };

        let mut register = StoreBatch::new();
        self.ctx.watchdog.stage_register(&mut register, task_id);
        if let Err(e) = self.ctx.store().exec(register).await {
            warn!("登记当前任务失败, 放回队列: {}, {}", task_id, e);
            self.ctx.store().rpush(&self.key_name, &task_id.to_string()).await?;
            return Err(e);
        }

        // 读取失败时保留存储中的调度数据，本轮按时间片未用完处理
        let (mut data, persist) = match self.ctx.tasks.get_schedule_data(task_id).await {
            Ok(Some(data)) => (data, true),
            Ok(None) => {
                warn!("任务没有调度数据, 按最低优先级重新授予: {}", task_id);
                (self.grant(TaskPriority::Low), true)
            }
            Err(e) => {
                warn!("读取任务调度数据失败, 本轮不更新调度数据: {}, {}", task_id, e);
                (self.grant(TaskPriority::Low), false)
            }
        };

        let picked = self.pick_subtasks(task_id, &mut data).await;
        let now = unix_now();
        let mut batch = StoreBatch::atomic();
        for subtask in &picked.subtasks {
            TaskStore::stage_subtask_scheduled(&mut batch, subtask, now);
        }

        if picked.finished {
            self.ctx.watchdog.stage_release(&mut batch, task_id);
            self.commit(batch, &picked.subtasks).await?;
            info!("任务的子任务已全部调度, 移出队列: {}, {}", task_id, self.key_name);
            return Ok(Some(QueueSchedule {
                task_id,
                subtasks: picked.subtasks,
                finished: true,
                exhausted: false,
            }));
        }

        let exhausted = persist && data.queue_slice <= 1;
        if exhausted {
            // 任务留在看门狗集合中，由调用方移到下一级队列时移除
            TaskStore::stage_schedule_data(&mut batch, task_id, &data)?;
        } else {
            if !picked.quiet {
                data.queue_slice -= 1;
            }
            if persist {
                TaskStore::stage_schedule_data(&mut batch, task_id, &data)?;
            }
            batch.rpush(self.key_name.as_str(), task_id.to_string());
            self.ctx.watchdog.stage_release(&mut batch, task_id);
        }
        self.commit(batch, &picked.subtasks).await?;

        debug!(
            "任务 {} 在 {} 的剩余时间片: {}, 本次子任务: {}",
            task_id,
            self.key_name,
            data.queue_slice,
            picked.subtasks.len()
        );
        Ok(Some(QueueSchedule {
            task_id,
            subtasks: picked.subtasks,
            finished: false,
            exhausted,
        }))
    }

    async fn commit(&self, batch: StoreBatch, subtasks: &[SubtaskData]) -> SchedulerResult<()> {
        if let Err(e) = self.ctx.store().exec(batch).await {
            if let Err(push_err) = self.ctx.generation.push_back(subtasks).await {
                warn!("放回子任务失败: {}", push_err);
            }
            return Err(e);
        }
        Ok(())
    }

    /// 在本队列的时间片内从任务的生成队列中取子任务
    async fn pick_subtasks(&self, task_id: TaskId, data: &mut TaskScheduleData) -> PickResult {
        let started = Instant::now();
        let mut picked = PickResult {
            subtasks: Vec::new(),
            finished: false,
            quiet: false,
        };

        while started.elapsed() < self.time_slice {
            match self.ctx.generation.pop(task_id).await {
                Ok(Some(subtask)) => {
                    picked.subtasks.push(subtask);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("获取任务的子任务失败: {}, {}", task_id, e);
                    break;
                }
            }

            picked.finished = self.generation_drained(task_id).await;
            if picked.finished || !picked.subtasks.is_empty() {
                break;
            }

            let now = unix_now();
            if data.quiet_start_time == 0 {
                data.quiet_start_time = now;
            }
            if now - data.quiet_start_time < self.quiet_max_interval.as_secs() as i64 {
                debug!("任务处于静默期: {}", task_id);
                picked.quiet = true;
            } else {
                info!("任务静默时间超过上限: {}", task_id);
            }
            break;
        }

        if !picked.subtasks.is_empty() {
            data.quiet_start_time = 0;
        }
        picked
    }

    /// 生成已完成且生成队列为空
    async fn generation_drained(&self, task_id: TaskId) -> bool {
        match self.ctx.tasks.is_generation_completed(task_id).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!("读取任务生成状态失败: {}, {}", task_id, e);
                return false;
            }
        }
        match self.ctx.generation.is_empty(task_id).await {
            Ok(empty) => empty,
            Err(e) => {
                warn!("读取生成队列长度失败: {}, {}", task_id, e);
                false
            }
        }
    }
}
