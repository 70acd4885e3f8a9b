//! 子任务生成流程
//!
//! 生成例程从待生成集合中认领任务，获取任务锁后驱动任务类型的生成器插件，
//! 把生成的子任务推入任务的生成队列。生成期间定期续期任务锁并刷新下次检查时间，
//! 生成监控据此发现中断的生成并以恢复模式重新开始。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dtf_core::{
    config::GenerationConfig,
    keys,
    models::{SubtaskData, TaskCreateParam, TaskId, TaskStatus},
    unix_now, PluginRegistry, SchedulerError, SchedulerResult, StoreBatch, TaskGenerator,
};
use dtf_infrastructure::{GenerationQueue, IdRangeAllocator, OwnershipArbiter, TaskStore};

use crate::resource_group::ResourceGroupMgr;

/// 生成完成后进度记录的保留时间
pub const PROGRESS_RETENTION: Duration = Duration::from_secs(12 * 3600);
/// 生成器暂时没有子任务时的等待间隔
pub const GENERATOR_IDLE_INTERVAL: Duration = Duration::from_millis(100);
/// 每轮从待生成集合中认领的任务数上限
pub const GENERATION_CLAIM_BATCH: usize = 10;

pub struct GenerationFlow {
    tasks: TaskStore,
    generation: GenerationQueue,
    arbiter: Arc<OwnershipArbiter>,
    ids: Arc<IdRangeAllocator>,
    plugins: Arc<PluginRegistry>,
    groups: Arc<ResourceGroupMgr>,
    limiter: Arc<Semaphore>,
    config: GenerationConfig,
    token: CancellationToken,
}

impl GenerationFlow {
    pub fn new(
        tasks: TaskStore,
        arbiter: Arc<OwnershipArbiter>,
        ids: Arc<IdRangeAllocator>,
        plugins: Arc<PluginRegistry>,
        groups: Arc<ResourceGroupMgr>,
        config: Option<GenerationConfig>,
        token: CancellationToken,
    ) -> Self {
        let config = config.unwrap_or_default();
        Self {
            generation: GenerationQueue::new(tasks.store().clone()),
            tasks,
            arbiter,
            ids,
            plugins,
            groups,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_generations)),
            config,
            token,
        }
    }

    /// 本节点正在进行的生成数
    pub fn running_generations(&self) -> usize {
        self.config
            .max_concurrent_generations
            .saturating_sub(self.limiter.available_permits())
    }

    /// 生成例程的一轮：认领待生成的任务并启动生成
    pub async fn generate_routine(self: &Arc<Self>) -> SchedulerResult<()> {
        let candidates = self
            .arbiter
            .get_elements(keys::TO_GENERATE_TASK_ZSET, GENERATION_CLAIM_BATCH)
            .await?;

        for task_id in candidates {
            let Ok(permit) = self.limiter.clone().try_acquire_owned() else {
                debug!("并发生成数已达上限: {}", self.running_generations());
                break;
            };
            if !self
                .arbiter
                .try_to_own_element(keys::TO_GENERATE_TASK_ZSET, task_id)
                .await?
            {
                continue;
            }
            match self.lock_task(task_id).await {
                Ok(true) => {
                    self.spawn_generation(task_id, false, permit);
                }
                Ok(false) => {
                    warn!("待生成的任务已被锁定, 放回待生成集合: {}", task_id);
                    self.restore_to_generate(task_id).await;
                }
                Err(e) => {
                    self.restore_to_generate(task_id).await;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// 以恢复模式重新开始中断的生成，获取不到任务锁时返回 false
    pub async fn recover_task(self: &Arc<Self>, task_id: TaskId) -> SchedulerResult<bool> {
        let Ok(permit) = self.limiter.clone().try_acquire_owned() else {
            debug!("并发生成数已达上限, 暂不恢复: {}", task_id);
            return Ok(false);
        };
        if !self.lock_task(task_id).await? {
            return Ok(false);
        }

        info!("恢复中断的生成: {}", task_id);
        metrics::counter!("dtf_recovered_tasks_total").increment(1);
        self.spawn_generation(task_id, true, permit);
        Ok(true)
    }

    /// 认领后未能开始生成的任务放回待生成集合，由后续的生成例程重试
    async fn restore_to_generate(&self, task_id: TaskId) {
        if let Err(e) = self
            .tasks
            .store()
            .zadd(keys::TO_GENERATE_TASK_ZSET, unix_now() as f64, &task_id.to_string())
            .await
        {
            error!("任务放回待生成集合失败: {}, {}", task_id, e);
        }
    }

    async fn lock_task(&self, task_id: TaskId) -> SchedulerResult<bool> {
        self.arbiter
            .try_to_own(
                &keys::task_lock_key(task_id),
                self.config.lock_timeout(),
                self.config.lock_ttl(),
            )
            .await
    }

    fn spawn_generation(
        self: &Arc<Self>,
        task_id: TaskId,
        recover: bool,
        permit: OwnedSemaphorePermit,
    ) -> JoinHandle<()> {
        let flow = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = flow.generate(task_id, recover).await {
                warn!("生成任务的子任务失败: {}, {}", task_id, e);
            }
        })
    }

    /// 生成任务的全部子任务，调用方需已持有任务锁，结束时释放
    pub async fn generate(&self, task_id: TaskId, recover: bool) -> SchedulerResult<()> {
        let lock_key = keys::task_lock_key(task_id);
        let result = self.generate_locked(task_id, recover).await;

        match &result {
            Err(SchedulerError::OwnershipLost(_)) => {
                warn!("任务锁已被其他节点持有, 停止生成: {}", task_id);
            }
            _ => {
                if let Err(e) = self.arbiter.release(&lock_key).await {
                    warn!("释放任务锁失败: {}, {}", task_id, e);
                }
            }
        }
        result
    }

    async fn generate_locked(&self, task_id: TaskId, recover: bool) -> SchedulerResult<()> {
        let (param, generator, resume_step) = match self.start_generation(task_id, recover).await {
            Ok(started) => started,
            // 任务记录已不存在时没有可生成的内容
            Err(e) if !recover && !matches!(e, SchedulerError::NotFound) => {
                warn!("开始生成失败, 放回待生成集合: {}, {}", task_id, e);
                self.restore_to_generate(task_id).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        generator.begin(task_id, &param, resume_step).await?;
        info!(
            "开始生成任务的子任务: {}, 恢复: {}, 起始进度: {}",
            task_id, recover, resume_step
        );

        let Some(generated) = self
            .generate_loop(task_id, &param, generator.as_ref(), resume_step)
            .await?
        else {
            info!("生成被中断: {}", task_id);
            return Ok(());
        };

        let progress_key = keys::generation_progress_key(task_id);
        let mut batch = StoreBatch::atomic();
        batch
            .zrem(keys::GENERATING_TASK_ZSET, task_id.to_string())
            .zadd(keys::RUNNING_TASK_ZSET, unix_now() as f64, task_id.to_string())
            .expire(progress_key, PROGRESS_RETENTION);
        TaskStore::stage_generation_completed(&mut batch, task_id);
        self.tasks.store().exec(batch).await?;

        if let Err(e) = generator.end(task_id).await {
            warn!("结束生成回调失败: {}, {}", task_id, e);
        }
        info!("任务的子任务生成完成: {}, 累计生成 {}", task_id, generated);
        Ok(())
    }

    /// 加入调度并登记为生成中，返回创建参数、生成器和起始进度
    async fn start_generation(
        &self,
        task_id: TaskId,
        recover: bool,
    ) -> SchedulerResult<(TaskCreateParam, Arc<dyn TaskGenerator>, u64)> {
        let param = self
            .tasks
            .get_create_param(task_id)
            .await?
            .ok_or(SchedulerError::NotFound)?;
        let generator = self.plugins.generator(param.task_type).await?;

        let resume_step = if recover {
            self.saved_step(task_id).await?
        } else {
            self.groups
                .add_task(&param.resource_group, task_id, param.task_type, param.priority)
                .await?;
            0
        };

        let mut batch = StoreBatch::atomic();
        self.stage_progress(&mut batch, task_id, resume_step);
        batch.zadd(keys::GENERATING_TASK_ZSET, unix_now() as f64, task_id.to_string());
        TaskStore::stage_task_status(&mut batch, task_id, TaskStatus::Running);
        self.tasks.store().exec(batch).await?;

        Ok((param, generator, resume_step))
    }

    /// 中断前保存的生成进度，没有记录时从 0 开始
    async fn saved_step(&self, task_id: TaskId) -> SchedulerResult<u64> {
        let step = self
            .tasks
            .store()
            .hget(&keys::generation_progress_key(task_id), keys::PROGRESS_FIELD_STEP)
            .await?;
        Ok(match step.map(|value| value.parse::<u64>()) {
            Some(Ok(step)) => step,
            Some(Err(e)) => {
                warn!("生成进度无法解析, 从头恢复: {}, {}", task_id, e);
                0
            }
            None => 0,
        })
    }

    /// 驱动生成器直到生成完成，返回累计生成的子任务数；被取消或任务已结束时返回 None
    async fn generate_loop(
        &self,
        task_id: TaskId,
        param: &TaskCreateParam,
        generator: &dyn TaskGenerator,
        resume_step: u64,
    ) -> SchedulerResult<Option<u64>> {
        let lock_key = keys::task_lock_key(task_id);
        let mut last_renew = Instant::now();
        let mut last_check = Instant::now();
        let mut generated = resume_step;

        loop {
            if self.token.is_cancelled() {
                return Ok(None);
            }

            if last_renew.elapsed() >= self.config.lock_renew_interval() {
                self.arbiter.renew(&lock_key, self.config.lock_ttl()).await?;
                last_renew = Instant::now();
            }

            if last_check.elapsed() >= self.config.next_check_interval() {
                // 超时或取消的任务不再继续生成
                if let Some(status) = self.tasks.get_task_status(task_id).await? {
                    if status.is_terminal() {
                        info!("任务已结束, 停止生成: {}, {:?}", task_id, status);
                        return Ok(None);
                    }
                }
                let mut batch = StoreBatch::new();
                self.stage_progress(&mut batch, task_id, generated);
                if let Err(e) = self.tasks.store().exec(batch).await {
                    warn!("刷新生成进度失败: {}, {}", task_id, e);
                }
                if let Err(e) = generator.save_status(task_id).await {
                    warn!("保存生成状态失败: {}, {}", task_id, e);
                }
                last_check = Instant::now();
            }

            let result = match generator.get_subtask(task_id).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("生成器获取子任务失败: {}, {}", task_id, e);
                    self.idle().await;
                    continue;
                }
            };

            let produced = result.subtask.is_some();
            if let Some(subtask) = result.subtask {
                self.push_subtask(task_id, param, subtask).await?;
                generated += 1;
            }
            if result.finished {
                return Ok(Some(generated));
            }
            if !produced {
                self.idle().await;
            }
        }
    }

    async fn push_subtask(
        &self,
        task_id: TaskId,
        param: &TaskCreateParam,
        mut subtask: SubtaskData,
    ) -> SchedulerResult<()> {
        subtask.subtask_id = self.ids.get_id(keys::SUBTASK_ID_KEY).await?;
        subtask.task_id = task_id;
        subtask.task_type = param.task_type;
        subtask.created_at = Utc::now();
        subtask.timeout = self.config.clamp_subtask_timeout(subtask.timeout);
        self.generation.push(&subtask).await
    }

    /// 写入下次检查时间，留出两个刷新周期的余量
    fn stage_progress(&self, batch: &mut StoreBatch, task_id: TaskId, generated: u64) {
        let next_check_time = unix_now() + 2 * self.config.next_check_interval().as_secs() as i64;
        let key = keys::generation_progress_key(task_id);
        batch
            .hset(
                key.clone(),
                vec![
                    (keys::PROGRESS_FIELD_STEP.to_string(), generated.to_string()),
                    (
                        keys::PROGRESS_FIELD_NEXT_CHECK_TIME.to_string(),
                        next_check_time.to_string(),
                    ),
                ],
            )
            .expire(key, self.config.lock_ttl() + PROGRESS_RETENTION);
    }

    async fn idle(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep(GENERATOR_IDLE_INTERVAL) => {}
        }
    }
}
