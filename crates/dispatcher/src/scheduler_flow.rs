//! 调度流程
//!
//! 对外提供三个操作：把任务加入调度器、选出一批子任务、分发一批子任务；
//! 调度例程把三者串起来，每一轮选出一个任务的子任务并推送给执行器。

use std::sync::Arc;

use tracing::{debug, info, warn};

use dtf_core::{
    models::{SubtaskData, TaskId, TaskPriority},
    unix_now, PluginRegistry, SchedulerResult, StoreBatch,
};
use dtf_infrastructure::{GenerationQueue, TaskStore};

use crate::executor_connector::ExecutorConnector;
use crate::resource_group::ResourceGroupMgr;
use crate::scheduling_team::ScheduledBatch;

pub struct SchedulerFlow {
    groups: Arc<ResourceGroupMgr>,
    tasks: TaskStore,
    generation: GenerationQueue,
    plugins: Arc<PluginRegistry>,
    executor: Arc<ExecutorConnector>,
}

impl SchedulerFlow {
    pub fn new(
        groups: Arc<ResourceGroupMgr>,
        tasks: TaskStore,
        plugins: Arc<PluginRegistry>,
        executor: Arc<ExecutorConnector>,
    ) -> Self {
        let generation = GenerationQueue::new(tasks.store().clone());
        Self {
            groups,
            tasks,
            generation,
            plugins,
            executor,
        }
    }

    pub fn groups(&self) -> &Arc<ResourceGroupMgr> {
        &self.groups
    }

    /// 将任务加入所属资源组的调度队列
    pub async fn add_task_to_scheduler(
        &self,
        task_id: TaskId,
        group: &str,
        task_type: u32,
        priority: TaskPriority,
    ) -> SchedulerResult<()> {
        self.groups.add_task(group, task_id, task_type, priority).await
    }

    /// 选出一个任务及其一批子任务，没有可调度的任务时返回 None
    pub async fn schedule_subtasks(&self) -> SchedulerResult<Option<ScheduledBatch>> {
        let batch = self.groups.select().await?;
        if let Some(batch) = &batch {
            metrics::counter!("dtf_scheduled_subtasks_total").increment(batch.subtasks.len() as u64);
        }
        Ok(batch)
    }

    /// 分发子任务，返回本轮不分发、需要放回生成队列的子任务
    pub async fn exec_subtasks(
        &self,
        task_id: TaskId,
        subtasks: Vec<SubtaskData>,
    ) -> SchedulerResult<Vec<SubtaskData>> {
        let task_type = self.tasks.get_task_type(task_id).await?;
        let callback = self.plugins.scheduler_callback(task_type).await?;

        let mut dispatched = Vec::with_capacity(subtasks.len());
        let mut pushback = Vec::new();
        for mut subtask in subtasks {
            match callback.before_dispatch(subtask.subtask_id, &mut subtask).await {
                Ok(true) => {
                    if let Err(e) = callback.after_dispatch(subtask.subtask_id).await {
                        warn!("分发后回调失败: {}, {}", subtask.subtask_id, e);
                    }
                    dispatched.push(subtask);
                }
                Ok(false) => pushback.push(subtask),
                Err(e) => {
                    warn!("分发前回调失败, 子任务放回: {}, {}", subtask.subtask_id, e);
                    pushback.push(subtask);
                }
            }
        }

        if !dispatched.is_empty() {
            let mut batch = StoreBatch::atomic();
            TaskStore::stage_subtasks_running(&mut batch, &dispatched, unix_now());
            self.tasks.store().exec(batch).await?;
            self.executor.push_subtasks(&dispatched).await;
        }

        debug!(
            "任务 {} 分发子任务: {}, 放回: {}",
            task_id,
            dispatched.len(),
            pushback.len()
        );
        Ok(pushback)
    }

    /// 调度例程的一轮
    pub async fn schedule_task_routine(&self) -> SchedulerResult<()> {
        let Some(batch) = self.schedule_subtasks().await? else {
            return Ok(());
        };
        if batch.subtasks.is_empty() {
            return Ok(());
        }

        let task_id = batch.task_id;
        let pushback = match self.exec_subtasks(task_id, batch.subtasks.clone()).await {
            Ok(pushback) => pushback,
            Err(e) => {
                warn!("分发任务的子任务失败, 全部放回: {}, {}", task_id, e);
                batch.subtasks
            }
        };
        if pushback.is_empty() {
            return Ok(());
        }

        self.generation.push_back(&pushback).await?;
        if batch.finished {
            // 任务已离开调度队列，重新加入以调度放回的子任务
            self.requeue_task(task_id).await?;
        }
        Ok(())
    }

    async fn requeue_task(&self, task_id: TaskId) -> SchedulerResult<()> {
        let Some(param) = self.tasks.get_create_param(task_id).await? else {
            warn!("任务没有创建参数, 无法重新加入调度: {}", task_id);
            return Ok(());
        };
        self.add_task_to_scheduler(task_id, &param.resource_group, param.task_type, param.priority)
            .await?;
        info!("有放回子任务的已完成任务重新加入调度: {}", task_id);
        Ok(())
    }
}
