use std::sync::Arc;

use tracing::info;

use dtf_core::{
    keys,
    models::{TaskCreateParam, TaskId},
    unix_now, PluginRegistry, SchedulerError, SchedulerResult, StoreBatch,
};
use dtf_infrastructure::{IdRangeAllocator, TaskStore};

use crate::resource_group::ResourceGroupMgr;

/// 任务创建
///
/// 校验资源组和任务类型，分配任务 ID，写入任务记录并加入待生成集合。
pub struct TaskCreator {
    tasks: TaskStore,
    ids: Arc<IdRangeAllocator>,
    groups: Arc<ResourceGroupMgr>,
    plugins: Arc<PluginRegistry>,
}

impl TaskCreator {
    pub fn new(
        tasks: TaskStore,
        ids: Arc<IdRangeAllocator>,
        groups: Arc<ResourceGroupMgr>,
        plugins: Arc<PluginRegistry>,
    ) -> Self {
        Self {
            tasks,
            ids,
            groups,
            plugins,
        }
    }

    pub async fn create_task(&self, param: &TaskCreateParam) -> SchedulerResult<TaskId> {
        if !self.groups.has_group(&param.resource_group).await {
            return Err(SchedulerError::UnknownGroup {
                name: param.resource_group.clone(),
            });
        }
        if !self.plugins.contains(param.task_type).await {
            return Err(SchedulerError::UnknownTaskType {
                task_type: param.task_type,
            });
        }

        let task_id = self.ids.get_id(keys::TASK_ID_KEY).await?;
        let now = unix_now();

        let mut batch = StoreBatch::atomic();
        TaskStore::stage_create_task(&mut batch, task_id, param, now)?;
        batch.zadd(keys::TO_GENERATE_TASK_ZSET, now as f64, task_id.to_string());
        self.tasks.store().exec(batch).await?;

        info!(
            "创建任务: {}, 资源组 {}, 类型 {}, 优先级 {:?}",
            task_id, param.resource_group, param.task_type, param.priority
        );
        Ok(task_id)
    }
}
