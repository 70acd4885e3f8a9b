//! 任务类型插件的能力接口
//!
//! 每种任务类型由一个整数键标识，对应一组生成器和调度回调实现，
//! 注册在 [`crate::PluginRegistry`] 中按类型查找。执行器调用与任务类型无关，
//! 由 [`ExecutorInvoker`] 统一负责。

use async_trait::async_trait;

use crate::models::{SubtaskData, SubtaskId, TaskCreateParam, TaskId};
use crate::SchedulerResult;

/// 生成器一次调用的结果
#[derive(Debug, Clone, Default)]
pub struct GeneratedSubtask {
    /// 本次产生的子任务，暂时没有可产生的子任务时为 None
    pub subtask: Option<SubtaskData>,
    /// 任务的子任务是否已经全部生成
    pub finished: bool,
}

impl GeneratedSubtask {
    pub fn subtask(subtask: SubtaskData) -> Self {
        Self {
            subtask: Some(subtask),
            finished: false,
        }
    }

    pub fn finished() -> Self {
        Self {
            subtask: None,
            finished: true,
        }
    }

    pub fn pending() -> Self {
        Self::default()
    }
}

/// 子任务生成器接口
#[async_trait]
pub trait TaskGenerator: Send + Sync {
    /// 开始生成任务的子任务，恢复生成时同样会调用
    ///
    /// `resume_step` 是中断前已生成的子任务数，新任务为 0。
    async fn begin(
        &self,
        _task_id: TaskId,
        _param: &TaskCreateParam,
        _resume_step: u64,
    ) -> SchedulerResult<()> {
        Ok(())
    }

    /// 获取任务的下一个子任务
    ///
    /// 返回的子任务只需填写类型相关的内容，ID、所属任务等字段由生成流程统一设置。
    async fn get_subtask(&self, task_id: TaskId) -> SchedulerResult<GeneratedSubtask>;

    /// 保存生成进度，生成流程定期调用
    async fn save_status(&self, _task_id: TaskId) -> SchedulerResult<()> {
        Ok(())
    }

    /// 结束生成
    async fn end(&self, _task_id: TaskId) -> SchedulerResult<()> {
        Ok(())
    }
}

/// 调度回调接口，允许任务类型否决或感知子任务的分发
#[async_trait]
pub trait TaskSchedulerCallback: Send + Sync {
    /// 分发前调用，返回 false 表示本轮不分发该子任务
    async fn before_dispatch(
        &self,
        subtask_id: SubtaskId,
        subtask: &mut SubtaskData,
    ) -> SchedulerResult<bool>;

    /// 分发后调用
    async fn after_dispatch(&self, subtask_id: SubtaskId) -> SchedulerResult<()>;
}

/// 执行器调用接口，将一批子任务推送给执行器
#[async_trait]
pub trait ExecutorInvoker: Send + Sync {
    async fn invoke(&self, subtasks: &[SubtaskData]) -> SchedulerResult<()>;
}
