//! 调度核心
//!
//! 资源组选择、多级调度队列、执行器推送、子任务生成以及各类重试与超时监控。
//! 跨节点的协调全部通过协调存储的原子批次和所有权仲裁完成，进程内只保存可重建的状态。

pub mod completion;
pub mod executor_connector;
pub mod generation;
pub mod monitors;
pub mod resource_group;
pub mod routine;
pub mod scheduler_flow;
pub mod scheduling_queue;
pub mod scheduling_team;
pub mod task_creation;
pub mod watchdog;

pub use completion::SubtaskCompletion;
pub use executor_connector::{ExecutorConnector, RetrySubtaskData};
pub use generation::GenerationFlow;
pub use monitors::{
    GenerationMonitor, SubtaskCompleteMonitor, SubtaskTimeoutMonitor, TaskCleanupMonitor,
    TaskCompleteMonitor, TaskTimeoutMonitor,
};
pub use resource_group::{stochastic_accept, ResourceGroupMgr, ResourceGroupSource, StaticResourceGroupSource};
pub use routine::{spawn_routines, RoutineRunner};
pub use scheduler_flow::SchedulerFlow;
pub use scheduling_queue::{QueueSchedule, SchedulingContext, SchedulingQueue, RR_QUEUE_INDEX};
pub use scheduling_team::{ScheduledBatch, SchedulingTeam};
pub use task_creation::TaskCreator;
pub use watchdog::{CurrentTaskWatchdog, LostTaskMonitor};
