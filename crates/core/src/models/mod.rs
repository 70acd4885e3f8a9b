//! # 数据模型
//!
//! 任务处理流水线在协调存储中读写的核心数据结构。
//!
//! ## 核心模型
//!
//! ### TaskCreateParam - 任务创建参数
//! 任务创建时写入协调存储，生成、调度阶段都会读取其中的资源组和优先级。
//!
//! ### SubtaskData - 子任务数据
//! 由生成器插件产生，经调度队列打包后推送给执行器。
//!
//! ### TaskScheduleData - 任务调度数据
//! 记录任务当前所在的调度队列和剩余时间片，只由持有任务的队列修改。
//!
//! ### ResourceGroupRecord - 资源组记录
//! 资源组名称、配额和描述，定期从记录源同步。
//!
//! ## 状态流转
//!
//! ```text
//! Created → Running → Paused / Cancelled
//!              ↓
//!     Completed / Exceptional
//! ```

pub mod resource_group;
pub mod schedule_data;
pub mod subtask;
pub mod task;

pub use resource_group::*;
pub use schedule_data::*;
pub use subtask::*;
pub use task::*;
