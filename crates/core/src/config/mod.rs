//! 配置管理
//!
//! 配置从 TOML 文件加载，环境变量覆盖，所有字段都有内置默认值。
//! 各节的含义：
//!
//! - **store**: 协调存储后端和连接参数
//! - **queue**: 调度队列的时间片、时间片数量和后台例程周期
//! - **resource_groups**: 资源组及其配额
//! - **routines**: 各类后台例程的并发数和间隔
//! - **id_allocator**: ID 区间分配参数
//! - **executor**: 执行器推送和重试参数
//! - **generation**: 子任务生成的锁和超时参数
//! - **observability**: 日志级别和格式

pub mod models;

pub use models::*;
