//! 分布式任务处理框架调度核心
//!
//! 嵌入方在进程内注册任务类型插件后构建 [`Application`]，按角色启动后台例程；
//! 独立运行时使用 `dtf-scheduler` 二进制。

pub mod app;
pub mod shutdown;

pub use app::{parse_roles, Application, Role};
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager};
