use serde::{Deserialize, Serialize};

/// 任务的调度数据
///
/// 记录任务当前所在的资源组与调度队列、初始分配和剩余的时间片数量，
/// 以及空闲开始时间。只由当前持有任务的调度队列修改，带 TTL 存储，
/// 节点崩溃后残留的数据会自行过期。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskScheduleData {
    pub resource_group_name: String,
    /// 队列序号，轮转队列使用固定的大序号
    pub current_queue: u32,
    pub current_queue_key_name: String,
    pub initial_queue_slice: u32,
    pub queue_slice: u32,
    /// 空闲开始时间（Unix 秒），0 表示当前不处于空闲状态
    pub quiet_start_time: i64,
}

impl TaskScheduleData {
    pub fn is_quiet(&self) -> bool {
        self.quiet_start_time != 0
    }
}
