//! 协调存储中的键布局

use crate::models::{SubtaskId, TaskId};

/// 调度器键前缀
pub const SCHEDULE_KEY_PREFIX: &str = "Schedule";

/// 正在被调度的任务集合（看门狗集合），按截止时间排序
pub const CURRENT_TASK_ZSET: &str = "Schedule.current.task.list";

pub const RUNNING_SUBTASK_ZSET: &str = "dtf.running.subtask.list";
pub const COMPLETED_SUBTASK_ZSET: &str = "dtf.completed.subtask.list";
pub const RUNNING_TASK_ZSET: &str = "dtf.running.task.list";
pub const COMPLETED_TASK_ZSET: &str = "dtf.completed.task.list";
pub const GENERATING_TASK_ZSET: &str = "dtf.generating.task.list";
pub const TO_GENERATE_TASK_ZSET: &str = "dtf.to.generate.task.list";
/// 设置了整体超时的任务，按 `create_time + timeout` 排序
pub const TASK_TIMEOUT_ZSET: &str = "dtf.task.timeout.list";

/// 推送执行器失败的子任务重试列表
pub const RETRY_PUSH_LIST: &str = "dtf.retry.push.to.executor.list";

pub const TASK_ID_KEY: &str = "dtf.task.id.counter";
pub const SUBTASK_ID_KEY: &str = "dtf.subtask.id.counter";

// 任务信息哈希的字段
pub const TASK_FIELD_TOTAL: &str = "total_subtask_count";
pub const TASK_FIELD_COMPLETED: &str = "completed_subtask_count";
pub const TASK_FIELD_TIMEOUT: &str = "timeout_subtask_count";
pub const TASK_FIELD_CANCELLED: &str = "cancelled_subtask_count";
pub const TASK_FIELD_GENERATION_COMPLETED: &str = "generation_completed";
pub const TASK_FIELD_TASK_TYPE: &str = "task_type";
pub const TASK_FIELD_STATUS: &str = "status";
pub const TASK_FIELD_CREATE_TIME: &str = "create_time";
pub const TASK_FIELD_RESOURCE_GROUP: &str = "resource_group";

// 生成进度哈希的字段
pub const PROGRESS_FIELD_STEP: &str = "step";
pub const PROGRESS_FIELD_NEXT_CHECK_TIME: &str = "next_check_time";

// 子任务信息哈希的字段
pub const SUBTASK_FIELD_TASK_ID: &str = "task_id";
pub const SUBTASK_FIELD_TASK_TYPE: &str = "task_type";
pub const SUBTASK_FIELD_TIMEOUT: &str = "timeout";
pub const SUBTASK_FIELD_START_TIME: &str = "start_time";
pub const SUBTASK_FIELD_END_TIME: &str = "end_time";
pub const SUBTASK_FIELD_RESULT: &str = "result";
pub const SUBTASK_FIELD_STATUS: &str = "status";

pub fn priority_queue_key(group: &str, level: usize) -> String {
    format!("{SCHEDULE_KEY_PREFIX}.{group}.P{level}.queue")
}

pub fn rr_queue_key(group: &str) -> String {
    format!("{SCHEDULE_KEY_PREFIX}.{group}.RR.queue")
}

pub fn schedule_data_key(task_id: TaskId) -> String {
    format!("{SCHEDULE_KEY_PREFIX}.task.data.{task_id}")
}

pub fn task_info_key(task_id: TaskId) -> String {
    format!("dtf.task.info.{task_id}")
}

pub fn task_create_param_key(task_id: TaskId) -> String {
    format!("dtf.task.create.param.{task_id}")
}

pub fn generation_progress_key(task_id: TaskId) -> String {
    format!("dtf.task.generation.progress.{task_id}")
}

pub fn generation_queue_key(task_id: TaskId) -> String {
    format!("dtf.task.to.schedule.subtask.list.{task_id}")
}

pub fn task_subtask_set_key(task_id: TaskId) -> String {
    format!("dtf.task.subtask.list.{task_id}")
}

pub fn subtask_info_key(subtask_id: SubtaskId) -> String {
    format!("dtf.subtask.info.{subtask_id}")
}

pub fn task_lock_key(task_id: TaskId) -> String {
    format!("dtf.task.lock.{task_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keys() {
        assert_eq!(priority_queue_key("1", 0), "Schedule.1.P0.queue");
        assert_eq!(priority_queue_key("batch", 1), "Schedule.batch.P1.queue");
        assert_eq!(rr_queue_key("1"), "Schedule.1.RR.queue");
    }

    #[test]
    fn test_task_keys() {
        assert_eq!(task_info_key(42), "dtf.task.info.42");
        assert_eq!(generation_queue_key(42), "dtf.task.to.schedule.subtask.list.42");
        assert_eq!(task_lock_key(7), "dtf.task.lock.7");
    }
}
