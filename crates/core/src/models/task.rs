use serde::{Deserialize, Serialize};

/// 任务ID
pub type TaskId = u64;

/// 任务优先级
///
/// 序列化为整数，任意整数按区间归入三个档位：
/// `<=1` 为 Low，`2` 为 Medium，`>=3` 为 High。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "u32", into = "u32")]
pub enum TaskPriority {
    #[default]
    Low,
    Medium,
    High,
}

impl TaskPriority {
    /// 调度时间片的优先级加成倍数
    pub fn slice_bonus(&self) -> u32 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Medium => 8,
            TaskPriority::High => 256,
        }
    }
}

impl From<u32> for TaskPriority {
    fn from(level: u32) -> Self {
        match level {
            0 | 1 => TaskPriority::Low,
            2 => TaskPriority::Medium,
            _ => TaskPriority::High,
        }
    }
}

impl From<TaskPriority> for u32 {
    fn from(priority: TaskPriority) -> Self {
        match priority {
            TaskPriority::Low => 1,
            TaskPriority::Medium => 2,
            TaskPriority::High => 3,
        }
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Created,
    Running,
    Paused,
    Cancelled,
    Completed,
    Exceptional,
}

impl TaskStatus {
    pub fn as_code(&self) -> i64 {
        match self {
            TaskStatus::Created => 1,
            TaskStatus::Running => 2,
            TaskStatus::Paused => 3,
            TaskStatus::Cancelled => 4,
            TaskStatus::Completed => 5,
            TaskStatus::Exceptional => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(TaskStatus::Created),
            2 => Some(TaskStatus::Running),
            3 => Some(TaskStatus::Paused),
            4 => Some(TaskStatus::Cancelled),
            5 => Some(TaskStatus::Completed),
            6 => Some(TaskStatus::Exceptional),
            _ => None,
        }
    }

    /// 是否已经结束
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Cancelled | TaskStatus::Completed | TaskStatus::Exceptional
        )
    }
}

/// 任务创建参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCreateParam {
    pub resource_group: String,
    pub task_type: u32,
    pub priority: TaskPriority,
    /// 任务整体超时时间（秒），0 表示不限制
    pub timeout: u64,
    /// 任务类型相关的参数，由插件自行解析
    #[serde(default)]
    pub type_param: String,
}

impl TaskCreateParam {
    pub fn new(resource_group: impl Into<String>, task_type: u32, priority: TaskPriority) -> Self {
        Self {
            resource_group: resource_group.into(),
            task_type,
            priority,
            timeout: 0,
            type_param: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_brackets() {
        assert_eq!(TaskPriority::from(0), TaskPriority::Low);
        assert_eq!(TaskPriority::from(1), TaskPriority::Low);
        assert_eq!(TaskPriority::from(2), TaskPriority::Medium);
        assert_eq!(TaskPriority::from(3), TaskPriority::High);
        assert_eq!(TaskPriority::from(100), TaskPriority::High);
    }

    #[test]
    fn test_slice_bonus_is_monotonic() {
        assert_eq!(TaskPriority::Low.slice_bonus(), 1);
        assert_eq!(TaskPriority::Medium.slice_bonus(), 8);
        assert_eq!(TaskPriority::High.slice_bonus(), 256);
        assert!(TaskPriority::Low.slice_bonus() < TaskPriority::Medium.slice_bonus());
        assert!(TaskPriority::Medium.slice_bonus() < TaskPriority::High.slice_bonus());
    }

    #[test]
    fn test_create_param_serializes_priority_as_number() {
        let param = TaskCreateParam::new("default", 7, TaskPriority::Medium);
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["priority"], 2);

        let parsed: TaskCreateParam = serde_json::from_str(
            r#"{"resource_group":"g","task_type":1,"priority":9,"timeout":30}"#,
        )
        .unwrap();
        assert_eq!(parsed.priority, TaskPriority::High);
        assert_eq!(parsed.type_param, "");
    }

    #[test]
    fn test_task_status_codes() {
        for status in [
            TaskStatus::Created,
            TaskStatus::Running,
            TaskStatus::Paused,
            TaskStatus::Cancelled,
            TaskStatus::Completed,
            TaskStatus::Exceptional,
        ] {
            assert_eq!(TaskStatus::from_code(status.as_code()), Some(status));
        }
        assert_eq!(TaskStatus::from_code(42), None);
        assert!(TaskStatus::Completed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}
