use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskId;

/// 子任务ID
pub type SubtaskId = u64;

/// 子任务数据
///
/// 生成器插件产生子任务后写入任务的生成队列，调度时取出打包，
/// 最终以批量形式推送给执行器。`type_param` 的内容由任务类型插件自行解释。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskData {
    pub subtask_id: SubtaskId,
    pub task_id: TaskId,
    pub task_type: u32,
    /// 超时时间（秒）
    pub timeout: u32,
    #[serde(default)]
    pub type_param: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub terminated_at: Option<DateTime<Utc>>,
}

impl SubtaskData {
    pub fn new(subtask_id: SubtaskId, task_id: TaskId, task_type: u32) -> Self {
        Self {
            subtask_id,
            task_id,
            task_type,
            timeout: 0,
            type_param: String::new(),
            created_at: Utc::now(),
            terminated_at: None,
        }
    }

    /// 子任务的最晚有效时间：创建时间加上自身超时
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + chrono::Duration::seconds(i64::from(self.timeout))
    }
}

/// 子任务执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubtaskResult {
    Success,
    Failure,
    Timeout,
}

impl SubtaskResult {
    pub fn as_code(&self) -> i64 {
        match self {
            SubtaskResult::Success => 1,
            SubtaskResult::Failure => 2,
            SubtaskResult::Timeout => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(SubtaskResult::Success),
            2 => Some(SubtaskResult::Failure),
            3 => Some(SubtaskResult::Timeout),
            _ => None,
        }
    }
}

/// 子任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubtaskStatus {
    Running,
    Finished,
    Cancelled,
    Timeout,
}

impl SubtaskStatus {
    pub fn as_code(&self) -> i64 {
        match self {
            SubtaskStatus::Running => 1,
            SubtaskStatus::Finished => 2,
            SubtaskStatus::Cancelled => 3,
            SubtaskStatus::Timeout => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(SubtaskStatus::Running),
            2 => Some(SubtaskStatus::Finished),
            3 => Some(SubtaskStatus::Cancelled),
            4 => Some(SubtaskStatus::Timeout),
            _ => None,
        }
    }
}

impl From<SubtaskResult> for SubtaskStatus {
    fn from(result: SubtaskResult) -> Self {
        match result {
            SubtaskResult::Success | SubtaskResult::Failure => SubtaskStatus::Finished,
            SubtaskResult::Timeout => SubtaskStatus::Timeout,
        }
    }
}
