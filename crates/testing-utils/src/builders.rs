//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{DateTime, Utc};
use dtf_core::models::{SubtaskData, SubtaskId, TaskCreateParam, TaskId, TaskPriority};

/// Builder for creating test SubtaskData entities
pub struct SubtaskBuilder {
    subtask: SubtaskData,
}

impl SubtaskBuilder {
    pub fn new() -> Self {
        let mut subtask = SubtaskData::new(1, 1, 1);
        subtask.timeout = 300;
        Self { subtask }
    }

    pub fn with_id(mut self, subtask_id: SubtaskId) -> Self {
        self.subtask.subtask_id = subtask_id;
        self
    }

    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.subtask.task_id = task_id;
        self
    }

    pub fn with_task_type(mut self, task_type: u32) -> Self {
        self.subtask.task_type = task_type;
        self
    }

    pub fn with_timeout(mut self, timeout: u32) -> Self {
        self.subtask.timeout = timeout;
        self
    }

    pub fn with_type_param(mut self, type_param: &str) -> Self {
        self.subtask.type_param = type_param.to_string();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.subtask.created_at = created_at;
        self
    }

    /// Created long enough ago that the subtask has already expired
    pub fn expired(mut self) -> Self {
        self.subtask.created_at =
            Utc::now() - chrono::Duration::seconds(i64::from(self.subtask.timeout) + 60);
        self
    }

    pub fn build(self) -> SubtaskData {
        self.subtask
    }
}

impl Default for SubtaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test TaskCreateParam values
pub struct TaskCreateParamBuilder {
    param: TaskCreateParam,
}

impl TaskCreateParamBuilder {
    pub fn new() -> Self {
        Self {
            param: TaskCreateParam::new("1", 1, TaskPriority::Low),
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.param.resource_group = group.to_string();
        self
    }

    pub fn with_task_type(mut self, task_type: u32) -> Self {
        self.param.task_type = task_type;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.param.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.param.timeout = timeout;
        self
    }

    pub fn with_type_param(mut self, type_param: &str) -> Self {
        self.param.type_param = type_param.to_string();
        self
    }

    pub fn high_priority(self) -> Self {
        self.with_priority(TaskPriority::High)
    }

    pub fn build(self) -> TaskCreateParam {
        self.param
    }
}

impl Default for TaskCreateParamBuilder {
    fn default() -> Self {
        Self::new()
    }
}
