use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{SchedulerError, SchedulerResult};

/// 调度队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub priority_queue_count: usize,
    pub base_time_slice_ms: u64,
    pub time_slice_step_ms: u64,
    pub rr_time_slice_ms: u64,
    pub base_slice_count: u32,
    pub rr_base_slice_count: u32,
    pub quiet_task_max_interval_seconds: u64,
    pub priority_boost_interval_seconds: u64,
    pub rr_priority_boost_interval_seconds: u64,
    pub priority_boost_max_tasks: usize,
    pub remain_acceleration_interval_seconds: u64,
    pub current_task_timeout_seconds: u64,
    pub lost_task_check_interval_seconds: u64,
    pub lost_task_scan_count: usize,
    pub resource_group_sync_interval_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            priority_queue_count: 2,
            base_time_slice_ms: 1000,                   // 1秒
            time_slice_step_ms: 1000,                   // 每降一级增加1秒
            rr_time_slice_ms: 5000,                     // 5秒
            base_slice_count: 40,
            rr_base_slice_count: 1_000_000,             // 轮转队列视为不限
            quiet_task_max_interval_seconds: 600,       // 10分钟
            priority_boost_interval_seconds: 120,       // 2分钟
            rr_priority_boost_interval_seconds: 240,    // 4分钟
            priority_boost_max_tasks: 10,
            remain_acceleration_interval_seconds: 300,  // 5分钟
            current_task_timeout_seconds: 60,
            lost_task_check_interval_seconds: 10,
            lost_task_scan_count: 100,
            resource_group_sync_interval_seconds: 120,  // 2分钟
        }
    }
}

impl QueueConfig {
    /// 第 `level` 级优先级队列的时间片
    pub fn time_slice_for_level(&self, level: usize) -> Duration {
        Duration::from_millis(self.base_time_slice_ms + level as u64 * self.time_slice_step_ms)
    }

    pub fn rr_time_slice(&self) -> Duration {
        Duration::from_millis(self.rr_time_slice_ms)
    }

    pub fn quiet_task_max_interval(&self) -> Duration {
        Duration::from_secs(self.quiet_task_max_interval_seconds)
    }

    pub fn priority_boost_interval(&self) -> Duration {
        Duration::from_secs(self.priority_boost_interval_seconds)
    }

    pub fn rr_priority_boost_interval(&self) -> Duration {
        Duration::from_secs(self.rr_priority_boost_interval_seconds)
    }

    pub fn remain_acceleration_interval(&self) -> Duration {
        Duration::from_secs(self.remain_acceleration_interval_seconds)
    }

    pub fn current_task_timeout(&self) -> Duration {
        Duration::from_secs(self.current_task_timeout_seconds)
    }

    pub fn lost_task_check_interval(&self) -> Duration {
        Duration::from_secs(self.lost_task_check_interval_seconds)
    }

    pub fn resource_group_sync_interval(&self) -> Duration {
        Duration::from_secs(self.resource_group_sync_interval_seconds)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.priority_queue_count == 0 {
            return Err(SchedulerError::Configuration(
                "优先级队列数量必须大于0".to_string(),
            ));
        }
        if self.base_time_slice_ms == 0 || self.rr_time_slice_ms == 0 {
            return Err(SchedulerError::Configuration("队列时间片必须大于0".to_string()));
        }
        if self.base_slice_count == 0 || self.rr_base_slice_count == 0 {
            return Err(SchedulerError::Configuration(
                "队列基础时间片数量必须大于0".to_string(),
            ));
        }
        if self.current_task_timeout_seconds == 0 {
            return Err(SchedulerError::Configuration(
                "调度中任务的超时时间必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}
