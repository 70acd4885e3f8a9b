use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{SchedulerError, SchedulerResult};

/// 一类后台例程的并发数和执行间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineConfig {
    pub count: usize,
    pub interval_ms: u64,
}

impl RoutineConfig {
    pub const fn new(count: usize, interval_ms: u64) -> Self {
        Self { count, interval_ms }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// 各角色的后台例程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutinesConfig {
    pub schedule_task: RoutineConfig,
    pub retry_push: RoutineConfig,
    pub subtask_timeout: RoutineConfig,
    pub subtask_complete: RoutineConfig,
    pub task_complete: RoutineConfig,
    pub task_timeout: RoutineConfig,
    pub task_cleanup: RoutineConfig,
    pub generation_monitor: RoutineConfig,
    pub task_generation: RoutineConfig,
    pub id_refill: RoutineConfig,
}

impl Default for RoutinesConfig {
    fn default() -> Self {
        Self {
            schedule_task: RoutineConfig::new(10, 200),
            retry_push: RoutineConfig::new(1, 2000),
            subtask_timeout: RoutineConfig::new(5, 2000),
            subtask_complete: RoutineConfig::new(10, 200),
            task_complete: RoutineConfig::new(2, 1000),
            task_timeout: RoutineConfig::new(1, 2000),
            task_cleanup: RoutineConfig::new(1, 2000),
            generation_monitor: RoutineConfig::new(2, 30_000),
            task_generation: RoutineConfig::new(2, 1000),
            id_refill: RoutineConfig::new(1, 5000),
        }
    }
}

impl RoutinesConfig {
    fn entries(&self) -> [(&'static str, &RoutineConfig); 10] {
        [
            ("schedule_task", &self.schedule_task),
            ("retry_push", &self.retry_push),
            ("subtask_timeout", &self.subtask_timeout),
            ("subtask_complete", &self.subtask_complete),
            ("task_complete", &self.task_complete),
            ("task_timeout", &self.task_timeout),
            ("task_cleanup", &self.task_cleanup),
            ("generation_monitor", &self.generation_monitor),
            ("task_generation", &self.task_generation),
            ("id_refill", &self.id_refill),
        ]
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        for (name, routine) in self.entries() {
            if routine.count == 0 || routine.interval_ms == 0 {
                return Err(SchedulerError::Configuration(format!(
                    "例程 {name} 的数量和间隔必须大于0"
                )));
            }
        }
        Ok(())
    }
}
