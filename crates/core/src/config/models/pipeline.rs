use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::keys::{SUBTASK_ID_KEY, TASK_ID_KEY};
use crate::{SchedulerError, SchedulerResult};

/// ID 分配器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdAllocatorConfig {
    pub step: u64,
    pub low_water_mark: u64,
    pub keys: Vec<String>,
}

impl Default for IdAllocatorConfig {
    fn default() -> Self {
        Self {
            step: 100,
            low_water_mark: 20,
            keys: vec![TASK_ID_KEY.to_string(), SUBTASK_ID_KEY.to_string()],
        }
    }
}

impl IdAllocatorConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.step == 0 {
            return Err(SchedulerError::Configuration(
                "ID 分配步长必须大于0".to_string(),
            ));
        }
        if self.low_water_mark >= self.step {
            return Err(SchedulerError::Configuration(format!(
                "ID 低水位 {} 必须小于分配步长 {}",
                self.low_water_mark, self.step
            )));
        }
        Ok(())
    }
}

/// 执行器推送配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub endpoint: String,
    pub max_push_batch: usize,
    pub push_interval_ms: u64,
    pub retry_expiry_margin_seconds: u64,
    pub retry_batch: usize,
    pub retry_list_ttl_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8090/subtasks".to_string(),
            max_push_batch: 10,
            push_interval_ms: 1,
            retry_expiry_margin_seconds: 2,
            retry_batch: 10,
            retry_list_ttl_seconds: 8 * 3600, // 8小时
            request_timeout_seconds: 10,
        }
    }
}

impl ExecutorConfig {
    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }

    pub fn retry_list_ttl(&self) -> Duration {
        Duration::from_secs(self.retry_list_ttl_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.max_push_batch == 0 || self.retry_batch == 0 {
            return Err(SchedulerError::Configuration(
                "执行器推送批量必须大于0".to_string(),
            ));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(SchedulerError::Configuration(format!(
                "执行器地址必须是 HTTP(S) 地址: {}",
                self.endpoint
            )));
        }
        Ok(())
    }
}

/// 子任务生成配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub lock_timeout_ms: u64,
    pub lock_ttl_seconds: u64,
    pub lock_renew_interval_seconds: u64,
    pub next_check_interval_seconds: u64,
    pub max_concurrent_generations: usize,
    pub subtask_default_timeout_seconds: u32,
    pub subtask_max_timeout_seconds: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 200,
            lock_ttl_seconds: 300,             // 5分钟
            lock_renew_interval_seconds: 60,
            next_check_interval_seconds: 30,
            max_concurrent_generations: 100,
            subtask_default_timeout_seconds: 300,
            subtask_max_timeout_seconds: 1800,
        }
    }
}

impl GenerationConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn lock_renew_interval(&self) -> Duration {
        Duration::from_secs(self.lock_renew_interval_seconds)
    }

    pub fn next_check_interval(&self) -> Duration {
        Duration::from_secs(self.next_check_interval_seconds)
    }

    /// 规范化子任务超时：0 取默认值，超过上限取上限
    pub fn clamp_subtask_timeout(&self, timeout: u32) -> u32 {
        if timeout == 0 {
            self.subtask_default_timeout_seconds
        } else {
            timeout.min(self.subtask_max_timeout_seconds)
        }
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.lock_renew_interval_seconds >= self.lock_ttl_seconds {
            return Err(SchedulerError::Configuration(
                "生成锁的续期间隔必须小于锁的过期时间".to_string(),
            ));
        }
        if self.max_concurrent_generations == 0 {
            return Err(SchedulerError::Configuration(
                "并发生成数量必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        let levels = ["trace", "debug", "info", "warn", "error"];
        if !levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(SchedulerError::Configuration(format!(
                "无效的日志级别: {}",
                self.log_level
            )));
        }
        if !["json", "pretty"].contains(&self.log_format.as_str()) {
            return Err(SchedulerError::Configuration(format!(
                "无效的日志格式: {}",
                self.log_format
            )));
        }
        Ok(())
    }
}
