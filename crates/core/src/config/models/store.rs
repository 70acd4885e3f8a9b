use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{SchedulerError, SchedulerResult};

/// 协调存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub connection_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            url: "redis://127.0.0.1:6379".to_string(),
            connection_timeout_seconds: 5,
        }
    }
}

impl StoreConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.backend == StoreBackend::Redis
            && !(self.url.starts_with("redis://") || self.url.starts_with("rediss://"))
        {
            return Err(SchedulerError::Configuration(format!(
                "协调存储地址必须以 redis:// 或 rediss:// 开头: {}",
                self.url
            )));
        }
        if self.connection_timeout_seconds == 0 {
            return Err(SchedulerError::Configuration(
                "协调存储连接超时必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}
