use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// 没有可处理的数据，属于正常结果
    #[error("未找到数据")]
    NotFound,

    /// 其他节点已经先一步取得所有权
    #[error("所有权已被其他节点获取: {0}")]
    OwnershipLost(String),

    #[error("协调存储错误: {0}")]
    Store(String),

    #[error("未知的资源组: {name}")]
    UnknownGroup { name: String },

    #[error("未知的任务类型: {task_type}")]
    UnknownTaskType { task_type: u32 },

    #[error("未初始化的ID键: {key}")]
    UnknownIdKey { key: String },

    #[error("没有可用的ID: {key}")]
    NoAvailableId { key: String },

    #[error("获取锁超时: {key}")]
    LockTimeout { key: String },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("推送子任务到执行器失败: {0}")]
    ExecutorPush(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 是否是"没有数据"这一正常结果
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::NotFound)
    }

    /// 是否是需要直接返回给调用方、不应重试的配置类错误
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::UnknownGroup { .. }
                | SchedulerError::UnknownTaskType { .. }
                | SchedulerError::UnknownIdKey { .. }
                | SchedulerError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
