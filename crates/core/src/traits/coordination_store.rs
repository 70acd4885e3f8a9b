//! 协调存储接口定义
//!
//! 协调存储是整个流水线唯一的共享可变状态，所有队列、所有权和进度信息都保存在这里。
//! 所有命令都通过 [`StoreBatch`] 批量提交：原子批次在 Redis 上对应 MULTI/EXEC
//! 流水线，在内存实现中对应一次临界区，保证同一步骤的修改要么全部生效要么全部不生效。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let mut batch = StoreBatch::atomic();
//! batch
//!     .rpush("Schedule.1.P0.queue", "42")
//!     .zrem("Schedule.current.task.list", "42");
//! let replies = store.exec(batch).await?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{SchedulerError, SchedulerResult};

/// 单条存储命令
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    /// 键不存在时设置，回复 1 表示设置成功
    SetNx {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    Del {
        key: String,
    },
    /// 值等于 `value` 时删除，回复 1 表示已删除
    DelIfEq {
        key: String,
        value: String,
    },
    /// 值等于 `value` 时重设过期时间，回复 1 表示已续期
    ExpireIfEq {
        key: String,
        value: String,
        ttl: Duration,
    },
    Exists {
        key: String,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    IncrBy {
        key: String,
        delta: i64,
    },
    LPush {
        key: String,
        values: Vec<String>,
    },
    RPush {
        key: String,
        values: Vec<String>,
    },
    LPop {
        key: String,
    },
    LLen {
        key: String,
    },
    LRange {
        key: String,
        start: i64,
        stop: i64,
    },
    ZAdd {
        key: String,
        members: Vec<(f64, String)>,
    },
    ZRem {
        key: String,
        members: Vec<String>,
    },
    ZCard {
        key: String,
    },
    /// 按分数范围查询，分数使用 `f64::NEG_INFINITY`/`f64::INFINITY` 表示无界
    ZRangeByScore {
        key: String,
        min: f64,
        max: f64,
        offset: usize,
        count: Option<usize>,
    },
    /// 按排名查询，支持负数下标
    ZRange {
        key: String,
        start: i64,
        stop: i64,
    },
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    HGet {
        key: String,
        field: String,
    },
    HGetAll {
        key: String,
    },
    HIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
}

impl StoreCommand {
    pub fn key(&self) -> &str {
        match self {
            StoreCommand::Get { key }
            | StoreCommand::Set { key, .. }
            | StoreCommand::SetNx { key, .. }
            | StoreCommand::Del { key }
            | StoreCommand::DelIfEq { key, .. }
            | StoreCommand::ExpireIfEq { key, .. }
            | StoreCommand::Exists { key }
            | StoreCommand::Expire { key, .. }
            | StoreCommand::IncrBy { key, .. }
            | StoreCommand::LPush { key, .. }
            | StoreCommand::RPush { key, .. }
            | StoreCommand::LPop { key }
            | StoreCommand::LLen { key }
            | StoreCommand::LRange { key, .. }
            | StoreCommand::ZAdd { key, .. }
            | StoreCommand::ZRem { key, .. }
            | StoreCommand::ZCard { key }
            | StoreCommand::ZRangeByScore { key, .. }
            | StoreCommand::ZRange { key, .. }
            | StoreCommand::HSet { key, .. }
            | StoreCommand::HGet { key, .. }
            | StoreCommand::HGetAll { key }
            | StoreCommand::HIncrBy { key, .. } => key,
        }
    }
}

/// 命令回复
#[derive(Debug, Clone, PartialEq)]
pub enum StoreReply {
    Nil,
    Ok,
    Int(i64),
    Value(String),
    Array(Vec<String>),
    Map(HashMap<String, String>),
}

impl StoreReply {
    /// 整数回复，Nil 视为 0
    pub fn as_int(&self) -> SchedulerResult<i64> {
        match self {
            StoreReply::Int(v) => Ok(*v),
            StoreReply::Nil => Ok(0),
            StoreReply::Value(s) => s
                .parse::<i64>()
                .map_err(|e| SchedulerError::Store(format!("无法解析整数回复 {s}: {e}"))),
            other => Err(SchedulerError::Store(format!("期望整数回复，实际为 {other:?}"))),
        }
    }

    pub fn into_value(self) -> SchedulerResult<Option<String>> {
        match self {
            StoreReply::Nil => Ok(None),
            StoreReply::Value(s) => Ok(Some(s)),
            StoreReply::Int(v) => Ok(Some(v.to_string())),
            other => Err(SchedulerError::Store(format!("期望字符串回复，实际为 {other:?}"))),
        }
    }

    pub fn into_array(self) -> SchedulerResult<Vec<String>> {
        match self {
            StoreReply::Nil => Ok(Vec::new()),
            StoreReply::Array(items) => Ok(items),
            other => Err(SchedulerError::Store(format!("期望数组回复，实际为 {other:?}"))),
        }
    }

    pub fn into_map(self) -> SchedulerResult<HashMap<String, String>> {
        match self {
            StoreReply::Nil => Ok(HashMap::new()),
            StoreReply::Map(map) => Ok(map),
            other => Err(SchedulerError::Store(format!("期望哈希回复，实际为 {other:?}"))),
        }
    }
}

/// 批量命令
///
/// 构造方式与 `redis::pipe()` 相同，链式追加命令后交给 [`CoordinationStore::exec`] 执行，
/// 回复按命令顺序返回。
#[derive(Debug, Clone, Default)]
pub struct StoreBatch {
    commands: Vec<StoreCommand>,
    atomic: bool,
}

impl StoreBatch {
    /// 普通流水线，命令之间不保证原子性
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子批次
    pub fn atomic() -> Self {
        Self {
            commands: Vec::new(),
            atomic: true,
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    pub fn commands(&self) -> &[StoreCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<StoreCommand> {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn push(&mut self, command: StoreCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::Get { key: key.into() })
    }

    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> &mut Self {
        self.push(StoreCommand::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        })
    }

    pub fn set_nx(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> &mut Self {
        self.push(StoreCommand::SetNx {
            key: key.into(),
            value: value.into(),
            ttl,
        })
    }

    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::Del { key: key.into() })
    }

    pub fn del_if_eq(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::DelIfEq {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn expire_if_eq(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Duration,
    ) -> &mut Self {
        self.push(StoreCommand::ExpireIfEq {
            key: key.into(),
            value: value.into(),
            ttl,
        })
    }

    pub fn exists(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::Exists { key: key.into() })
    }

    pub fn expire(&mut self, key: impl Into<String>, ttl: Duration) -> &mut Self {
        self.push(StoreCommand::Expire {
            key: key.into(),
            ttl,
        })
    }

    pub fn incr_by(&mut self, key: impl Into<String>, delta: i64) -> &mut Self {
        self.push(StoreCommand::IncrBy {
            key: key.into(),
            delta,
        })
    }

    pub fn lpush(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::LPush {
            key: key.into(),
            values: vec![value.into()],
        })
    }

    pub fn rpush(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::RPush {
            key: key.into(),
            values: vec![value.into()],
        })
    }

    pub fn rpush_all(&mut self, key: impl Into<String>, values: Vec<String>) -> &mut Self {
        self.push(StoreCommand::RPush {
            key: key.into(),
            values,
        })
    }

    pub fn lpop(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::LPop { key: key.into() })
    }

    pub fn llen(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::LLen { key: key.into() })
    }

    pub fn lrange(&mut self, key: impl Into<String>, start: i64, stop: i64) -> &mut Self {
        self.push(StoreCommand::LRange {
            key: key.into(),
            start,
            stop,
        })
    }

    pub fn zadd(&mut self, key: impl Into<String>, score: f64, member: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::ZAdd {
            key: key.into(),
            members: vec![(score, member.into())],
        })
    }

    pub fn zadd_all(&mut self, key: impl Into<String>, members: Vec<(f64, String)>) -> &mut Self {
        self.push(StoreCommand::ZAdd {
            key: key.into(),
            members,
        })
    }

    pub fn zrem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::ZRem {
            key: key.into(),
            members: vec![member.into()],
        })
    }

    pub fn zcard(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::ZCard { key: key.into() })
    }

    pub fn zrange_by_score(
        &mut self,
        key: impl Into<String>,
        min: f64,
        max: f64,
        count: Option<usize>,
    ) -> &mut Self {
        self.push(StoreCommand::ZRangeByScore {
            key: key.into(),
            min,
            max,
            offset: 0,
            count,
        })
    }

    pub fn zrange(&mut self, key: impl Into<String>, start: i64, stop: i64) -> &mut Self {
        self.push(StoreCommand::ZRange {
            key: key.into(),
            start,
            stop,
        })
    }

    pub fn hset(&mut self, key: impl Into<String>, fields: Vec<(String, String)>) -> &mut Self {
        self.push(StoreCommand::HSet {
            key: key.into(),
            fields,
        })
    }

    pub fn hget(&mut self, key: impl Into<String>, field: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::HGet {
            key: key.into(),
            field: field.into(),
        })
    }

    pub fn hgetall(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(StoreCommand::HGetAll { key: key.into() })
    }

    pub fn hincr_by(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        delta: i64,
    ) -> &mut Self {
        self.push(StoreCommand::HIncrBy {
            key: key.into(),
            field: field.into(),
            delta,
        })
    }
}

/// 协调存储抽象接口
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// 执行一批命令，按顺序返回每条命令的回复
    async fn exec(&self, batch: StoreBatch) -> SchedulerResult<Vec<StoreReply>>;

    /// 检查存储是否可用
    async fn ping(&self) -> SchedulerResult<()>;

    /// 执行单条命令
    async fn exec_one(&self, command: StoreCommand) -> SchedulerResult<StoreReply> {
        let mut batch = StoreBatch::new();
        batch.push(command);
        self.exec(batch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SchedulerError::Store("命令没有返回回复".to_string()))
    }

    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        self.exec_one(StoreCommand::Get {
            key: key.to_string(),
        })
        .await?
        .into_value()
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SchedulerResult<()> {
        self.exec_one(StoreCommand::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        })
        .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> SchedulerResult<i64> {
        self.exec_one(StoreCommand::Del {
            key: key.to_string(),
        })
        .await?
        .as_int()
    }

    async fn exists(&self, key: &str) -> SchedulerResult<bool> {
        let count = self
            .exec_one(StoreCommand::Exists {
                key: key.to_string(),
            })
            .await?
            .as_int()?;
        Ok(count > 0)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> SchedulerResult<i64> {
        self.exec_one(StoreCommand::IncrBy {
            key: key.to_string(),
            delta,
        })
        .await?
        .as_int()
    }

    async fn rpush(&self, key: &str, value: &str) -> SchedulerResult<i64> {
        self.exec_one(StoreCommand::RPush {
            key: key.to_string(),
            values: vec![value.to_string()],
        })
        .await?
        .as_int()
    }

    async fn lpop(&self, key: &str) -> SchedulerResult<Option<String>> {
        self.exec_one(StoreCommand::LPop {
            key: key.to_string(),
        })
        .await?
        .into_value()
    }

    async fn llen(&self, key: &str) -> SchedulerResult<i64> {
        self.exec_one(StoreCommand::LLen {
            key: key.to_string(),
        })
        .await?
        .as_int()
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> SchedulerResult<Vec<String>> {
        self.exec_one(StoreCommand::LRange {
            key: key.to_string(),
            start,
            stop,
        })
        .await?
        .into_array()
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> SchedulerResult<i64> {
        self.exec_one(StoreCommand::ZAdd {
            key: key.to_string(),
            members: vec![(score, member.to_string())],
        })
        .await?
        .as_int()
    }

    async fn zrem(&self, key: &str, member: &str) -> SchedulerResult<i64> {
        self.exec_one(StoreCommand::ZRem {
            key: key.to_string(),
            members: vec![member.to_string()],
        })
        .await?
        .as_int()
    }

    async fn zcard(&self, key: &str) -> SchedulerResult<i64> {
        self.exec_one(StoreCommand::ZCard {
            key: key.to_string(),
        })
        .await?
        .as_int()
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        count: Option<usize>,
    ) -> SchedulerResult<Vec<String>> {
        self.exec_one(StoreCommand::ZRangeByScore {
            key: key.to_string(),
            min,
            max,
            offset: 0,
            count,
        })
        .await?
        .into_array()
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> SchedulerResult<Vec<String>> {
        self.exec_one(StoreCommand::ZRange {
            key: key.to_string(),
            start,
            stop,
        })
        .await?
        .into_array()
    }

    async fn hget(&self, key: &str, field: &str) -> SchedulerResult<Option<String>> {
        self.exec_one(StoreCommand::HGet {
            key: key.to_string(),
            field: field.to_string(),
        })
        .await?
        .into_value()
    }

    async fn hgetall(&self, key: &str) -> SchedulerResult<HashMap<String, String>> {
        self.exec_one(StoreCommand::HGetAll {
            key: key.to_string(),
        })
        .await?
        .into_map()
    }
}
