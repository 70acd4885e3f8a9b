//! Redis 协调存储实现

mod commands;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Value};
use tracing::{debug, error, info};

use dtf_core::{
    config::StoreConfig, CoordinationStore, SchedulerError, SchedulerResult, StoreBatch,
    StoreReply,
};

use commands::{convert_reply, to_redis_cmd};

/// 基于 Redis 的协调存储
///
/// 使用 `ConnectionManager` 维护一条自动重连的多路复用连接，
/// 批次通过流水线发送，原子批次使用 MULTI/EXEC 包裹。
#[derive(Clone)]
pub struct RedisCoordinationStore {
    connection: ConnectionManager,
    url: String,
}

impl RedisCoordinationStore {
    pub async fn new(config: &StoreConfig) -> SchedulerResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| SchedulerError::Store(format!("创建Redis客户端失败: {e}")))?;

        let connection =
            tokio::time::timeout(config.connection_timeout(), ConnectionManager::new(client))
                .await
                .map_err(|_| {
                    SchedulerError::Store(format!("连接Redis超时: {}", config.url))
                })?
                .map_err(|e| SchedulerError::Store(format!("连接Redis失败: {e}")))?;

        let store = Self {
            connection,
            url: config.url.clone(),
        };
        store.ping().await?;
        info!("已连接协调存储: {}", store.url);

        Ok(store)
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn exec(&self, batch: StoreBatch) -> SchedulerResult<Vec<StoreReply>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        if batch.is_atomic() {
            pipe.atomic();
        }
        for command in batch.commands() {
            pipe.add_command(to_redis_cmd(command));
        }

        let mut connection = self.connection.clone();
        let values: Vec<Value> = pipe.query_async(&mut connection).await.map_err(|e| {
            metrics::counter!("dtf_store_errors_total").increment(1);
            error!("执行Redis批量命令失败: {}", e);
            SchedulerError::Store(format!("Redis命令执行失败: {e}"))
        })?;

        if values.len() != batch.len() {
            return Err(SchedulerError::Store(format!(
                "Redis回复数量不匹配: 期望 {}, 实际 {}",
                batch.len(),
                values.len()
            )));
        }

        batch
            .commands()
            .iter()
            .zip(values.iter())
            .map(|(command, value)| convert_reply(command, value))
            .collect()
    }

    async fn ping(&self) -> SchedulerResult<()> {
        let mut connection = self.connection.clone();
        let response: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| SchedulerError::Store(format!("Redis PING失败: {e}")))?;

        if response == "PONG" {
            debug!("Redis连接检查成功");
            Ok(())
        } else {
            Err(SchedulerError::Store(format!(
                "意外的PING回复: {response}"
            )))
        }
    }
}
