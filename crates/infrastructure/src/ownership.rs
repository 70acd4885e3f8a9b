//! 所有权仲裁
//!
//! 提供两种在整个集群中保证"同一项只被一个节点处理"的手段：
//!
//! - **带 TTL 的排他锁**：键不存在时设置并附带过期时间，获取失败时按固定间隔轮询，
//!   直到调用方给出的超时时间。持有者需要定期续期。
//! - **移除即认领**：共享的有序集合中的成员表示"尚未被认领"，原子地移除成员即为认领，
//!   移除数量大于 0 表示认领成功，等于 0 表示已被其他节点认领。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use dtf_core::{
    unix_now, CoordinationStore, SchedulerError, SchedulerResult, StoreBatch, StoreReply,
};

/// 获取锁时的轮询间隔
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct OwnershipArbiter {
    store: Arc<dyn CoordinationStore>,
    owner: String,
    poll_interval: Duration,
}

impl OwnershipArbiter {
    /// `owner` 写入锁的值，用于识别锁的持有者
    pub fn new(store: Arc<dyn CoordinationStore>, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
            poll_interval: LOCK_POLL_INTERVAL,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 尝试获取排他锁
    ///
    /// 至少尝试一次，之后按轮询间隔重试直到 `timeout`。超时未获取到返回 `Ok(false)`。
    pub async fn try_to_own(&self, key: &str, timeout: Duration, ttl: Duration) -> SchedulerResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut batch = StoreBatch::new();
            batch.set_nx(key, self.owner.as_str(), Some(ttl));
            let acquired = first_int(self.store.exec(batch).await?)? > 0;

            if acquired {
                debug!("获取锁成功: {}", key);
                return Ok(true);
            }

            if Instant::now() + self.poll_interval > deadline {
                debug!("获取锁超时: {}", key);
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 释放排他锁
    ///
    /// 只删除本节点持有的锁，锁已过期并被其他节点获取时保持不变。
    pub async fn release(&self, key: &str) -> SchedulerResult<()> {
        let mut batch = StoreBatch::new();
        batch.del_if_eq(key, self.owner.as_str());
        let released = first_int(self.store.exec(batch).await?)? > 0;
        if released {
            debug!("释放锁: {}", key);
        } else {
            debug!("锁 {} 已不属于本节点, 跳过释放", key);
        }
        Ok(())
    }

    /// 续期排他锁
    ///
    /// 锁已被其他节点持有时返回 `OwnershipLost`；锁已过期时重新获取并记录警告。
    pub async fn renew(&self, key: &str, ttl: Duration) -> SchedulerResult<()> {
        let mut batch = StoreBatch::atomic();
        batch
            .expire_if_eq(key, self.owner.as_str(), ttl)
            .set_nx(key, self.owner.as_str(), Some(ttl));
        let replies = self.store.exec(batch).await?;

        let renewed = replies.first().map(|r| r.as_int()).transpose()?.unwrap_or(0) > 0;
        let reacquired = replies.get(1).map(|r| r.as_int()).transpose()?.unwrap_or(0) > 0;
        if renewed {
            return Ok(());
        }
        if reacquired {
            warn!("锁 {} 已过期, 续期时重新获取", key);
            return Ok(());
        }
        Err(SchedulerError::OwnershipLost(key.to_string()))
    }

    /// 认领有序集合中的单个成员
    pub async fn try_to_own_element(&self, set_key: &str, member: u64) -> SchedulerResult<bool> {
        let owned = self.try_to_own_elements(set_key, &[member]).await?;
        Ok(!owned.is_empty())
    }

    /// 批量认领有序集合中的成员，返回认领成功的成员
    pub async fn try_to_own_elements(&self, set_key: &str, members: &[u64]) -> SchedulerResult<Vec<u64>> {
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = StoreBatch::atomic();
        for member in members {
            batch.zrem(set_key, member.to_string());
        }
        let replies = self.store.exec(batch).await?;

        let mut owned = Vec::with_capacity(members.len());
        for (member, reply) in members.iter().zip(replies.iter()) {
            if reply.as_int()? > 0 {
                owned.push(*member);
            } else {
                debug!("{} 中的 {} 已被其他节点认领", set_key, member);
            }
        }
        Ok(owned)
    }

    /// 获取有序集合中截止时间已过的成员
    ///
    /// 无法解析为整数的成员会被直接移除。
    pub async fn get_timeout_elements(&self, set_key: &str, count: usize) -> SchedulerResult<Vec<u64>> {
        let now = unix_now() as f64;
        let members = self
            .store
            .zrange_by_score(set_key, f64::NEG_INFINITY, now, Some(count))
            .await?;
        Ok(self.parse_members(set_key, members).await)
    }

    /// 获取有序集合中的前 `count` 个成员，不论截止时间
    pub async fn get_elements(&self, set_key: &str, count: usize) -> SchedulerResult<Vec<u64>> {
        let members = self
            .store
            .zrange_by_score(set_key, f64::NEG_INFINITY, f64::INFINITY, Some(count))
            .await?;
        Ok(self.parse_members(set_key, members).await)
    }

    async fn parse_members(&self, set_key: &str, members: Vec<String>) -> Vec<u64> {
        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            match member.parse::<u64>() {
                Ok(id) => ids.push(id),
                Err(_) => {
                    warn!("移除 {} 中无效的成员: {}", set_key, member);
                    if let Err(e) = self.store.zrem(set_key, &member).await {
                        warn!("移除无效成员失败: {}", e);
                    }
                }
            }
        }
        ids
    }
}

fn first_int(replies: Vec<StoreReply>) -> SchedulerResult<i64> {
    replies
        .first()
        .map(StoreReply::as_int)
        .transpose()
        .map(|value| value.unwrap_or(0))
}
