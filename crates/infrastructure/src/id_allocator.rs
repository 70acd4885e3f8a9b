//! 双缓冲 ID 区间分配
//!
//! 每个 ID 键在本地维护两个半开区间 `[start, former_end)` 和 `[new_start, end)`：
//! 前者是正在发放的区间，后者是已经预留、尚未启用的区间。剩余数量低于低水位时，
//! 通过协调存储上的原子自增预留下一个区间，旧区间用完后无缝切换到新区间。
//! 协调存储的计数器是唯一的自增点，因此 ID 全局唯一且在单节点上严格递增。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use dtf_core::{config::IdAllocatorConfig, CoordinationStore, SchedulerError, SchedulerResult};

/// 一个 ID 键的本地区间状态
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub start: u64,
    pub former_end: u64,
    pub new_start: u64,
    pub end: u64,
    /// 两个区间中尚未发放的 ID 数量
    pub count: u64,
}

impl IdRange {
    /// 发放一个 ID，没有剩余时返回 None
    pub fn take(&mut self) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        self.count -= 1;

        if self.former_end == 0 || self.start < self.former_end {
            let id = self.start;
            self.start += 1;
            return Some(id);
        }

        // 旧区间已用完，切换到预留区间，两个区间合并为一个
        self.start = self.new_start;
        let id = self.start;
        self.start += 1;
        self.former_end = 0;
        self.new_start = 0;
        Some(id)
    }

    /// 记录一次新的预留，`counter` 为协调存储计数器自增后的值
    pub fn extend(&mut self, counter: u64, step: u64) {
        self.count += step;
        self.former_end = self.end;
        self.end = counter + 1;
        if self.start == 0 {
            self.start = self.end - step;
        }
        self.new_start = self.end - step;
    }
}

pub struct IdRangeAllocator {
    store: Arc<dyn CoordinationStore>,
    step: u64,
    low_water_mark: u64,
    ranges: RwLock<HashMap<String, Arc<Mutex<IdRange>>>>,
}

impl IdRangeAllocator {
    pub fn new(store: Arc<dyn CoordinationStore>, config: Option<IdAllocatorConfig>) -> Self {
        let config = config.unwrap_or_default();
        Self {
            store,
            step: config.step,
            low_water_mark: config.low_water_mark,
            ranges: RwLock::new(HashMap::new()),
        }
    }

    /// 初始化一个 ID 键并预留第一个区间
    pub async fn init(&self, key: &str) -> SchedulerResult<()> {
        let range = {
            let mut ranges = self.ranges.write().await;
            ranges
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(IdRange::default())))
                .clone()
        };

        let mut range = range.lock().await;
        self.realloc_locked(key, &mut range).await?;
        info!("ID 键初始化完成: {}, 当前区间 [{}, {})", key, range.start, range.end);
        Ok(())
    }

    /// 获取一个 ID
    pub async fn get_id(&self, key: &str) -> SchedulerResult<u64> {
        let range = self.range_of(key).await?;
        let mut range = range.lock().await;

        for _ in 0..2 {
            if range.count == 0 {
                self.realloc_locked(key, &mut range).await?;
            }
            if let Some(id) = range.take() {
                return Ok(id);
            }
        }

        warn!("没有可用的 ID: {}", key);
        Err(SchedulerError::NoAvailableId {
            key: key.to_string(),
        })
    }

    /// 剩余数量低于低水位时预留下一个区间
    pub async fn realloc_if_needed(&self, key: &str) -> SchedulerResult<()> {
        let range = self.range_of(key).await?;
        let mut range = range.lock().await;
        self.realloc_locked(key, &mut range).await
    }

    /// 检查所有已初始化的键
    pub async fn realloc_all(&self) -> SchedulerResult<()> {
        let keys: Vec<String> = self.ranges.read().await.keys().cloned().collect();
        for key in keys {
            if let Err(e) = self.realloc_if_needed(&key).await {
                warn!("预留 ID 区间失败: {}, {}", key, e);
            }
        }
        Ok(())
    }

    /// 区间状态快照
    pub async fn snapshot(&self, key: &str) -> SchedulerResult<IdRange> {
        let range = self.range_of(key).await?;
        let range = range.lock().await;
        Ok(*range)
    }

    async fn range_of(&self, key: &str) -> SchedulerResult<Arc<Mutex<IdRange>>> {
        self.ranges
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownIdKey {
                key: key.to_string(),
            })
    }

    async fn realloc_locked(&self, key: &str, range: &mut IdRange) -> SchedulerResult<()> {
        if range.count > self.low_water_mark {
            return Ok(());
        }

        let counter = self.store.incr_by(key, self.step as i64).await?;
        let counter = u64::try_from(counter).map_err(|_| {
            SchedulerError::Store(format!("ID 计数器 {key} 的值无效: {counter}"))
        })?;
        range.extend(counter, self.step);

        debug!(
            "预留 ID 区间: {}, 新区间 [{}, {}), 剩余 {}",
            key, range.new_start, range.end, range.count
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reservation_backfills_start() {
        let mut range = IdRange::default();
        range.extend(100, 100);
        assert_eq!(range.start, 1);
        assert_eq!(range.end, 101);
        assert_eq!(range.former_end, 0);
        assert_eq!(range.count, 100);
        assert_eq!(range.take(), Some(1));
        assert_eq!(range.take(), Some(2));
    }

    #[test]
    fn test_switch_to_reserved_range() {
        let mut range = IdRange::default();
        range.extend(10, 10);
        for expected in 1..=8 {
            assert_eq!(range.take(), Some(expected));
        }

        // 其他节点占用了 11..=20，本节点预留到 21..=30
        range.extend(30, 10);
        assert_eq!(range.former_end, 11);
        assert_eq!(range.new_start, 21);

        assert_eq!(range.take(), Some(9));
        assert_eq!(range.take(), Some(10));
        assert_eq!(range.take(), Some(21));
        assert_eq!(range.former_end, 0);
        assert_eq!(range.new_start, 0);
        assert_eq!(range.count, 9);
    }

    #[test]
    fn test_take_on_empty_range() {
        let mut range = IdRange::default();
        assert_eq!(range.take(), None);
    }
}
