pub mod generation_queue;
pub mod http_executor;
pub mod id_allocator;
pub mod in_memory_store;
pub mod ownership;
pub mod redis_store;
pub mod task_store;

pub use generation_queue::GenerationQueue;
pub use http_executor::HttpExecutorInvoker;
pub use id_allocator::{IdRange, IdRangeAllocator};
pub use in_memory_store::InMemoryCoordinationStore;
pub use ownership::OwnershipArbiter;
pub use redis_store::RedisCoordinationStore;
pub use task_store::{SubtaskCounters, TaskStore};

use std::sync::Arc;

use dtf_core::{
    config::{StoreBackend, StoreConfig},
    CoordinationStore, SchedulerResult,
};

/// 按配置创建协调存储
pub async fn create_coordination_store(
    config: &StoreConfig,
) -> SchedulerResult<Arc<dyn CoordinationStore>> {
    match config.backend {
        StoreBackend::Redis => Ok(Arc::new(RedisCoordinationStore::new(config).await?)),
        StoreBackend::Memory => {
            tracing::warn!("使用内存协调存储, 状态不会在节点之间共享");
            Ok(Arc::new(InMemoryCoordinationStore::new()))
        }
    }
}
