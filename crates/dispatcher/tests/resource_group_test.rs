use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dtf_core::keys;
use dtf_core::models::{ResourceGroupRecord, TaskPriority};
use dtf_core::{unix_now, CoordinationStore, SchedulerError, SchedulerResult};
use dtf_dispatcher::{
    LostTaskMonitor, ResourceGroupMgr, ResourceGroupSource, StaticResourceGroupSource,
};
use dtf_infrastructure::{GenerationQueue, OwnershipArbiter};
use dtf_testing_utils::{SubtaskBuilder, TestStore};

/// 可在测试中修改记录的资源组来源
struct MutableSource {
    records: Mutex<Vec<ResourceGroupRecord>>,
}

impl MutableSource {
    fn new(records: Vec<ResourceGroupRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    fn set(&self, records: Vec<ResourceGroupRecord>) {
        *self.records.lock().unwrap() = records;
    }
}

#[async_trait]
impl ResourceGroupSource for MutableSource {
    async fn load(&self) -> SchedulerResult<Vec<ResourceGroupRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }
}

async fn mgr_with(env: &TestStore, records: Vec<ResourceGroupRecord>) -> Arc<ResourceGroupMgr> {
    let source = Arc::new(StaticResourceGroupSource::new(records));
    let mgr = Arc::new(ResourceGroupMgr::new(env.store.clone(), source, None));
    mgr.sync_groups().await.unwrap();
    mgr
}

#[tokio::test]
async fn test_add_task_to_unknown_group() {
    let env = TestStore::new();
    let mgr = mgr_with(&env, vec![ResourceGroupRecord::new(2, "1", 1.0)]).await;

    let err = mgr
        .add_task("missing", 1, 1, TaskPriority::Low)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::UnknownGroup { ref name } if name == "missing"));
    assert_eq!(mgr.get_task_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_select_without_groups_or_tasks() {
    let env = TestStore::new();
    let mgr = mgr_with(&env, Vec::new()).await;
    assert!(mgr.select().await.unwrap().is_none());

    let mgr = mgr_with(&env, vec![ResourceGroupRecord::new(2, "1", 1.0)]).await;
    assert!(mgr.select().await.unwrap().is_none());
}

#[tokio::test]
async fn test_select_single_group() {
    let env = TestStore::new();
    let mgr = mgr_with(&env, vec![ResourceGroupRecord::new(2, "1", 0.5)]).await;
    mgr.add_task("1", 1, 1, TaskPriority::Medium).await.unwrap();
    GenerationQueue::new(env.store.clone())
        .push(&SubtaskBuilder::new().with_id(10).with_task_id(1).build())
        .await
        .unwrap();

    let batch = mgr.select().await.unwrap().unwrap();
    assert_eq!(batch.task_id, 1);
    assert_eq!(batch.subtasks.len(), 1);
    assert_eq!(mgr.get_task_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_sync_keeps_teams_and_rebuilds_quotas() {
    let env = TestStore::new();
    let source = Arc::new(MutableSource::new(vec![
        ResourceGroupRecord::new(2, "1", 0.6),
        ResourceGroupRecord::new(3, "2", 0.4),
        ResourceGroupRecord::new(4, "bad", 0.0),
    ]));
    let mgr = ResourceGroupMgr::new(env.store.clone(), source.clone(), None);
    mgr.sync_groups().await.unwrap();

    assert_eq!(mgr.group_names().await, vec!["1", "2"]);
    assert!(!mgr.has_group("bad").await);
    mgr.add_task("2", 5, 1, TaskPriority::Low).await.unwrap();

    source.set(vec![
        ResourceGroupRecord::new(2, "1", 0.6),
        ResourceGroupRecord::new(5, "3", 0.2),
    ]);
    mgr.sync_groups().await.unwrap();

    assert_eq!(mgr.group_names().await, vec!["1", "3"]);
    assert!(mgr.has_group("3").await);
    // 已移出配额列表的资源组保留队列中的任务
    assert!(mgr.has_group("2").await);
    assert_eq!(mgr.get_task_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_lost_task_returns_to_last_queue() {
    let env = TestStore::new();
    let mgr = mgr_with(&env, vec![ResourceGroupRecord::new(2, "1", 1.0)]).await;
    mgr.add_task("1", 5, 1, TaskPriority::Low).await.unwrap();

    // 模拟节点在调度途中崩溃：任务已出队，看门狗登记已过期
    let queue_key = keys::priority_queue_key("1", 0);
    env.store.lpop(&queue_key).await.unwrap();
    env.store
        .zadd(keys::CURRENT_TASK_ZSET, (unix_now() - 1) as f64, "5")
        .await
        .unwrap();

    let arbiter = Arc::new(OwnershipArbiter::new(env.store.clone(), "node-a"));
    let monitor = LostTaskMonitor::new(env.tasks(), arbiter, 100);

    assert_eq!(monitor.recover_lost_tasks().await.unwrap(), 1);
    assert_eq!(env.list_items(&queue_key).await, vec!["5"]);
    assert!(env.zset_members(keys::CURRENT_TASK_ZSET).await.is_empty());

    assert_eq!(monitor.recover_lost_tasks().await.unwrap(), 0);
    assert_eq!(env.list_items(&queue_key).await, vec!["5"]);
}

#[tokio::test]
async fn test_lost_task_in_progress_is_left_alone() {
    let env = TestStore::new();
    env.store
        .zadd(keys::CURRENT_TASK_ZSET, (unix_now() + 3600) as f64, "6")
        .await
        .unwrap();

    let arbiter = Arc::new(OwnershipArbiter::new(env.store.clone(), "node-a"));
    let monitor = LostTaskMonitor::new(env.tasks(), arbiter, 100);

    assert_eq!(monitor.recover_lost_tasks().await.unwrap(), 0);
    assert_eq!(env.zset_members(keys::CURRENT_TASK_ZSET).await, vec!["6"]);
}
