use std::sync::Arc;
use std::time::Duration;

use dtf_core::models::SubtaskData;
use dtf_core::{unix_now, CoordinationStore, SchedulerError};
use dtf_infrastructure::{GenerationQueue, IdRangeAllocator, InMemoryCoordinationStore, OwnershipArbiter};
use futures::future::join_all;

fn shared_store() -> Arc<dyn CoordinationStore> {
    Arc::new(InMemoryCoordinationStore::new())
}

#[tokio::test]
async fn test_concurrent_claimants_single_winner() {
    let store = shared_store();
    store.zadd("claims", (unix_now() - 1) as f64, "42").await.unwrap();

    let arbiters: Vec<_> = (0..8)
        .map(|n| OwnershipArbiter::new(store.clone(), format!("node-{n}")))
        .collect();
    let results = join_all(
        arbiters
            .iter()
            .map(|arbiter| arbiter.try_to_own_element("claims", 42)),
    )
    .await;

    let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
    assert_eq!(winners, 1);
    assert_eq!(store.zcard("claims").await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_lock_single_holder() {
    let store = shared_store();
    let arbiters: Vec<_> = (0..5)
        .map(|n| OwnershipArbiter::new(store.clone(), format!("node-{n}")))
        .collect();

    let results = join_all(arbiters.iter().map(|arbiter| {
        arbiter.try_to_own("dtf.task.lock.1", Duration::ZERO, Duration::from_secs(30))
    }))
    .await;

    let holders: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| *r.as_ref().unwrap())
        .map(|(n, _)| n)
        .collect();
    assert_eq!(holders.len(), 1);

    let holder = &arbiters[holders[0]];
    let other = arbiters.iter().find(|a| a.owner() != holder.owner()).unwrap();
    assert!(holder.renew("dtf.task.lock.1", Duration::from_secs(30)).await.is_ok());
    assert!(matches!(
        other.renew("dtf.task.lock.1", Duration::from_secs(30)).await,
        Err(SchedulerError::OwnershipLost(_))
    ));

    holder.release("dtf.task.lock.1").await.unwrap();
    assert!(other
        .try_to_own("dtf.task.lock.1", Duration::ZERO, Duration::from_secs(30))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_allocators_share_counter_without_overlap() {
    let store = shared_store();
    let node_a = IdRangeAllocator::new(store.clone(), None);
    let node_b = IdRangeAllocator::new(store.clone(), None);
    node_a.init("ids").await.unwrap();
    node_b.init("ids").await.unwrap();

    let mut ids = Vec::new();
    for _ in 0..250 {
        ids.push(node_a.get_id("ids").await.unwrap());
        ids.push(node_b.get_id("ids").await.unwrap());
    }

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    assert!(ids.iter().all(|id| *id > 0));

    // 同一节点发放的 ID 单调递增
    let from_a: Vec<u64> = ids.iter().step_by(2).copied().collect();
    assert!(from_a.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_sequential_ids_on_single_node() {
    let store = shared_store();
    let allocator = IdRangeAllocator::new(store, None);
    allocator.init("seq").await.unwrap();

    let ids: Vec<u64> = {
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(allocator.get_id("seq").await.unwrap());
        }
        ids
    };
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_generation_queue_is_fifo_and_counts_total() {
    let store = shared_store();
    let queue = GenerationQueue::new(store.clone());
    for id in 1..=3 {
        queue.push(&SubtaskData::new(id, 7, 1)).await.unwrap();
    }

    assert_eq!(queue.len(7).await.unwrap(), 3);
    assert_eq!(queue.pop(7).await.unwrap().unwrap().subtask_id, 1);

    queue.push_back(&[SubtaskData::new(1, 7, 1)]).await.unwrap();
    let mut order = Vec::new();
    while let Some(subtask) = queue.pop(7).await.unwrap() {
        order.push(subtask.subtask_id);
    }
    assert_eq!(order, vec![1, 2, 3]);
    assert!(queue.is_empty(7).await.unwrap());

    let total = store
        .hget(&dtf_core::keys::task_info_key(7), dtf_core::keys::TASK_FIELD_TOTAL)
        .await
        .unwrap();
    assert_eq!(total.as_deref(), Some("3"));
}
