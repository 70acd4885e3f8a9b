use std::sync::Arc;

use dtf_core::keys;
use dtf_core::models::{SubtaskResult, TaskStatus};
use dtf_core::{unix_now, CoordinationStore, StoreBatch};
use dtf_dispatcher::{
    SubtaskCompleteMonitor, SubtaskCompletion, SubtaskTimeoutMonitor, TaskCleanupMonitor,
    TaskCompleteMonitor, TaskTimeoutMonitor,
};
use dtf_infrastructure::{GenerationQueue, OwnershipArbiter};
use dtf_testing_utils::{SubtaskBuilder, TaskCreateParamBuilder, TestStore};

fn arbiter(env: &TestStore, owner: &str) -> Arc<OwnershipArbiter> {
    Arc::new(OwnershipArbiter::new(env.store.clone(), owner))
}

#[tokio::test]
async fn test_concurrent_timeout_checks_claim_once() {
    let env = TestStore::new();
    env.seed_task(1, &TaskCreateParamBuilder::new().build()).await;
    let subtask = SubtaskBuilder::new().with_id(11).with_task_id(1).build();
    env.seed_running_subtask(&subtask, unix_now() - 5).await;

    let node_a = SubtaskTimeoutMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    let node_b = SubtaskTimeoutMonitor::new(env.tasks(), arbiter(&env, "node-b"));
    let (a, b) = futures::join!(node_a.check(), node_b.check());

    assert_eq!(a.unwrap() + b.unwrap(), 1);
    assert!(env.zset_members(keys::RUNNING_SUBTASK_ZSET).await.is_empty());
    assert_eq!(env.zset_members(keys::COMPLETED_SUBTASK_ZSET).await, vec!["11"]);
    assert_eq!(
        env.tasks().get_subtask_result(11).await.unwrap(),
        Some(SubtaskResult::Timeout)
    );
}

#[tokio::test]
async fn test_running_subtask_before_deadline_is_untouched() {
    let env = TestStore::new();
    let subtask = SubtaskBuilder::new().with_id(12).build();
    env.seed_running_subtask(&subtask, unix_now() + 600).await;

    let monitor = SubtaskTimeoutMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert_eq!(monitor.check().await.unwrap(), 0);
    assert_eq!(env.zset_members(keys::RUNNING_SUBTASK_ZSET).await, vec!["12"]);
}

#[tokio::test]
async fn test_late_report_after_timeout_is_ignored() {
    let env = TestStore::new();
    let subtask = SubtaskBuilder::new().with_id(13).build();
    env.seed_running_subtask(&subtask, unix_now() - 1).await;

    let monitor = SubtaskTimeoutMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert_eq!(monitor.check().await.unwrap(), 1);

    let completion = SubtaskCompletion::new(env.tasks(), arbiter(&env, "node-b"));
    assert!(!completion.report(13, SubtaskResult::Success).await.unwrap());
    assert_eq!(
        env.tasks().get_subtask_result(13).await.unwrap(),
        Some(SubtaskResult::Timeout)
    );
}

#[tokio::test]
async fn test_report_is_accepted_once() {
    let env = TestStore::new();
    let subtask = SubtaskBuilder::new().with_id(14).build();
    env.seed_running_subtask(&subtask, unix_now() + 600).await;

    let completion = SubtaskCompletion::new(env.tasks(), arbiter(&env, "node-a"));
    assert!(completion.report(14, SubtaskResult::Failure).await.unwrap());
    assert!(!completion.report(14, SubtaskResult::Success).await.unwrap());
    assert_eq!(
        env.tasks().get_subtask_result(14).await.unwrap(),
        Some(SubtaskResult::Failure)
    );
    assert_eq!(env.zset_members(keys::COMPLETED_SUBTASK_ZSET).await, vec!["14"]);
}

#[tokio::test]
async fn test_subtask_complete_updates_task_counters() {
    let env = TestStore::new();
    env.seed_task(1, &TaskCreateParamBuilder::new().build()).await;
    for id in [21, 22, 23] {
        let subtask = SubtaskBuilder::new().with_id(id).with_task_id(1).build();
        env.seed_running_subtask(&subtask, unix_now() + 600).await;
    }
    assert_eq!(env.tasks().task_subtask_count(1).await.unwrap(), 3);

    let completion = SubtaskCompletion::new(env.tasks(), arbiter(&env, "node-a"));
    completion.report(21, SubtaskResult::Success).await.unwrap();
    completion.report(22, SubtaskResult::Failure).await.unwrap();
    env.store
        .zadd(keys::RUNNING_SUBTASK_ZSET, (unix_now() - 1) as f64, "23")
        .await
        .unwrap();
    SubtaskTimeoutMonitor::new(env.tasks(), arbiter(&env, "node-a"))
        .check()
        .await
        .unwrap();

    let monitor = SubtaskCompleteMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert_eq!(monitor.check().await.unwrap(), 3);
    assert_eq!(monitor.check().await.unwrap(), 0);

    let counters = env.tasks().get_counters(1).await.unwrap();
    assert_eq!(counters.completed, 3);
    assert_eq!(counters.timeout, 1);
    assert_eq!(env.tasks().task_subtask_count(1).await.unwrap(), 0);
    assert!(env.zset_members(keys::COMPLETED_SUBTASK_ZSET).await.is_empty());
}

#[tokio::test]
async fn test_unreadable_subtask_does_not_block_completion_of_others() {
    let env = TestStore::new();
    env.seed_task(1, &TaskCreateParamBuilder::new().build()).await;
    for id in [31, 32] {
        let subtask = SubtaskBuilder::new().with_id(id).with_task_id(1).build();
        env.seed_running_subtask(&subtask, unix_now() + 600).await;
    }
    let completion = SubtaskCompletion::new(env.tasks(), arbiter(&env, "node-a"));
    completion.report(31, SubtaskResult::Success).await.unwrap();
    completion.report(32, SubtaskResult::Success).await.unwrap();

    let mut batch = StoreBatch::new();
    batch.hset(
        keys::subtask_info_key(32),
        vec![(keys::SUBTASK_FIELD_TASK_ID.to_string(), "bad".to_string())],
    );
    env.store.exec(batch).await.unwrap();

    let monitor = SubtaskCompleteMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert_eq!(monitor.check().await.unwrap(), 1);

    let counters = env.tasks().get_counters(1).await.unwrap();
    assert_eq!(counters.completed, 1);
    assert_eq!(env.tasks().task_subtask_count(1).await.unwrap(), 1);
    // 无法读取的子任务留在已完成集合中，下一轮重试
    assert_eq!(env.zset_members(keys::COMPLETED_SUBTASK_ZSET).await, vec!["32"]);
    assert_eq!(monitor.check().await.unwrap(), 0);
    assert_eq!(env.tasks().get_counters(1).await.unwrap().completed, 1);
}

#[tokio::test]
async fn test_completed_subtask_without_info_is_dropped() {
    let env = TestStore::new();
    env.store
        .zadd(keys::COMPLETED_SUBTASK_ZSET, unix_now() as f64, "33")
        .await
        .unwrap();

    let monitor = SubtaskCompleteMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert_eq!(monitor.check().await.unwrap(), 0);
    assert!(env.zset_members(keys::COMPLETED_SUBTASK_ZSET).await.is_empty());
}

#[tokio::test]
async fn test_task_completes_when_everything_drained() {
    let env = TestStore::new();
    env.seed_task(1, &TaskCreateParamBuilder::new().build()).await;
    env.store
        .zadd(keys::RUNNING_TASK_ZSET, unix_now() as f64, "1")
        .await
        .unwrap();
    let monitor = TaskCompleteMonitor::new(env.tasks(), arbiter(&env, "node-a"));

    // 生成尚未完成
    assert!(!monitor.is_task_completed(1).await.unwrap());
    assert_eq!(monitor.check().await.unwrap(), 0);

    env.seed_generation_completed(1).await;
    let queue = GenerationQueue::new(env.store.clone());
    queue
        .push(&SubtaskBuilder::new().with_id(31).with_task_id(1).build())
        .await
        .unwrap();
    assert!(!monitor.is_task_completed(1).await.unwrap());

    queue.pop(1).await.unwrap();
    assert!(monitor.is_task_completed(1).await.unwrap());
    assert_eq!(monitor.check().await.unwrap(), 1);

    assert!(env.zset_members(keys::RUNNING_TASK_ZSET).await.is_empty());
    assert_eq!(env.zset_members(keys::COMPLETED_TASK_ZSET).await, vec!["1"]);
    assert_eq!(
        env.tasks().get_task_status(1).await.unwrap(),
        Some(TaskStatus::Completed)
    );
}

#[tokio::test]
async fn test_task_with_running_subtasks_is_not_completed() {
    let env = TestStore::new();
    env.seed_task(1, &TaskCreateParamBuilder::new().build()).await;
    env.seed_generation_completed(1).await;
    let subtask = SubtaskBuilder::new().with_id(41).with_task_id(1).build();
    env.seed_running_subtask(&subtask, unix_now() + 600).await;

    let monitor = TaskCompleteMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert!(!monitor.is_task_completed(1).await.unwrap());
}

#[tokio::test]
async fn test_task_over_lifetime_is_force_completed() {
    let env = TestStore::new();
    let created = unix_now() - 25 * 3600;
    env.seed_task_created_at(1, &TaskCreateParamBuilder::new().build(), created)
        .await;
    env.store
        .zadd(keys::RUNNING_TASK_ZSET, created as f64, "1")
        .await
        .unwrap();

    let monitor = TaskCompleteMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert!(monitor.is_task_completed(1).await.unwrap());
    assert_eq!(monitor.check().await.unwrap(), 1);
    assert_eq!(env.zset_members(keys::COMPLETED_TASK_ZSET).await, vec!["1"]);

    // 没有任务记录的任务同样视为完成
    assert!(monitor.is_task_completed(99).await.unwrap());
}

#[tokio::test]
async fn test_task_past_timeout_is_marked_exceptional() {
    let env = TestStore::new();
    let param = TaskCreateParamBuilder::new().with_timeout(30).build();
    env.seed_task_created_at(5, &param, unix_now() - 60).await;
    env.store
        .zadd(keys::RUNNING_TASK_ZSET, unix_now() as f64, "5")
        .await
        .unwrap();

    let node_a = TaskTimeoutMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    let node_b = TaskTimeoutMonitor::new(env.tasks(), arbiter(&env, "node-b"));
    let (a, b) = futures::join!(node_a.check(), node_b.check());

    assert_eq!(a.unwrap() + b.unwrap(), 1);
    assert!(env.zset_members(keys::TASK_TIMEOUT_ZSET).await.is_empty());
    assert!(env.zset_members(keys::RUNNING_TASK_ZSET).await.is_empty());
    assert_eq!(env.zset_members(keys::COMPLETED_TASK_ZSET).await, vec!["5"]);
    assert_eq!(
        env.tasks().get_task_status(5).await.unwrap(),
        Some(TaskStatus::Exceptional)
    );
}

#[tokio::test]
async fn test_task_within_timeout_is_untouched() {
    let env = TestStore::new();
    env.seed_task(6, &TaskCreateParamBuilder::new().with_timeout(600).build())
        .await;
    // 未设置超时的任务不进入超时集合
    env.seed_task(7, &TaskCreateParamBuilder::new().build()).await;

    let monitor = TaskTimeoutMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert_eq!(monitor.check().await.unwrap(), 0);
    assert_eq!(env.zset_members(keys::TASK_TIMEOUT_ZSET).await, vec!["6"]);
    assert_eq!(
        env.tasks().get_task_status(6).await.unwrap(),
        Some(TaskStatus::Created)
    );
}

#[tokio::test]
async fn test_timeout_does_not_override_completed_task() {
    let env = TestStore::new();
    let param = TaskCreateParamBuilder::new().with_timeout(30).build();
    env.seed_task_created_at(8, &param, unix_now() - 60).await;
    env.store
        .zadd(keys::RUNNING_TASK_ZSET, unix_now() as f64, "8")
        .await
        .unwrap();
    env.seed_generation_completed(8).await;

    let complete = TaskCompleteMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert_eq!(complete.check().await.unwrap(), 1);

    let timeout = TaskTimeoutMonitor::new(env.tasks(), arbiter(&env, "node-b"));
    assert_eq!(timeout.check().await.unwrap(), 0);
    assert!(env.zset_members(keys::TASK_TIMEOUT_ZSET).await.is_empty());
    assert_eq!(env.zset_members(keys::COMPLETED_TASK_ZSET).await, vec!["8"]);
    assert_eq!(
        env.tasks().get_task_status(8).await.unwrap(),
        Some(TaskStatus::Completed)
    );
}

#[tokio::test]
async fn test_cleanup_removes_finished_task_from_every_set() {
    let env = TestStore::new();
    env.seed_task(9, &TaskCreateParamBuilder::new().with_timeout(600).build())
        .await;
    let now = unix_now() as f64;
    for key in [
        keys::GENERATING_TASK_ZSET,
        keys::RUNNING_TASK_ZSET,
        keys::TO_GENERATE_TASK_ZSET,
        keys::COMPLETED_TASK_ZSET,
    ] {
        env.store.zadd(key, now, "9").await.unwrap();
    }
    let queue = GenerationQueue::new(env.store.clone());
    queue
        .push(&SubtaskBuilder::new().with_id(91).with_task_id(9).build())
        .await
        .unwrap();

    let monitor = TaskCleanupMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert_eq!(monitor.check().await.unwrap(), 1);

    for key in [
        keys::TASK_TIMEOUT_ZSET,
        keys::GENERATING_TASK_ZSET,
        keys::RUNNING_TASK_ZSET,
        keys::TO_GENERATE_TASK_ZSET,
        keys::COMPLETED_TASK_ZSET,
    ] {
        assert!(env.zset_members(key).await.is_empty(), "{key} not cleaned");
    }
    assert!(queue.is_empty(9).await.unwrap());
    // 任务信息保留到自身过期
    assert_eq!(
        env.tasks().get_task_status(9).await.unwrap(),
        Some(TaskStatus::Created)
    );
    assert_eq!(monitor.check().await.unwrap(), 0);
}

#[tokio::test]
async fn test_timed_out_task_is_cleaned_up() {
    let env = TestStore::new();
    let param = TaskCreateParamBuilder::new().with_timeout(10).build();
    env.seed_task_created_at(12, &param, unix_now() - 20).await;
    env.store
        .zadd(keys::GENERATING_TASK_ZSET, unix_now() as f64, "12")
        .await
        .unwrap();

    let timeout = TaskTimeoutMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    let cleanup = TaskCleanupMonitor::new(env.tasks(), arbiter(&env, "node-a"));
    assert_eq!(timeout.check().await.unwrap(), 1);
    assert_eq!(cleanup.check().await.unwrap(), 1);

    assert!(env.zset_members(keys::GENERATING_TASK_ZSET).await.is_empty());
    assert!(env.zset_members(keys::COMPLETED_TASK_ZSET).await.is_empty());
    assert_eq!(
        env.tasks().get_task_status(12).await.unwrap(),
        Some(TaskStatus::Exceptional)
    );
}
