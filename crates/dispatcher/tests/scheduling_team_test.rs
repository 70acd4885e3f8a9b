use dtf_core::config::QueueConfig;
use dtf_core::keys;
use dtf_core::models::{TaskId, TaskPriority};
use dtf_core::CoordinationStore;
use dtf_dispatcher::{SchedulingContext, SchedulingTeam, RR_QUEUE_INDEX};
use dtf_infrastructure::GenerationQueue;
use dtf_testing_utils::{SubtaskBuilder, TaskCreateParamBuilder, TestStore};

fn team_with(env: &TestStore, config: QueueConfig) -> SchedulingTeam {
    let ctx = SchedulingContext::new(env.store.clone(), &config);
    SchedulingTeam::new("1", ctx, Some(config))
}

async fn push_subtask(env: &TestStore, task_id: TaskId, subtask_id: u64) {
    let queue = GenerationQueue::new(env.store.clone());
    queue
        .push(&SubtaskBuilder::new().with_id(subtask_id).with_task_id(task_id).build())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_high_priority_task_gets_full_grant() {
    let env = TestStore::new();
    let team = team_with(&env, QueueConfig::default());

    team.add_task(1, TaskPriority::High).await.unwrap();

    let data = env.tasks().get_schedule_data(1).await.unwrap().unwrap();
    assert_eq!(data.initial_queue_slice, 10240);
    assert_eq!(data.queue_slice, 10240);
    assert_eq!(data.current_queue, 0);
    assert_eq!(data.current_queue_key_name, "Schedule.1.P0.queue");
    assert_eq!(data.resource_group_name, "1");
    assert_eq!(env.list_items(&keys::priority_queue_key("1", 0)).await, vec!["1"]);
}

#[tokio::test]
async fn test_schedule_decrements_slice_and_requeues() {
    let env = TestStore::new();
    let team = team_with(&env, QueueConfig::default());
    env.seed_task(1, &TaskCreateParamBuilder::new().build()).await;
    team.add_task(1, TaskPriority::Low).await.unwrap();
    push_subtask(&env, 1, 100).await;
    push_subtask(&env, 1, 101).await;

    let batch = team.schedule().await.unwrap().unwrap();
    assert_eq!(batch.task_id, 1);
    assert!(!batch.finished);
    let ids: Vec<u64> = batch.subtasks.iter().map(|s| s.subtask_id).collect();
    assert_eq!(ids, vec![100, 101]);

    let data = env.tasks().get_schedule_data(1).await.unwrap().unwrap();
    assert_eq!(data.queue_slice, 39);
    assert_eq!(env.list_items(&keys::priority_queue_key("1", 0)).await, vec!["1"]);
    assert!(env.zset_members(keys::CURRENT_TASK_ZSET).await.is_empty());

    // 子任务已登记到任务的子任务集合
    assert_eq!(env.tasks().task_subtask_count(1).await.unwrap(), 2);
    assert_eq!(env.tasks().get_subtask_task_id(100).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_exhausted_task_moves_down_to_rr() {
    let env = TestStore::new();
    let config = QueueConfig {
        base_slice_count: 1,
        rr_base_slice_count: 5,
        ..QueueConfig::default()
    };
    let team = team_with(&env, config);
    env.seed_task(1, &TaskCreateParamBuilder::new().build()).await;
    team.add_task(1, TaskPriority::Low).await.unwrap();

    push_subtask(&env, 1, 100).await;
    let batch = team.schedule().await.unwrap().unwrap();
    assert_eq!(batch.subtasks.len(), 1);

    let data = env.tasks().get_schedule_data(1).await.unwrap().unwrap();
    assert_eq!(data.current_queue, 1);
    assert_eq!(data.queue_slice, 1);
    assert!(env.list_items(&keys::priority_queue_key("1", 0)).await.is_empty());
    assert_eq!(env.list_items(&keys::priority_queue_key("1", 1)).await, vec!["1"]);
    assert!(env.zset_members(keys::CURRENT_TASK_ZSET).await.is_empty());

    push_subtask(&env, 1, 101).await;
    let batch = team.schedule().await.unwrap().unwrap();
    assert_eq!(batch.subtasks[0].subtask_id, 101);

    let data = env.tasks().get_schedule_data(1).await.unwrap().unwrap();
    assert_eq!(data.current_queue, RR_QUEUE_INDEX);
    assert_eq!(data.current_queue_key_name, keys::rr_queue_key("1"));
    assert_eq!(data.queue_slice, 5);
    assert_eq!(env.list_items(&keys::rr_queue_key("1")).await, vec!["1"]);
}

#[tokio::test]
async fn test_rr_queue_never_transitions_further() {
    let env = TestStore::new();
    let config = QueueConfig {
        rr_base_slice_count: 1,
        ..QueueConfig::default()
    };
    let team = team_with(&env, config);
    env.seed_task(1, &TaskCreateParamBuilder::new().high_priority().build()).await;
    team.rr_queue().append_task(1, TaskPriority::Low).await.unwrap();

    push_subtask(&env, 1, 100).await;
    let batch = team.schedule().await.unwrap().unwrap();
    assert_eq!(batch.subtasks.len(), 1);

    // 时间片用完后按原始优先级重新授予，仍留在轮转队列
    let data = env.tasks().get_schedule_data(1).await.unwrap().unwrap();
    assert_eq!(data.current_queue, RR_QUEUE_INDEX);
    assert_eq!(data.queue_slice, 256);
    assert_eq!(env.list_items(&keys::rr_queue_key("1")).await, vec!["1"]);
    assert_eq!(team.get_task_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_higher_level_is_scanned_first() {
    let env = TestStore::new();
    let team = team_with(&env, QueueConfig::default());
    team.priority_queues()[1].append_task(1, TaskPriority::Low).await.unwrap();
    team.add_task(2, TaskPriority::Low).await.unwrap();
    push_subtask(&env, 1, 100).await;
    push_subtask(&env, 2, 200).await;

    let batch = team.schedule().await.unwrap().unwrap();
    assert_eq!(batch.task_id, 2);

    let batch = team.schedule().await.unwrap().unwrap();
    assert_eq!(batch.task_id, 1);
}

#[tokio::test]
async fn test_idle_level_falls_through_to_next_task() {
    let env = TestStore::new();
    let team = team_with(&env, QueueConfig::default());
    team.add_task(1, TaskPriority::Low).await.unwrap();
    team.priority_queues()[1].append_task(2, TaskPriority::Low).await.unwrap();
    push_subtask(&env, 2, 200).await;

    // 第 0 级的任务没有子任务，继续扫描下一级
    let batch = team.schedule().await.unwrap().unwrap();
    assert_eq!(batch.task_id, 2);
    assert_eq!(team.get_task_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_finished_task_leaves_queue() {
    let env = TestStore::new();
    let team = team_with(&env, QueueConfig::default());
    team.add_task(1, TaskPriority::Medium).await.unwrap();
    push_subtask(&env, 1, 100).await;
    env.seed_generation_completed(1).await;

    let batch = team.schedule().await.unwrap().unwrap();
    assert!(batch.finished);
    assert_eq!(batch.subtasks.len(), 1);
    assert_eq!(team.get_task_count().await.unwrap(), 0);
    assert!(env.zset_members(keys::CURRENT_TASK_ZSET).await.is_empty());
    assert!(team.schedule().await.unwrap().is_none());
}

#[tokio::test]
async fn test_priority_boost_moves_front_tasks() {
    let env = TestStore::new();
    let team = team_with(&env, QueueConfig::default());
    for task_id in 1..=12 {
        team.priority_queues()[1]
            .append_task(task_id, TaskPriority::High)
            .await
            .unwrap();
    }

    assert_eq!(team.trigger_priority_boost(1).await.unwrap(), 10);

    let top = env.list_items(&keys::priority_queue_key("1", 0)).await;
    let expected: Vec<String> = (1..=10).map(|id: u64| id.to_string()).collect();
    assert_eq!(top, expected);
    assert_eq!(
        env.list_items(&keys::priority_queue_key("1", 1)).await,
        vec!["11", "12"]
    );

    let data = env.tasks().get_schedule_data(3).await.unwrap().unwrap();
    assert_eq!(data.current_queue, 0);
    assert_eq!(data.queue_slice, 40);
    assert!(env.zset_members(keys::CURRENT_TASK_ZSET).await.is_empty());

    // 第 0 级不做提升
    assert_eq!(team.trigger_priority_boost(0).await.unwrap(), 0);
}

#[tokio::test]
async fn test_rr_priority_boost() {
    let env = TestStore::new();
    let team = team_with(&env, QueueConfig::default());
    team.rr_queue().append_task(7, TaskPriority::Low).await.unwrap();

    assert_eq!(team.trigger_rr_priority_boost().await.unwrap(), 1);
    assert!(env.list_items(&keys::rr_queue_key("1")).await.is_empty());
    assert_eq!(env.list_items(&keys::priority_queue_key("1", 0)).await, vec!["7"]);
    assert_eq!(team.trigger_rr_priority_boost().await.unwrap(), 0);
    team.trigger_remain_acceleration().await.unwrap();
}

#[tokio::test]
async fn test_missing_schedule_data_is_regranted() {
    let env = TestStore::new();
    let team = team_with(&env, QueueConfig::default());
    env.store
        .rpush(&keys::priority_queue_key("1", 0), "9")
        .await
        .unwrap();
    push_subtask(&env, 9, 900).await;

    let batch = team.schedule().await.unwrap().unwrap();
    assert_eq!(batch.task_id, 9);

    let data = env.tasks().get_schedule_data(9).await.unwrap().unwrap();
    assert_eq!(data.initial_queue_slice, 40);
    assert_eq!(data.queue_slice, 39);
}
