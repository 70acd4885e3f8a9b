//! Test helper utilities and common testing patterns
//!
//! This module provides utilities for setting up an in-memory coordination
//! store, seeding task and subtask records, and waiting on asynchronous
//! pipeline progress.

use std::sync::Arc;
use std::time::Duration;

use dtf_core::models::{SubtaskData, TaskCreateParam, TaskId};
use dtf_core::{
    keys, unix_now, CoordinationStore, PluginRegistry, StoreBatch, TaskGenerator,
    TaskSchedulerCallback, TaskTypePlugin,
};
use dtf_infrastructure::{InMemoryCoordinationStore, TaskStore};
use tokio::time::sleep;

/// In-memory coordination store with both the concrete and the trait-object handle
#[derive(Clone)]
pub struct TestStore {
    pub memory: InMemoryCoordinationStore,
    pub store: Arc<dyn CoordinationStore>,
}

impl TestStore {
    pub fn new() -> Self {
        let memory = InMemoryCoordinationStore::new();
        let store: Arc<dyn CoordinationStore> = Arc::new(memory.clone());
        Self { memory, store }
    }

    pub fn tasks(&self) -> TaskStore {
        TaskStore::new(self.store.clone())
    }

    /// Write the task info hash and create parameters, as task creation does
    pub async fn seed_task(&self, task_id: TaskId, param: &TaskCreateParam) {
        self.seed_task_created_at(task_id, param, unix_now()).await;
    }

    pub async fn seed_task_created_at(&self, task_id: TaskId, param: &TaskCreateParam, create_time: i64) {
        let mut batch = StoreBatch::atomic();
        TaskStore::stage_create_task(&mut batch, task_id, param, create_time).unwrap();
        self.store.exec(batch).await.unwrap();
    }

    /// Mark the task generation as completed
    pub async fn seed_generation_completed(&self, task_id: TaskId) {
        let mut batch = StoreBatch::new();
        TaskStore::stage_generation_completed(&mut batch, task_id);
        self.store.exec(batch).await.unwrap();
    }

    /// Put a subtask into the running set with the given deadline
    pub async fn seed_running_subtask(&self, subtask: &SubtaskData, deadline: i64) {
        let mut batch = StoreBatch::atomic();
        TaskStore::stage_subtask_scheduled(&mut batch, subtask, unix_now());
        batch.zadd(
            keys::RUNNING_SUBTASK_ZSET,
            deadline as f64,
            subtask.subtask_id.to_string(),
        );
        self.store.exec(batch).await.unwrap();
    }

    pub async fn zset_members(&self, key: &str) -> Vec<String> {
        self.store.zrange(key, 0, -1).await.unwrap()
    }

    pub async fn list_items(&self, key: &str) -> Vec<String> {
        self.store.lrange(key, 0, -1).await.unwrap()
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Register a task-type plugin built from the given mocks
pub async fn register_plugin(
    registry: &PluginRegistry,
    task_type: u32,
    generator: Arc<dyn TaskGenerator>,
    scheduler: Arc<dyn TaskSchedulerCallback>,
) {
    registry
        .register(TaskTypePlugin {
            task_type,
            name: format!("test_type_{task_type}"),
            generator,
            scheduler,
        })
        .await;
}

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    ///
    /// This is useful for integration tests where you need to wait for
    /// background routines to make progress.
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }

    /// Set up logging for tests (call once per test binary)
    pub fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init();
    }
}
