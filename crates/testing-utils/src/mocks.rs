//! Mock implementations for the plugin capability traits
//!
//! This module provides in-memory mock implementations that can be used
//! for testing the scheduling pipeline without real task-type plugins or
//! a running executor service.

use async_trait::async_trait;
use dtf_core::models::{SubtaskData, SubtaskId, TaskCreateParam, TaskId};
use dtf_core::{
    ExecutorInvoker, GeneratedSubtask, SchedulerError, SchedulerResult, TaskGenerator,
    TaskSchedulerCallback,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Mock generator that produces a fixed number of subtasks per task
#[derive(Debug, Clone)]
pub struct MockTaskGenerator {
    subtasks_per_task: u64,
    subtask_timeout: u32,
    produced: Arc<Mutex<HashMap<TaskId, u64>>>,
    begun: Arc<Mutex<Vec<TaskId>>>,
    resume_steps: Arc<Mutex<HashMap<TaskId, u64>>>,
    ended: Arc<Mutex<Vec<TaskId>>>,
}

impl MockTaskGenerator {
    pub fn new(subtasks_per_task: u64) -> Self {
        Self {
            subtasks_per_task,
            subtask_timeout: 300,
            produced: Arc::new(Mutex::new(HashMap::new())),
            begun: Arc::new(Mutex::new(Vec::new())),
            resume_steps: Arc::new(Mutex::new(HashMap::new())),
            ended: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_subtask_timeout(mut self, timeout: u32) -> Self {
        self.subtask_timeout = timeout;
        self
    }

    pub fn produced(&self, task_id: TaskId) -> u64 {
        *self.produced.lock().unwrap().get(&task_id).unwrap_or(&0)
    }

    pub fn begun_tasks(&self) -> Vec<TaskId> {
        self.begun.lock().unwrap().clone()
    }

    /// Resume step passed to the most recent begin of the task
    pub fn resume_step(&self, task_id: TaskId) -> Option<u64> {
        self.resume_steps.lock().unwrap().get(&task_id).copied()
    }

    pub fn ended_tasks(&self) -> Vec<TaskId> {
        self.ended.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskGenerator for MockTaskGenerator {
    async fn begin(
        &self,
        task_id: TaskId,
        _param: &TaskCreateParam,
        resume_step: u64,
    ) -> SchedulerResult<()> {
        self.begun.lock().unwrap().push(task_id);
        self.resume_steps.lock().unwrap().insert(task_id, resume_step);
        // A resumed generator continues after the subtasks it already produced
        self.produced
            .lock()
            .unwrap()
            .entry(task_id)
            .or_insert(resume_step);
        Ok(())
    }

    async fn get_subtask(&self, task_id: TaskId) -> SchedulerResult<GeneratedSubtask> {
        let mut produced = self.produced.lock().unwrap();
        let count = produced.entry(task_id).or_insert(0);
        if *count >= self.subtasks_per_task {
            return Ok(GeneratedSubtask::finished());
        }

        *count += 1;
        let mut subtask = SubtaskData::new(0, task_id, 0);
        subtask.timeout = self.subtask_timeout;
        subtask.type_param = count.to_string();
        Ok(GeneratedSubtask::subtask(subtask))
    }

    async fn end(&self, task_id: TaskId) -> SchedulerResult<()> {
        self.ended.lock().unwrap().push(task_id);
        Ok(())
    }
}

/// Mock scheduler callback that can veto selected subtasks
#[derive(Debug, Clone, Default)]
pub struct MockSchedulerCallback {
    rejected: Arc<Mutex<HashSet<SubtaskId>>>,
    dispatched: Arc<Mutex<Vec<SubtaskId>>>,
    fail_before_dispatch: Arc<AtomicBool>,
}

impl MockSchedulerCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the given subtasks in before_dispatch
    pub fn rejecting(ids: &[SubtaskId]) -> Self {
        let callback = Self::new();
        callback.rejected.lock().unwrap().extend(ids.iter().copied());
        callback
    }

    pub fn set_fail_before_dispatch(&self, fail: bool) {
        self.fail_before_dispatch.store(fail, Ordering::SeqCst);
    }

    /// Subtasks that went through after_dispatch
    pub fn dispatched(&self) -> Vec<SubtaskId> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskSchedulerCallback for MockSchedulerCallback {
    async fn before_dispatch(
        &self,
        subtask_id: SubtaskId,
        _subtask: &mut SubtaskData,
    ) -> SchedulerResult<bool> {
        if self.fail_before_dispatch.load(Ordering::SeqCst) {
            return Err(SchedulerError::Internal("mock before_dispatch failure".to_string()));
        }
        Ok(!self.rejected.lock().unwrap().contains(&subtask_id))
    }

    async fn after_dispatch(&self, subtask_id: SubtaskId) -> SchedulerResult<()> {
        self.dispatched.lock().unwrap().push(subtask_id);
        Ok(())
    }
}

/// Executor that records every pushed batch, optionally failing
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    batches: Arc<Mutex<Vec<Vec<SubtaskData>>>>,
    failing: Arc<AtomicBool>,
    accept_limit: Arc<Mutex<Option<usize>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let executor = Self::new();
        executor.set_failing(true);
        executor
    }

    /// Accept the first `batches` batches, then fail every later one
    pub fn failing_after(batches: usize) -> Self {
        let executor = Self::new();
        *executor.accept_limit.lock().unwrap() = Some(batches);
        executor
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<SubtaskData>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn pushed_ids(&self) -> Vec<SubtaskId> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|subtask| subtask.subtask_id)
            .collect()
    }
}

#[async_trait]
impl ExecutorInvoker for RecordingExecutor {
    async fn invoke(&self, subtasks: &[SubtaskData]) -> SchedulerResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SchedulerError::ExecutorPush("mock executor unavailable".to_string()));
        }
        let mut batches = self.batches.lock().unwrap();
        if let Some(limit) = *self.accept_limit.lock().unwrap() {
            if batches.len() >= limit {
                return Err(SchedulerError::ExecutorPush("mock executor overloaded".to_string()));
            }
        }
        batches.push(subtasks.to_vec());
        Ok(())
    }
}
