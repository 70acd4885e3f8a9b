//! 任务和子任务在协调存储中的记录

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use dtf_core::{
    keys,
    models::{
        SubtaskData, SubtaskId, SubtaskResult, SubtaskStatus, TaskCreateParam, TaskId,
        TaskScheduleData, TaskStatus,
    },
    CoordinationStore, SchedulerError, SchedulerResult, StoreBatch,
};

/// 调度数据的存活时间
pub const SCHEDULE_DATA_TTL: Duration = Duration::from_secs(48 * 3600);
/// 任务创建参数的存活时间
pub const CREATE_PARAM_TTL: Duration = Duration::from_secs(48 * 3600);
/// 任务信息的存活时间
pub const TASK_INFO_TTL: Duration = Duration::from_secs(72 * 3600);
/// 子任务信息的存活时间
pub const SUBTASK_INFO_TTL: Duration = Duration::from_secs(4 * 3600);
/// 未设置超时的子任务在运行列表中的默认超时（秒）
pub const RUNNING_SUBTASK_DEFAULT_TIMEOUT: u32 = 720;

/// 任务信息中的子任务计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubtaskCounters {
    pub total: i64,
    pub completed: i64,
    pub timeout: i64,
    pub cancelled: i64,
}

/// 任务记录访问
///
/// 读操作直接访问协调存储；写操作以 `stage_*` 形式追加到调用方的批次中，
/// 由调用方决定与哪些修改一起原子提交。
#[derive(Clone)]
pub struct TaskStore {
    store: Arc<dyn CoordinationStore>,
}

fn parse_field<T: std::str::FromStr>(key: &str, field: &str, value: &str) -> SchedulerResult<T> {
    value.parse::<T>().map_err(|_| {
        SchedulerError::Serialization(format!("{key} 的字段 {field} 无法解析: {value}"))
    })
}

impl TaskStore {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    // ---- 调度数据 ----

    pub async fn get_schedule_data(&self, task_id: TaskId) -> SchedulerResult<Option<TaskScheduleData>> {
        match self.store.get(&keys::schedule_data_key(task_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn stage_schedule_data(
        batch: &mut StoreBatch,
        task_id: TaskId,
        data: &TaskScheduleData,
    ) -> SchedulerResult<()> {
        let json = serde_json::to_string(data)?;
        batch.set(keys::schedule_data_key(task_id), json, Some(SCHEDULE_DATA_TTL));
        Ok(())
    }

    // ---- 任务信息 ----

    pub async fn get_create_param(&self, task_id: TaskId) -> SchedulerResult<Option<TaskCreateParam>> {
        match self.store.get(&keys::task_create_param_key(task_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// 写入任务信息和创建参数
    pub fn stage_create_task(
        batch: &mut StoreBatch,
        task_id: TaskId,
        param: &TaskCreateParam,
        create_time: i64,
    ) -> SchedulerResult<()> {
        let info_key = keys::task_info_key(task_id);
        batch
            .hset(
                info_key.clone(),
                vec![
                    (keys::TASK_FIELD_TOTAL.to_string(), "0".to_string()),
                    (keys::TASK_FIELD_COMPLETED.to_string(), "0".to_string()),
                    (keys::TASK_FIELD_TIMEOUT.to_string(), "0".to_string()),
                    (keys::TASK_FIELD_CANCELLED.to_string(), "0".to_string()),
                    (keys::TASK_FIELD_GENERATION_COMPLETED.to_string(), "0".to_string()),
                    (keys::TASK_FIELD_TASK_TYPE.to_string(), param.task_type.to_string()),
                    (
                        keys::TASK_FIELD_STATUS.to_string(),
                        TaskStatus::Created.as_code().to_string(),
                    ),
                    (keys::TASK_FIELD_CREATE_TIME.to_string(), create_time.to_string()),
                    (
                        keys::TASK_FIELD_RESOURCE_GROUP.to_string(),
                        param.resource_group.clone(),
                    ),
                ],
            )
            .expire(info_key, TASK_INFO_TTL);

        let json = serde_json::to_string(param)?;
        batch.set(keys::task_create_param_key(task_id), json, Some(CREATE_PARAM_TTL));
        if param.timeout > 0 {
            let deadline = create_time.saturating_add(param.timeout.min(i64::MAX as u64) as i64);
            batch.zadd(keys::TASK_TIMEOUT_ZSET, deadline as f64, task_id.to_string());
        }
        Ok(())
    }

    pub fn stage_task_status(batch: &mut StoreBatch, task_id: TaskId, status: TaskStatus) {
        batch.hset(
            keys::task_info_key(task_id),
            vec![(keys::TASK_FIELD_STATUS.to_string(), status.as_code().to_string())],
        );
    }

    pub async fn get_task_type(&self, task_id: TaskId) -> SchedulerResult<u32> {
        let key = keys::task_info_key(task_id);
        let value = self
            .store
            .hget(&key, keys::TASK_FIELD_TASK_TYPE)
            .await?
            .ok_or(SchedulerError::NotFound)?;
        parse_field(&key, keys::TASK_FIELD_TASK_TYPE, &value)
    }

    pub async fn get_task_status(&self, task_id: TaskId) -> SchedulerResult<Option<TaskStatus>> {
        let key = keys::task_info_key(task_id);
        match self.store.hget(&key, keys::TASK_FIELD_STATUS).await? {
            Some(value) => {
                let code: i64 = parse_field(&key, keys::TASK_FIELD_STATUS, &value)?;
                Ok(TaskStatus::from_code(code))
            }
            None => Ok(None),
        }
    }

    pub async fn get_create_time(&self, task_id: TaskId) -> SchedulerResult<Option<i64>> {
        let key = keys::task_info_key(task_id);
        match self.store.hget(&key, keys::TASK_FIELD_CREATE_TIME).await? {
            Some(value) => Ok(Some(parse_field(&key, keys::TASK_FIELD_CREATE_TIME, &value)?)),
            None => Ok(None),
        }
    }

    pub async fn is_generation_completed(&self, task_id: TaskId) -> SchedulerResult<bool> {
        let value = self
            .store
            .hget(&keys::task_info_key(task_id), keys::TASK_FIELD_GENERATION_COMPLETED)
            .await?;
        Ok(matches!(value.as_deref(), Some("1")))
    }

    pub fn stage_generation_completed(batch: &mut StoreBatch, task_id: TaskId) {
        batch.hset(
            keys::task_info_key(task_id),
            vec![(keys::TASK_FIELD_GENERATION_COMPLETED.to_string(), "1".to_string())],
        );
    }

    pub async fn get_counters(&self, task_id: TaskId) -> SchedulerResult<SubtaskCounters> {
        let key = keys::task_info_key(task_id);
        let map = self.store.hgetall(&key).await?;
        let read = |field: &str, map: &HashMap<String, String>| -> SchedulerResult<i64> {
            match map.get(field) {
                Some(value) => parse_field(&key, field, value),
                None => Ok(0),
            }
        };
        Ok(SubtaskCounters {
            total: read(keys::TASK_FIELD_TOTAL, &map)?,
            completed: read(keys::TASK_FIELD_COMPLETED, &map)?,
            timeout: read(keys::TASK_FIELD_TIMEOUT, &map)?,
            cancelled: read(keys::TASK_FIELD_CANCELLED, &map)?,
        })
    }

    // ---- 子任务 ----

    /// 记录子任务已被调度：创建子任务信息并加入任务的子任务集合
    pub fn stage_subtask_scheduled(batch: &mut StoreBatch, subtask: &SubtaskData, now: i64) {
        let info_key = keys::subtask_info_key(subtask.subtask_id);
        batch
            .hset(
                info_key.clone(),
                vec![
                    (keys::SUBTASK_FIELD_TASK_ID.to_string(), subtask.task_id.to_string()),
                    (
                        keys::SUBTASK_FIELD_TASK_TYPE.to_string(),
                        subtask.task_type.to_string(),
                    ),
                    (keys::SUBTASK_FIELD_TIMEOUT.to_string(), subtask.timeout.to_string()),
                    (keys::SUBTASK_FIELD_START_TIME.to_string(), now.to_string()),
                    (
                        keys::SUBTASK_FIELD_STATUS.to_string(),
                        SubtaskStatus::Running.as_code().to_string(),
                    ),
                ],
            )
            .expire(info_key, SUBTASK_INFO_TTL)
            .zadd(
                keys::task_subtask_set_key(subtask.task_id),
                now as f64,
                subtask.subtask_id.to_string(),
            );
    }

    /// 将已分发的子任务加入运行中集合，分数为超时截止时间
    pub fn stage_subtasks_running(batch: &mut StoreBatch, subtasks: &[SubtaskData], now: i64) {
        if subtasks.is_empty() {
            return;
        }
        let members = subtasks
            .iter()
            .map(|subtask| {
                let timeout = if subtask.timeout == 0 {
                    RUNNING_SUBTASK_DEFAULT_TIMEOUT
                } else {
                    subtask.timeout
                };
                ((now + i64::from(timeout)) as f64, subtask.subtask_id.to_string())
            })
            .collect();
        batch.zadd_all(keys::RUNNING_SUBTASK_ZSET, members);
    }

    /// 写入子任务结果
    pub fn stage_subtask_result(
        batch: &mut StoreBatch,
        subtask_id: SubtaskId,
        result: SubtaskResult,
        now: i64,
    ) {
        batch.hset(
            keys::subtask_info_key(subtask_id),
            vec![
                (keys::SUBTASK_FIELD_RESULT.to_string(), result.as_code().to_string()),
                (
                    keys::SUBTASK_FIELD_STATUS.to_string(),
                    SubtaskStatus::from(result).as_code().to_string(),
                ),
                (keys::SUBTASK_FIELD_END_TIME.to_string(), now.to_string()),
            ],
        );
    }

    pub async fn get_subtask_task_id(&self, subtask_id: SubtaskId) -> SchedulerResult<Option<TaskId>> {
        let key = keys::subtask_info_key(subtask_id);
        match self.store.hget(&key, keys::SUBTASK_FIELD_TASK_ID).await? {
            Some(value) => Ok(Some(parse_field(&key, keys::SUBTASK_FIELD_TASK_ID, &value)?)),
            None => Ok(None),
        }
    }

    pub async fn get_subtask_result(&self, subtask_id: SubtaskId) -> SchedulerResult<Option<SubtaskResult>> {
        let key = keys::subtask_info_key(subtask_id);
        match self.store.hget(&key, keys::SUBTASK_FIELD_RESULT).await? {
            Some(value) => {
                let code: i64 = parse_field(&key, keys::SUBTASK_FIELD_RESULT, &value)?;
                if SubtaskResult::from_code(code).is_none() {
                    warn!("子任务 {} 的结果码无效: {}", subtask_id, code);
                }
                Ok(SubtaskResult::from_code(code))
            }
            None => Ok(None),
        }
    }

    pub async fn task_subtask_count(&self, task_id: TaskId) -> SchedulerResult<i64> {
        self.store.zcard(&keys::task_subtask_set_key(task_id)).await
    }
}
