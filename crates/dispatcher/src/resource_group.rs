//! 资源组管理
//!
//! 每个资源组拥有一个调度队列组。调度时按配额通过随机接受算法选择资源组，
//! 长期来看每个资源组被选中的频率与其配额成正比。

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use dtf_core::{
    config::QueueConfig,
    models::{ResourceGroupRecord, TaskId, TaskPriority},
    CoordinationStore, SchedulerError, SchedulerResult,
};
use dtf_infrastructure::{OwnershipArbiter, TaskStore};

use crate::routine::RoutineRunner;
use crate::scheduling_queue::SchedulingContext;
use crate::scheduling_team::{ScheduledBatch, SchedulingTeam};
use crate::watchdog::LostTaskMonitor;

/// 随机接受算法的最大尝试次数
pub const MAX_TRY_COUNT: usize = 20;

/// 资源组记录来源
#[async_trait]
pub trait ResourceGroupSource: Send + Sync {
    async fn load(&self) -> SchedulerResult<Vec<ResourceGroupRecord>>;
}

/// 固定的资源组列表，来自配置文件
pub struct StaticResourceGroupSource {
    records: Vec<ResourceGroupRecord>,
}

impl StaticResourceGroupSource {
    pub fn new(records: Vec<ResourceGroupRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ResourceGroupSource for StaticResourceGroupSource {
    async fn load(&self) -> SchedulerResult<Vec<ResourceGroupRecord>> {
        Ok(self.records.clone())
    }
}

/// 随机接受算法
///
/// 均匀随机选择一个下标，以 `quota / max_quota` 的概率接受；
/// 尝试 `MAX_TRY_COUNT` 次都未接受时返回最后一次选择的下标。
pub fn stochastic_accept<R: Rng + ?Sized>(
    quotas: &[f64],
    max_quota: f64,
    rng: &mut R,
) -> Option<usize> {
    if quotas.is_empty() || max_quota <= 0.0 {
        return None;
    }

    let mut index = 0;
    for _ in 0..MAX_TRY_COUNT {
        index = rng.random_range(0..quotas.len());
        if rng.random::<f64>() < quotas[index] / max_quota {
            return Some(index);
        }
    }
    Some(index)
}

#[derive(Default)]
struct GroupState {
    teams: HashMap<String, Arc<SchedulingTeam>>,
    names: Vec<String>,
    quotas: Vec<f64>,
    max_quota: f64,
}

pub struct ResourceGroupMgr {
    store: Arc<dyn CoordinationStore>,
    source: Arc<dyn ResourceGroupSource>,
    config: QueueConfig,
    state: RwLock<GroupState>,
    runner: OnceLock<Arc<RoutineRunner>>,
}

impl ResourceGroupMgr {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        source: Arc<dyn ResourceGroupSource>,
        config: Option<QueueConfig>,
    ) -> Self {
        Self {
            store,
            source,
            config: config.unwrap_or_default(),
            state: RwLock::new(GroupState::default()),
            runner: OnceLock::new(),
        }
    }

    /// 加载资源组并启动后台例程：各队列组的提升例程、资源组同步和丢失任务恢复
    pub async fn init(self: &Arc<Self>, runner: Arc<RoutineRunner>, arbiter: Arc<OwnershipArbiter>) -> SchedulerResult<()> {
        {
            // 持有写锁设置例程管理器，之后创建的队列组由 sync_groups 启动
            let state = self.state.write().await;
            if self.runner.set(runner.clone()).is_err() {
                warn!("资源组管理器已经初始化");
                return Ok(());
            }
            for team in state.teams.values() {
                team.start(&runner);
            }
        }
        self.sync_groups().await?;

        let mgr = self.clone();
        runner.spawn("resource_group_sync", 1, self.config.resource_group_sync_interval(), move || {
            let mgr = mgr.clone();
            async move {
                mgr.sync_groups().await?;
                mgr.get_task_count().await.map(|_| ())
            }
        });

        let monitor = Arc::new(LostTaskMonitor::new(
            TaskStore::new(self.store.clone()),
            arbiter,
            self.config.lost_task_scan_count,
        ));
        runner.spawn("lost_task_monitor", 1, self.config.lost_task_check_interval(), move || {
            let monitor = monitor.clone();
            async move { monitor.recover_lost_tasks().await.map(|_| ()) }
        });

        info!("资源组管理器初始化完成");
        Ok(())
    }

    /// 从记录源同步资源组
    ///
    /// 已有资源组保留调度状态，只更新配额；新资源组创建调度队列组；
    /// 配额列表按最新记录重建，不在最新记录中的资源组不再被选中。
    pub async fn sync_groups(&self) -> SchedulerResult<()> {
        let records = self.source.load().await?;

        let mut state = self.state.write().await;
        let mut names = Vec::with_capacity(records.len());
        let mut quotas = Vec::with_capacity(records.len());
        let mut max_quota: f64 = 0.0;

        for record in records {
            if !record.has_valid_quota() {
                warn!("忽略配额无效的资源组: {}, {}", record.name, record.quota);
                continue;
            }

            if !state.teams.contains_key(&record.name) {
                let ctx = SchedulingContext::new(self.store.clone(), &self.config);
                let team = Arc::new(SchedulingTeam::new(&record.name, ctx, Some(self.config.clone())));
                if let Some(runner) = self.runner.get() {
                    team.start(runner);
                }
                info!("添加资源组: {} ({}), 配额 {}", record.name, record.id, record.quota);
                state.teams.insert(record.name.clone(), team);
            }

            max_quota = max_quota.max(record.quota);
            names.push(record.name);
            quotas.push(record.quota);
        }

        debug!("资源组配额: {:?} {:?}", names, quotas);
        state.names = names;
        state.quotas = quotas;
        state.max_quota = max_quota;
        Ok(())
    }

    pub async fn has_group(&self, name: &str) -> bool {
        self.state.read().await.teams.contains_key(name)
    }

    pub async fn group_names(&self) -> Vec<String> {
        self.state.read().await.names.clone()
    }

    pub async fn team(&self, name: &str) -> Option<Arc<SchedulingTeam>> {
        self.state.read().await.teams.get(name).cloned()
    }

    /// 将任务加入资源组的调度队列组
    pub async fn add_task(
        &self,
        group: &str,
        task_id: TaskId,
        task_type: u32,
        priority: TaskPriority,
    ) -> SchedulerResult<()> {
        let team = self
            .team(group)
            .await
            .ok_or_else(|| SchedulerError::UnknownGroup {
                name: group.to_string(),
            })?;
        team.add_task(task_id, priority).await?;
        info!("任务加入资源组 {}: {}, 类型 {}", group, task_id, task_type);
        Ok(())
    }

    /// 按配额选择资源组并调度一个任务，没有任务时返回 None
    pub async fn select(&self) -> SchedulerResult<Option<ScheduledBatch>> {
        let team = {
            let state = self.state.read().await;
            let index = {
                let mut rng = rand::rng();
                stochastic_accept(&state.quotas, state.max_quota, &mut rng)
            };
            let Some(index) = index else {
                return Ok(None);
            };
            state
                .teams
                .get(&state.names[index])
                .cloned()
                .ok_or_else(|| SchedulerError::UnknownGroup {
                    name: state.names[index].clone(),
                })?
        };

        team.schedule().await
    }

    /// 所有资源组中调度中的任务总数
    pub async fn get_task_count(&self) -> SchedulerResult<u64> {
        let teams: Vec<Arc<SchedulingTeam>> = self.state.read().await.teams.values().cloned().collect();
        let mut count = 0;
        for team in teams {
            count += team.get_task_count().await?;
        }
        metrics::gauge!("dtf_in_flight_tasks").set(count as f64);
        Ok(count)
    }
}
