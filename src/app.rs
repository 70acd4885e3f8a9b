use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dtf_core::{config::AppConfig, CoordinationStore, PluginRegistry};
use dtf_dispatcher::{
    ExecutorConnector, GenerationFlow, GenerationMonitor, ResourceGroupMgr, RoutineRunner,
    SchedulerFlow, StaticResourceGroupSource, SubtaskCompleteMonitor, SubtaskCompletion,
    SubtaskTimeoutMonitor, TaskCleanupMonitor, TaskCompleteMonitor, TaskCreator, TaskTimeoutMonitor,
};
use dtf_infrastructure::{
    create_coordination_store, HttpExecutorInvoker, IdRangeAllocator, OwnershipArbiter, TaskStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// 节点角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 调度例程、重试推送和资源组维护
    Scheduler,
    /// 子任务生成和生成监控
    Generator,
    /// 子任务与任务的超时、完成监控以及已结束任务清理
    Monitor,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Scheduler, Role::Generator, Role::Monitor];
}

/// 解析逗号分隔的角色列表，`all` 表示全部角色
pub fn parse_roles(value: &str) -> Result<Vec<Role>> {
    let mut roles = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parsed: &[Role] = match part.to_ascii_lowercase().as_str() {
            "all" => &Role::ALL,
            "scheduler" => &[Role::Scheduler],
            "generator" => &[Role::Generator],
            "monitor" => &[Role::Monitor],
            other => bail!("不支持的角色: {other}"),
        };
        for role in parsed {
            if !roles.contains(role) {
                roles.push(*role);
            }
        }
    }
    if roles.is_empty() {
        bail!("至少需要指定一个角色");
    }
    Ok(roles)
}

/// 调度核心应用
///
/// 持有协调存储、所有权仲裁、ID 分配和资源组管理，按角色启动后台例程。
pub struct Application {
    config: AppConfig,
    roles: Vec<Role>,
    node_id: String,
    store: Arc<dyn CoordinationStore>,
    plugins: Arc<PluginRegistry>,
    arbiter: Arc<OwnershipArbiter>,
    ids: Arc<IdRangeAllocator>,
    groups: Arc<ResourceGroupMgr>,
    runner: Arc<RoutineRunner>,
}

impl Application {
    pub async fn new(
        config: AppConfig,
        roles: Vec<Role>,
        node_id: String,
        plugins: Arc<PluginRegistry>,
        token: CancellationToken,
    ) -> Result<Self> {
        let store = create_coordination_store(&config.store)
            .await
            .context("连接协调存储失败")?;

        // 同一主机上的多个进程也需要不同的所有者标识
        let owner = format!("{}-{}", node_id, Uuid::new_v4());
        let arbiter = Arc::new(OwnershipArbiter::new(store.clone(), owner));

        let ids = Arc::new(IdRangeAllocator::new(
            store.clone(),
            Some(config.id_allocator.clone()),
        ));
        for key in &config.id_allocator.keys {
            ids.init(key)
                .await
                .with_context(|| format!("初始化ID键失败: {key}"))?;
        }

        let source = Arc::new(StaticResourceGroupSource::new(
            config.resource_groups.clone(),
        ));
        let groups = Arc::new(ResourceGroupMgr::new(
            store.clone(),
            source,
            Some(config.queue.clone()),
        ));
        groups.sync_groups().await.context("加载资源组失败")?;

        Ok(Self {
            config,
            roles,
            node_id,
            store,
            plugins,
            arbiter,
            ids,
            groups,
            runner: Arc::new(RoutineRunner::new(token)),
        })
    }

    pub fn runner(&self) -> &RoutineRunner {
        &self.runner
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// 任务创建入口
    pub fn task_creator(&self) -> TaskCreator {
        TaskCreator::new(
            self.tasks(),
            self.ids.clone(),
            self.groups.clone(),
            self.plugins.clone(),
        )
    }

    /// 执行器上报子任务结果的入口
    pub fn subtask_completion(&self) -> SubtaskCompletion {
        SubtaskCompletion::new(self.tasks(), self.arbiter.clone())
    }

    /// 按角色启动后台例程
    pub async fn start(&self) -> Result<()> {
        if self.plugins.task_types().await.is_empty() {
            warn!("没有注册任何任务类型插件, 新任务将无法创建");
        }

        let routines = &self.config.routines;
        let ids = self.ids.clone();
        self.runner.spawn(
            "id_refill",
            routines.id_refill.count,
            routines.id_refill.interval(),
            move || {
                let ids = ids.clone();
                async move { ids.realloc_all().await }
            },
        );

        if self.has_role(Role::Scheduler) {
            self.start_scheduler().await?;
        }
        if self.has_role(Role::Generator) {
            self.start_generator();
        }
        if self.has_role(Role::Monitor) {
            self.start_monitors();
        }

        info!(
            "节点 {} 已启动, 角色: {:?}, 例程数: {}",
            self.node_id,
            self.roles,
            self.runner.routine_count()
        );
        Ok(())
    }

    async fn start_scheduler(&self) -> Result<()> {
        self.groups
            .init(self.runner.clone(), self.arbiter.clone())
            .await
            .context("初始化资源组管理器失败")?;

        let invoker = Arc::new(
            HttpExecutorInvoker::new(&self.config.executor).context("创建执行器客户端失败")?,
        );
        let connector = Arc::new(ExecutorConnector::new(
            self.store.clone(),
            invoker,
            Some(self.config.executor.clone()),
        ));
        let flow = Arc::new(SchedulerFlow::new(
            self.groups.clone(),
            self.tasks(),
            self.plugins.clone(),
            connector.clone(),
        ));

        let routines = &self.config.routines;
        self.runner.spawn(
            "schedule_task",
            routines.schedule_task.count,
            routines.schedule_task.interval(),
            move || {
                let flow = flow.clone();
                async move { flow.schedule_task_routine().await }
            },
        );
        self.runner.spawn(
            "retry_push",
            routines.retry_push.count,
            routines.retry_push.interval(),
            move || {
                let connector = connector.clone();
                async move { connector.retry_push().await.map(|_| ()) }
            },
        );
        Ok(())
    }

    fn start_generator(&self) {
        let flow = Arc::new(GenerationFlow::new(
            self.tasks(),
            self.arbiter.clone(),
            self.ids.clone(),
            self.plugins.clone(),
            self.groups.clone(),
            Some(self.config.generation.clone()),
            self.runner.token().clone(),
        ));
        let monitor = Arc::new(GenerationMonitor::new(self.tasks(), flow.clone()));

        let routines = &self.config.routines;
        self.runner.spawn(
            "task_generation",
            routines.task_generation.count,
            routines.task_generation.interval(),
            move || {
                let flow = flow.clone();
                async move { flow.generate_routine().await }
            },
        );
        self.runner.spawn(
            "generation_monitor",
            routines.generation_monitor.count,
            routines.generation_monitor.interval(),
            move || {
                let monitor = monitor.clone();
                async move { monitor.check().await.map(|_| ()) }
            },
        );
    }

    fn start_monitors(&self) {
        let routines = &self.config.routines;

        let timeout = Arc::new(SubtaskTimeoutMonitor::new(
            self.tasks(),
            self.arbiter.clone(),
        ));
        self.runner.spawn(
            "subtask_timeout",
            routines.subtask_timeout.count,
            routines.subtask_timeout.interval(),
            move || {
                let timeout = timeout.clone();
                async move { timeout.check().await.map(|_| ()) }
            },
        );

        let subtask_complete = Arc::new(SubtaskCompleteMonitor::new(
            self.tasks(),
            self.arbiter.clone(),
        ));
        self.runner.spawn(
            "subtask_complete",
            routines.subtask_complete.count,
            routines.subtask_complete.interval(),
            move || {
                let monitor = subtask_complete.clone();
                async move { monitor.check().await.map(|_| ()) }
            },
        );

        let task_complete = Arc::new(TaskCompleteMonitor::new(
            self.tasks(),
            self.arbiter.clone(),
        ));
        self.runner.spawn(
            "task_complete",
            routines.task_complete.count,
            routines.task_complete.interval(),
            move || {
                let monitor = task_complete.clone();
                async move { monitor.check().await.map(|_| ()) }
            },
        );

        let task_timeout = Arc::new(TaskTimeoutMonitor::new(
            self.tasks(),
            self.arbiter.clone(),
        ));
        self.runner.spawn(
            "task_timeout",
            routines.task_timeout.count,
            routines.task_timeout.interval(),
            move || {
                let monitor = task_timeout.clone();
                async move { monitor.check().await.map(|_| ()) }
            },
        );

        let task_cleanup = Arc::new(TaskCleanupMonitor::new(
            self.tasks(),
            self.arbiter.clone(),
        ));
        self.runner.spawn(
            "task_cleanup",
            routines.task_cleanup.count,
            routines.task_cleanup.interval(),
            move || {
                let monitor = task_cleanup.clone();
                async move { monitor.check().await.map(|_| ()) }
            },
        );
    }

    fn tasks(&self) -> TaskStore {
        TaskStore::new(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtf_core::config::StoreBackend;
    use dtf_core::models::{TaskCreateParam, TaskPriority};
    use dtf_core::SchedulerError;
    use std::time::Duration;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.backend = StoreBackend::Memory;
        config
    }

    async fn memory_app(roles: Vec<Role>) -> Application {
        Application::new(
            memory_config(),
            roles,
            "test-node".to_string(),
            Arc::new(PluginRegistry::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_parse_roles() {
        assert_eq!(parse_roles("all").unwrap(), Role::ALL.to_vec());
        assert_eq!(
            parse_roles("monitor, scheduler").unwrap(),
            vec![Role::Monitor, Role::Scheduler]
        );
        assert_eq!(
            parse_roles("Generator,all").unwrap(),
            vec![Role::Generator, Role::Scheduler, Role::Monitor]
        );
    }

    #[test]
    fn test_parse_roles_rejects_invalid() {
        assert!(parse_roles("worker").is_err());
        assert!(parse_roles("").is_err());
        assert!(parse_roles(" , ").is_err());
    }

    #[tokio::test]
    async fn test_monitor_role_starts_only_monitors() {
        let app = memory_app(vec![Role::Monitor]).await;
        app.start().await.unwrap();

        let routines = &app.config.routines;
        let expected = routines.id_refill.count
            + routines.subtask_timeout.count
            + routines.subtask_complete.count
            + routines.task_complete.count
            + routines.task_timeout.count
            + routines.task_cleanup.count;
        assert_eq!(app.runner().routine_count(), expected);
        assert!(app.runner().shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_all_roles_start_and_stop() {
        let app = memory_app(Role::ALL.to_vec()).await;
        app.start().await.unwrap();

        assert!(app.runner().routine_count() > 0);
        assert!(app.runner().shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_task_creator_rejects_unregistered_type() {
        let app = memory_app(vec![Role::Scheduler]).await;
        let param = TaskCreateParam::new("1", 99, TaskPriority::Low);

        let result = app.task_creator().create_task(&param).await;
        assert!(matches!(result, Err(SchedulerError::UnknownTaskType { task_type: 99 })));
    }
}
