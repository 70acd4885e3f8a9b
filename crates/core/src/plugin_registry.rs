use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::{
    traits::{TaskGenerator, TaskSchedulerCallback},
    SchedulerError, SchedulerResult,
};

/// 一种任务类型的插件实现
#[derive(Clone)]
pub struct TaskTypePlugin {
    pub task_type: u32,
    pub name: String,
    pub generator: Arc<dyn TaskGenerator>,
    pub scheduler: Arc<dyn TaskSchedulerCallback>,
}

/// 插件注册表
///
/// 启动时注册，运行期间按任务类型查找。
pub struct PluginRegistry {
    plugins: Arc<RwLock<HashMap<u32, TaskTypePlugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 注册插件，同类型的旧插件会被替换
    pub async fn register(&self, plugin: TaskTypePlugin) {
        info!("注册任务类型插件: {} ({})", plugin.task_type, plugin.name);
        let mut plugins = self.plugins.write().await;
        plugins.insert(plugin.task_type, plugin);
    }

    pub async fn contains(&self, task_type: u32) -> bool {
        self.plugins.read().await.contains_key(&task_type)
    }

    pub async fn get(&self, task_type: u32) -> SchedulerResult<TaskTypePlugin> {
        self.plugins
            .read()
            .await
            .get(&task_type)
            .cloned()
            .ok_or(SchedulerError::UnknownTaskType { task_type })
    }

    pub async fn generator(&self, task_type: u32) -> SchedulerResult<Arc<dyn TaskGenerator>> {
        Ok(self.get(task_type).await?.generator)
    }

    pub async fn scheduler_callback(
        &self,
        task_type: u32,
    ) -> SchedulerResult<Arc<dyn TaskSchedulerCallback>> {
        Ok(self.get(task_type).await?.scheduler)
    }

    pub async fn task_types(&self) -> Vec<u32> {
        let mut types: Vec<u32> = self.plugins.read().await.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
