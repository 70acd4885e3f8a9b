use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::{
    pipeline::{ExecutorConfig, GenerationConfig, IdAllocatorConfig, ObservabilityConfig},
    queue::QueueConfig,
    routines::RoutinesConfig,
    store::StoreConfig,
};
use crate::models::{default_resource_groups, ResourceGroupRecord};
use crate::{SchedulerError, SchedulerResult};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/dtf.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub resource_groups: Vec<ResourceGroupRecord>,
    pub routines: RoutinesConfig,
    pub id_allocator: IdAllocatorConfig,
    pub executor: ExecutorConfig,
    pub generation: GenerationConfig,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            queue: QueueConfig::default(),
            resource_groups: default_resource_groups(),
            routines: RoutinesConfig::default(),
            id_allocator: IdAllocatorConfig::default(),
            executor: ExecutorConfig::default(),
            generation: GenerationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// 指定的配置文件必须存在；未指定时依次尝试默认路径，都不存在则使用内置默认值。
    /// 环境变量以 `DTF_` 为前缀、`__` 分隔层级覆盖文件中的值，
    /// 例如 `DTF_QUEUE__BASE_SLICE_COUNT=80`。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [DEFAULT_CONFIG_PATH, "dtf.toml", "/etc/dtf/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("DTF")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate().context("配置校验失败")?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate().context("配置校验失败")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        self.store.validate()?;
        self.queue.validate()?;
        self.routines.validate()?;
        self.id_allocator.validate()?;
        self.executor.validate()?;
        self.generation.validate()?;
        self.observability.validate()?;
        validate_resource_groups(&self.resource_groups)
    }
}

/// 校验资源组记录：名称非空且不重复，配额为正数
pub fn validate_resource_groups(records: &[ResourceGroupRecord]) -> SchedulerResult<()> {
    if records.is_empty() {
        return Err(SchedulerError::Configuration(
            "至少需要配置一个资源组".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for record in records {
        if record.name.trim().is_empty() {
            return Err(SchedulerError::Configuration(format!(
                "资源组 {} 的名称为空",
                record.id
            )));
        }
        if !record.has_valid_quota() {
            return Err(SchedulerError::Configuration(format!(
                "资源组 {} 的配额必须为正数: {}",
                record.name, record.quota
            )));
        }
        if !names.insert(record.name.as_str()) {
            return Err(SchedulerError::Configuration(format!(
                "资源组名称重复: {}",
                record.name
            )));
        }
    }
    Ok(())
}
