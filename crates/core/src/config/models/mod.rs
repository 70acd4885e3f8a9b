pub mod app_config;
pub mod pipeline;
pub mod queue;
pub mod routines;
pub mod store;

pub use app_config::{validate_resource_groups, AppConfig, DEFAULT_CONFIG_PATH};
pub use pipeline::{ExecutorConfig, GenerationConfig, IdAllocatorConfig, ObservabilityConfig};
pub use queue::QueueConfig;
pub use routines::{RoutineConfig, RoutinesConfig};
pub use store::{StoreBackend, StoreConfig};
