pub mod config;
pub mod errors;
pub mod keys;
pub mod models;
pub mod plugin_registry;
pub mod traits;

pub use errors::*;
pub use plugin_registry::*;
pub use traits::*;

/// 当前 Unix 时间（秒）
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
