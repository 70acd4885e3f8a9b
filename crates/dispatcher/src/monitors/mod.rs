//! 重试与超时监控
//!
//! 所有监控的形式相同：扫描共享有序集合中的一个有限窗口，认领到期或已完成的成员，
//! 对认领到的成员在一个原子批次内执行修复或收尾；未认领到的成员留给其他节点。

pub mod generation_monitor;
pub mod subtask_complete;
pub mod subtask_timeout;
pub mod task_cleanup;
pub mod task_complete;
pub mod task_timeout;

pub use generation_monitor::GenerationMonitor;
pub use subtask_complete::SubtaskCompleteMonitor;
pub use subtask_timeout::SubtaskTimeoutMonitor;
pub use task_cleanup::TaskCleanupMonitor;
pub use task_complete::TaskCompleteMonitor;
pub use task_timeout::TaskTimeoutMonitor;

use rand::Rng;
use tracing::warn;

use dtf_core::{CoordinationStore, SchedulerResult};

/// 从有序集合中随机取一个长度为 `window` 的窗口
///
/// 多个节点同时扫描时分散到集合的不同位置，排在前面的成员长期未完成也不会挡住后面的成员。
pub async fn random_window(
    store: &dyn CoordinationStore,
    set_key: &str,
    window: usize,
) -> SchedulerResult<Vec<u64>> {
    let count = store.zcard(set_key).await?.max(0) as usize;
    if count == 0 || window == 0 {
        return Ok(Vec::new());
    }

    let start = if count > window {
        rand::rng().random_range(0..=count - window)
    } else {
        0
    };
    let members = store
        .zrange(set_key, start as i64, (start + window - 1) as i64)
        .await?;

    Ok(members
        .into_iter()
        .filter_map(|member| match member.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("忽略 {} 中无效的成员: {}", set_key, member);
                None
            }
        })
        .collect())
}
