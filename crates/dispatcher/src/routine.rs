//! 周期例程
//!
//! 所有后台循环都以相同的方式运行：按固定间隔执行一次，出错时记录日志并等待下一轮，
//! 取消令牌触发后在当前一轮结束时退出。

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dtf_core::SchedulerResult;

/// 启动 `count` 个周期执行 `f` 的例程
pub fn spawn_routines<F, Fut>(
    name: &'static str,
    count: usize,
    interval: Duration,
    token: CancellationToken,
    f: F,
) -> Vec<JoinHandle<()>>
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = SchedulerResult<()>> + Send + 'static,
{
    (0..count)
        .map(|index| {
            let token = token.clone();
            let f = f.clone();
            tokio::spawn(async move {
                debug!("例程 {}#{} 启动, 间隔 {:?}", name, index, interval);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!("例程 {}#{} 退出", name, index);
                            break;
                        }
                        _ = tokio::time::sleep(interval) => {
                            match f().await {
                                Ok(()) => {}
                                Err(e) if e.is_not_found() => {}
                                Err(e) => warn!("例程 {}#{} 执行失败: {}", name, index, e),
                            }
                        }
                    }
                }
            })
        })
        .collect()
}

/// 例程管理器
///
/// 持有共享的取消令牌和所有已启动例程的句柄，停止时统一取消并在宽限期内等待退出。
pub struct RoutineRunner {
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl RoutineRunner {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn spawn<F, Fut>(&self, name: &'static str, count: usize, interval: Duration, f: F)
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = SchedulerResult<()>> + Send + 'static,
    {
        let spawned = spawn_routines(name, count, interval, self.token.clone(), f);
        info!("启动例程 {}: 数量 {}, 间隔 {:?}", name, count, interval);
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(spawned);
    }

    pub fn routine_count(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// 取消所有例程并等待退出，宽限期内全部退出时返回 true
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.token.cancel();
        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();

        let total = handles.len();
        let joined = tokio::time::timeout(grace, async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("例程异常退出: {}", e);
                }
            }
        })
        .await;

        match joined {
            Ok(()) => {
                info!("所有例程已退出: {}", total);
                true
            }
            Err(_) => {
                warn!("等待例程退出超时: {:?}", grace);
                false
            }
        }
    }
}
