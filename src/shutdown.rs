use std::time::Duration;

use dtf_dispatcher::RoutineRunner;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 优雅关闭管理器
///
/// 持有全部例程共享的取消令牌，关闭时取消令牌并在宽限期内等待例程退出。
#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 供例程订阅的取消令牌
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 触发关闭并等待例程退出，宽限期内全部退出时返回 true
    pub async fn shutdown(&self, runner: &RoutineRunner, grace: Duration) -> bool {
        if self.is_shutdown() {
            debug!("关闭管理器已经触发过关闭");
        } else {
            info!("触发系统关闭");
            self.token.cancel();
        }
        runner.shutdown(grace).await
    }
}

/// 等待关闭信号
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_manager_basic() {
        let manager = ShutdownManager::new();
        let runner = RoutineRunner::new(manager.token());

        // 初始状态应该是未关闭
        assert!(!manager.is_shutdown());
        assert!(!runner.is_cancelled());

        assert!(manager.shutdown(&runner, Duration::from_secs(1)).await);
        assert!(manager.is_shutdown());
        assert!(runner.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_stops_routines() {
        let manager = ShutdownManager::new();
        let runner = RoutineRunner::new(manager.token());
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        runner.spawn("tick", 3, Duration::from_millis(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(manager.shutdown(&runner, Duration::from_secs(1)).await);

        let stopped_at = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test]
    async fn test_double_shutdown() {
        let manager = ShutdownManager::new();
        let runner = RoutineRunner::new(manager.token());

        assert!(manager.shutdown(&runner, Duration::from_secs(1)).await);
        // 第二次关闭应该是无操作
        assert!(manager.shutdown(&runner, Duration::from_secs(1)).await);
        assert!(manager.clone().is_shutdown());
    }
}
