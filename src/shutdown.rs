use std::sync::Arc;

use anyhow::{Context, Result};
use fleetbench_core::OrchestratorResult;
use fleetbench_dispatcher::RepeatingHandle;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// 优雅关闭开关
///
/// 只会从未关闭切换到已关闭一次；之后才开始等待的调用方也会立即返回。
#[derive(Clone)]
pub struct ShutdownManager {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(false)),
        }
    }

    /// 触发关闭，重复调用无效果
    pub fn shutdown(&self) {
        if !self.tx.send_replace(true) {
            info!("触发关闭");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.tx.subscribe();
        // 发送端由自身持有，不会关闭
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// 等到关闭后停止循环任务，当前迭代执行完才返回
    pub async fn stop_on_shutdown(&self, handle: &RepeatingHandle) -> OrchestratorResult<()> {
        self.wait_for_shutdown().await;
        handle.stop().await
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待Ctrl+C或SIGTERM
pub async fn wait_for_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("安装Ctrl+C信号处理器失败") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("安装SIGTERM信号处理器失败")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("收到Ctrl+C信号");
        },
        result = terminate => {
            result?;
            info!("收到SIGTERM信号");
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use fleetbench_dispatcher::RepeatingTask;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_waiters_released_by_clone() {
        let manager = ShutdownManager::new();
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_for_shutdown().await })
        };

        assert!(!manager.is_shutdown());
        manager.clone().shutdown();

        assert!(manager.is_shutdown());
        assert!(timeout(Duration::from_millis(100), waiter).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_after_shutdown_returns_immediately() {
        let manager = ShutdownManager::new();
        manager.shutdown();
        manager.shutdown();

        let waited = timeout(Duration::from_millis(100), manager.wait_for_shutdown()).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_stop_on_shutdown_cancels_loop() {
        let manager = ShutdownManager::new();
        let handle = RepeatingTask::spawn(
            "loop",
            |delay: Duration| async move {
                tokio::time::sleep(delay).await;
                Ok(())
            },
            Duration::from_millis(5),
        );

        // 未关闭时循环一直运行
        let early = timeout(Duration::from_millis(30), manager.stop_on_shutdown(&handle)).await;
        assert!(early.is_err());
        assert!(!handle.is_cancelled());

        manager.shutdown();
        manager.stop_on_shutdown(&handle).await.unwrap();
        assert!(handle.is_cancelled());
        assert!(handle.iterations() >= 1);
    }
}
