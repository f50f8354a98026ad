use std::path::Path;

use async_trait::async_trait;
use fleetbench_core::{OrchestratorResult, ResultProcessor, TrimPeriods};
use tracing::info;

/// 统计每个目标下载到的结果文件
///
/// 直方图和日志的统计分析由外部工具完成，这里只确认文件已经按
/// `<results_dir>/<target>/` 的结构落盘。
#[derive(Debug, Clone, Default)]
pub struct ResultInventory;

impl ResultInventory {
    pub fn new() -> Self {
        Self
    }

    /// 返回 `(目标目录名, 文件数)`，按目录名排序
    pub async fn scan(&self, results_dir: &Path) -> OrchestratorResult<Vec<(String, usize)>> {
        let mut summary = Vec::new();
        let mut entries = tokio::fs::read_dir(results_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let mut files = 0;
            let mut inner = tokio::fs::read_dir(entry.path()).await?;
            while let Some(file) = inner.next_entry().await? {
                if file.file_type().await?.is_file() {
                    files += 1;
                }
            }
            summary.push((entry.file_name().to_string_lossy().into_owned(), files));
        }
        summary.sort();
        Ok(summary)
    }
}

#[async_trait]
impl ResultProcessor for ResultInventory {
    async fn process(&self, results_dir: &Path, trim: TrimPeriods) -> OrchestratorResult<()> {
        info!(
            warmup_seconds = ?trim.warmup.map(|d| d.as_secs()),
            cooldown_seconds = ?trim.cooldown.map(|d| d.as_secs()),
            "汇总时剔除的时间段"
        );
        for (target, files) in self.scan(results_dir).await? {
            info!(target = %target, files, "结果文件");
        }
        Ok(())
    }
}
