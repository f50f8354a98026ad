use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::OrchestratorResult;

/// 汇总延迟数据时从每次压测的开头和结尾剔除的时间段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimPeriods {
    pub warmup: Option<Duration>,
    pub cooldown: Option<Duration>,
}

impl TrimPeriods {
    pub fn new(warmup: Option<Duration>, cooldown: Option<Duration>) -> Self {
        Self { warmup, cooldown }
    }
}

/// 压测结果的后处理器
///
/// 调用时所有目标的文件已经下载到 `<results_dir>/<target>/` 下。
#[async_trait]
pub trait ResultProcessor: Send + Sync {
    async fn process(&self, results_dir: &Path, trim: TrimPeriods) -> OrchestratorResult<()>;
}
