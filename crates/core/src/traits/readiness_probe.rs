use std::time::Duration;

use async_trait::async_trait;

use crate::models::Target;

/// 就绪探测接口
///
/// 一次探测就是一次有超时的轻量连接尝试，任何连接错误都视为未就绪。
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self, target: &Target, connect_timeout: Duration) -> bool;

    /// 探测的端点描述，用于日志
    fn describe(&self) -> String {
        "readiness probe".to_string()
    }
}
