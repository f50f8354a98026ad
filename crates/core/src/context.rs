use std::time::Instant;

use tracing::Span;
use uuid::Uuid;

/// 一次编排运行的上下文
///
/// 由调用方显式创建并传入各个组件的构造函数，组件在 `span` 内记录日志，
/// 同一次运行的所有日志都带有相同的 `run_id`。
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    span: Span,
    started_at: Instant,
}

impl RunContext {
    pub fn new(operation: &str) -> Self {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id, operation);
        Self {
            run_id,
            span,
            started_at: Instant::now(),
        }
    }

    /// 为某个组件派生子上下文，保留同一个 `run_id`
    pub fn component(&self, name: &'static str) -> Self {
        let span = tracing::info_span!(parent: &self.span, "component", component = name);
        Self {
            run_id: self.run_id,
            span,
            started_at: self.started_at,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// 自运行开始以来经过的秒数
    pub fn elapsed_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_keeps_run_id() {
        let ctx = RunContext::new("test");
        let child = ctx.component("fan_out");
        assert_eq!(ctx.run_id(), child.run_id());
        assert_ne!(RunContext::new("other").run_id(), ctx.run_id());
    }
}
