//! 多目标并行执行器
//!
//! 每个工作单元启动一个独立的tokio任务，所有任务都结束之后才检查结果。
//! 某个目标失败不会提前终止其他目标，调用方总能确认每个目标都被尝试过一次。

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleetbench_core::{
    ExecutionResult, OrchestratorError, OrchestratorResult, RunContext, RunReport, Target,
    WorkItem,
};
use futures::future::join_all;
use tracing::{error, info, Instrument};

use crate::task_handle::join_error;

/// 并行执行器
#[derive(Debug, Clone)]
pub struct FanOutExecutor {
    ctx: RunContext,
}

impl FanOutExecutor {
    pub fn new(ctx: &RunContext) -> Self {
        Self {
            ctx: ctx.component("fan_out"),
        }
    }

    /// 并行执行所有工作单元并返回完整报告
    ///
    /// 报告中每个工作单元恰好对应一个结果，即使部分目标失败也不会返回错误。
    pub async fn dispatch_all<A, T, F, Fut>(
        &self,
        operation: &str,
        f: F,
        items: Vec<WorkItem<A>>,
    ) -> RunReport<T>
    where
        F: Fn(Target, A) -> Fut,
        Fut: Future<Output = OrchestratorResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let total = items.len();
        let started = Instant::now();
        let completed = Arc::new(AtomicUsize::new(0));

        info!(parent: self.ctx.span(), operation, total, "开始并行执行");

        let mut targets = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);
        for (index, item) in items.into_iter().enumerate() {
            let target = item.target;
            let span = tracing::info_span!(
                parent: self.ctx.span(),
                "work_item",
                operation,
                index,
                target = %target
            );
            let future = f(target.clone(), item.args);
            let completed = completed.clone();
            handles.push(tokio::spawn(
                async move {
                    let item_started = Instant::now();
                    let outcome = future.await;
                    let order = completed.fetch_add(1, Ordering::SeqCst);
                    (outcome, order, item_started.elapsed())
                }
                .instrument(span),
            ));
            targets.push(target);
        }

        let joined = join_all(handles).await;

        let mut results = Vec::with_capacity(total);
        for (index, (target, joined)) in targets.into_iter().zip(joined).enumerate() {
            let (outcome, completion_order, elapsed) = match joined {
                Ok(done) => done,
                Err(e) => (
                    Err(join_error(target.address(), e)),
                    completed.fetch_add(1, Ordering::SeqCst),
                    Duration::ZERO,
                ),
            };
            if let Err(e) = &outcome {
                error!(parent: self.ctx.span(), operation, target = %target, "目标执行失败: {e}");
            }
            results.push(ExecutionResult {
                index,
                completion_order,
                target,
                outcome,
                elapsed,
            });
        }

        let report = RunReport::new(results);
        info!(
            parent: self.ctx.span(),
            operation,
            total,
            succeeded = report.success_count(),
            failed = total - report.success_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "并行执行结束"
        );
        report
    }

    /// 并行执行所有工作单元，任一目标失败时返回 `FanOutFailed`
    ///
    /// 错误在所有工作单元都结束之后才返回，其中按完成先后列出每个失败目标。
    pub async fn run_all<A, T, F, Fut>(
        &self,
        operation: &str,
        f: F,
        items: Vec<WorkItem<A>>,
    ) -> OrchestratorResult<RunReport<T>>
    where
        F: Fn(Target, A) -> Fut,
        Fut: Future<Output = OrchestratorResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let report = self.dispatch_all(operation, f, items).await;
        if report.is_success() {
            return Ok(report);
        }
        Err(OrchestratorError::FanOutFailed {
            total: report.len(),
            failures: report.failures(),
        })
    }

    /// 在每个目标上执行不带参数的操作
    pub async fn run_on<T, F, Fut>(
        &self,
        operation: &str,
        targets: &[Target],
        f: F,
    ) -> OrchestratorResult<RunReport<T>>
    where
        F: Fn(Target) -> Fut,
        Fut: Future<Output = OrchestratorResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.run_all(operation, |target, ()| f(target), WorkItem::for_targets(targets))
            .await
    }
}
