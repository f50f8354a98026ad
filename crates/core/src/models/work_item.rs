use std::time::Duration;

use crate::errors::{OrchestratorError, OrchestratorResult, TargetFailure};
use crate::models::Target;

/// 并行执行的工作单元：一个目标加上该目标专属的参数
///
/// 每次调用时创建，只被消费一次。
#[derive(Debug, Clone)]
pub struct WorkItem<A> {
    pub target: Target,
    pub args: A,
}

impl<A> WorkItem<A> {
    pub fn new(target: Target, args: A) -> Self {
        Self { target, args }
    }
}

impl WorkItem<()> {
    /// 为每个目标创建不带参数的工作单元
    pub fn for_targets(targets: &[Target]) -> Vec<WorkItem<()>> {
        targets
            .iter()
            .cloned()
            .map(|target| WorkItem::new(target, ()))
            .collect()
    }
}

/// 单个工作单元的执行结果
#[derive(Debug, Clone)]
pub struct ExecutionResult<T> {
    /// 工作单元在提交列表中的位置
    pub index: usize,
    /// 完成的先后次序，从0开始
    pub completion_order: usize,
    pub target: Target,
    pub outcome: OrchestratorResult<T>,
    pub elapsed: Duration,
}

impl<T> ExecutionResult<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    /// 失败时返回带目标信息的失败记录
    pub fn failure(&self) -> Option<TargetFailure> {
        self.outcome.as_ref().err().map(|e| TargetFailure {
            target: self.target.address().to_string(),
            message: e.to_string(),
        })
    }
}

/// 一次并行执行的汇总报告
///
/// 报告中的结果数量总是等于提交的工作单元数量，顺序与提交顺序一致。
#[derive(Debug, Clone)]
pub struct RunReport<T> {
    results: Vec<ExecutionResult<T>>,
}

impl<T> RunReport<T> {
    pub fn new(results: Vec<ExecutionResult<T>>) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[ExecutionResult<T>] {
        &self.results
    }

    /// 指定目标的执行结果
    pub fn result_for(&self, address: &str) -> Option<&ExecutionResult<T>> {
        self.results
            .iter()
            .find(|r| r.target.address() == address)
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(ExecutionResult::is_success)
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// 按完成先后列出所有失败
    pub fn failures(&self) -> Vec<TargetFailure> {
        let mut failed: Vec<&ExecutionResult<T>> =
            self.results.iter().filter(|r| r.is_failure()).collect();
        failed.sort_by_key(|r| r.completion_order);
        failed.into_iter().filter_map(ExecutionResult::failure).collect()
    }

    /// 最先完成的失败
    pub fn first_failure(&self) -> Option<TargetFailure> {
        self.results
            .iter()
            .filter(|r| r.is_failure())
            .min_by_key(|r| r.completion_order)
            .and_then(ExecutionResult::failure)
    }

    /// 转换为聚合结果：全部成功时返回各目标的返回值，否则返回 `FanOutFailed`
    pub fn into_result(self) -> OrchestratorResult<Vec<T>> {
        let total = self.results.len();
        let failures = self.failures();
        if !failures.is_empty() {
            return Err(OrchestratorError::FanOutFailed { total, failures });
        }

        let mut values = Vec::with_capacity(total);
        for result in self.results {
            if let Ok(value) = result.outcome {
                values.push(value);
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, address: &str, outcome: OrchestratorResult<u32>) -> ExecutionResult<u32> {
        ExecutionResult {
            index,
            completion_order: index,
            target: Target::load_generator(address),
            outcome,
            elapsed: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_report_all_success() {
        let report = RunReport::new(vec![result(0, "a", Ok(1)), result(1, "b", Ok(2))]);
        assert!(report.is_success());
        assert_eq!(report.success_count(), 2);
        assert_eq!(report.into_result().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_report_with_failure_keeps_every_result() {
        let report = RunReport::new(vec![
            result(0, "a", Ok(1)),
            result(1, "b", Err(OrchestratorError::Internal("boom".to_string()))),
            result(2, "c", Ok(3)),
        ]);

        assert_eq!(report.len(), 3);
        assert!(!report.is_success());
        assert_eq!(report.first_failure().unwrap().target, "b");
        assert!(report.result_for("c").unwrap().is_success());

        match report.into_result() {
            Err(OrchestratorError::FanOutFailed { total, failures }) => {
                assert_eq!(total, 3);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].target, "b");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_failures_follow_completion_order() {
        let mut late = result(0, "a", Err(OrchestratorError::Internal("late".to_string())));
        late.completion_order = 2;
        let mut early = result(2, "c", Err(OrchestratorError::Internal("early".to_string())));
        early.completion_order = 0;
        let mut ok = result(1, "b", Ok(7));
        ok.completion_order = 1;

        let report = RunReport::new(vec![late, ok, early]);
        assert_eq!(report.first_failure().unwrap().target, "c");
        let order: Vec<String> = report.failures().into_iter().map(|f| f.target).collect();
        assert_eq!(order, vec!["c".to_string(), "a".to_string()]);
        // 结果本身仍按提交顺序排列
        assert_eq!(report.results()[0].target.address(), "a");
    }
}
